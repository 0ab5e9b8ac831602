//! HTTP front door: commit trigger, health check and status snapshot.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use chrono::{DateTime, Utc};
use kitops::{
    CommitId, CommitQueue, KindResolver, QueueSnapshot, ReconcileHistory, ReconcileRecord,
};

/// Shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    queue: CommitQueue<CommitId>,
    history: Arc<ReconcileHistory>,
    kinds: Arc<KindResolver>,
}

impl AppState {
    pub fn new(
        queue: CommitQueue<CommitId>,
        history: Arc<ReconcileHistory>,
        kinds: Arc<KindResolver>,
    ) -> Self {
        Self {
            queue,
            history,
            kinds,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApplyParams {
    commitid: Option<String>,
}

/// Body of `GET /clusterconfig`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClusterConfig {
    queue: QueueSnapshot<CommitId>,
    catalog: CatalogStatus,
    history: Vec<ReconcileRecord>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CatalogStatus {
    kinds: usize,
    refreshed_at: Option<DateTime<Utc>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/apply", get(apply).post(apply))
        .route("/clusterconfig", get(cluster_config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves until Ctrl-C or SIGTERM, then waits for the in-flight cycle.
pub async fn run(addr: SocketAddr, state: AppState) -> Result<()> {
    let queue = state.queue.clone();

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    log::info!("Listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    if queue.pending() > 0 {
        log::warn!("Shutting down with {} commits still queued", queue.pending());
    }
    queue.wait_idle().await;

    Ok(())
}

async fn healthz() -> &'static str {
    "OK"
}

async fn apply(State(state): State<AppState>, Query(params): Query<ApplyParams>) -> Response {
    let Some(raw) = params.commitid else {
        return (StatusCode::BAD_REQUEST, "Missing commitid parameter").into_response();
    };

    match CommitId::parse(&raw) {
        Ok(commit) => {
            state.queue.enqueue(commit);
            (StatusCode::OK, "OK").into_response()
        }
        Err(e) => {
            log::warn!("Rejected apply request: {}", e);
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
    }
}

async fn cluster_config(State(state): State<AppState>) -> Json<ClusterConfig> {
    let catalog = CatalogStatus {
        kinds: state.kinds.cached_len().await,
        refreshed_at: state.kinds.refreshed_at().await,
    };

    Json(ClusterConfig {
        queue: state.queue.snapshot(),
        catalog,
        history: state.history.records(),
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::info!("Shutdown signal received");
}
