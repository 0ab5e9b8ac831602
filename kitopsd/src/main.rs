//! kitopsd: keeps a Kubernetes cluster in line with a git repository of manifests.

mod logging;
mod server;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use kitops::cluster::{CatalogRefresher, RefreshPolicy};
use kitops::config::load_settings;
use kitops::sanitize::redact_repo_url;
use kitops::{CommitId, CommitQueue, KindResolver, LogFormat, ReconcileHistory, Reconciler, Settings};

#[derive(Parser, Debug)]
#[command(name = "kitopsd", version, about = "GitOps reconciliation controller")]
struct Cli {
    /// Settings file (YAML)
    #[arg(short, long, global = true, env = "KITOPS_CONFIG")]
    config: Option<PathBuf>,

    /// Log output format: plain or json (overrides the settings file)
    #[arg(long, global = true, value_parser = parse_log_format)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the controller and its HTTP endpoint
    #[command(alias = "s")]
    Server,

    /// Reconcile a single commit and exit
    Apply {
        /// Full 40-character commit id
        commit: String,
    },

    /// Print the kind catalog of the cluster
    Kinds,
}

fn parse_log_format(value: &str) -> std::result::Result<LogFormat, String> {
    value.parse()
}

/// The engine wired from settings.
struct Controller {
    reconciler: Arc<Reconciler>,
    kinds: Arc<KindResolver>,
    history: Arc<ReconcileHistory>,
}

impl Controller {
    fn new(settings: &Settings) -> Self {
        let cluster = Arc::new(settings.kubectl());
        let source = Arc::new(settings.git_source());
        let kinds = Arc::new(KindResolver::new(
            cluster.clone(),
            settings.cluster.catalog_refresh.mode,
        ));
        let history = Arc::new(ReconcileHistory::new(settings.history.limit));

        let reconciler = Reconciler::new(source, cluster, Arc::clone(&kinds))
            .with_label_key(&settings.cluster.label_key)
            .with_manifest_path(settings.repository.manifest_path.clone())
            .with_history(Arc::clone(&history));

        Self {
            reconciler: Arc::new(reconciler),
            kinds,
            history,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let settings = load_settings(cli.config.as_deref()).context("Failed to load settings")?;

    let format = cli.log_format.unwrap_or(settings.logging.format);
    logging::init(format, settings.logging.filter.as_deref())?;

    match cli.command {
        Commands::Server => {
            serve(settings).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Apply { commit } => apply_once(&settings, &commit).await,
        Commands::Kinds => print_kinds(&settings).await,
    }
}

async fn serve(settings: Settings) -> Result<()> {
    log::info!("Starting kitopsd v{}", env!("CARGO_PKG_VERSION"));

    let controller = Controller::new(&settings);
    log::info!(
        "Reconciling {} with label {}",
        redact_repo_url(&settings.repository.url),
        controller.reconciler.label()
    );

    if !controller.kinds.refresh().await {
        log::warn!("Starting without a kind catalog; it is read again during the first cycle");
    }

    let refresh = &settings.cluster.catalog_refresh;
    let refresher = (refresh.mode == RefreshPolicy::Periodic).then(|| {
        let refresher = CatalogRefresher::new(
            Arc::clone(&controller.kinds),
            Duration::from_secs(refresh.interval_secs),
        );
        let handle = refresher.start();
        (refresher, handle)
    });

    let queue = CommitQueue::<CommitId>::new(controller.reconciler.clone());
    let state = server::AppState::new(
        queue,
        Arc::clone(&controller.history),
        Arc::clone(&controller.kinds),
    );

    server::run(settings.server.listen, state).await?;

    if let Some((refresher, handle)) = refresher {
        refresher.stop();
        if let Err(e) = handle.await {
            log::warn!("Kind catalog refresher ended abnormally: {}", e);
        }
    }

    log::info!("kitopsd stopped");
    Ok(())
}

async fn apply_once(settings: &Settings, commit: &str) -> Result<ExitCode> {
    let commit = CommitId::parse(commit)?;
    let controller = Controller::new(settings);

    if settings.cluster.catalog_refresh.mode == RefreshPolicy::Periodic {
        controller.kinds.refresh().await;
    }

    let record = controller.reconciler.reconcile(&commit).await;
    println!("{}", serde_json::to_string_pretty(&record)?);

    if record.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

async fn print_kinds(settings: &Settings) -> Result<ExitCode> {
    let kinds = KindResolver::new(Arc::new(settings.kubectl()), RefreshPolicy::PerCycle);

    if !kinds.refresh().await {
        bail!("Could not read the kind catalog from the cluster");
    }

    for (kind, namespaced) in kinds.kinds().await {
        let scope = if namespaced { "namespaced" } else { "cluster" };
        println!("{:<40} {}", kind, scope);
    }

    Ok(ExitCode::SUCCESS)
}
