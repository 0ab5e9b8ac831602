//! Tracing subscriber setup.

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use kitops::LogFormat;

/// Filter directive variable, checked before `RUST_LOG`.
pub const ENV_LOG: &str = "KITOPS_LOG";

const DEFAULT_DIRECTIVE: &str = "info";

/// Installs the global subscriber and routes `log` records into it.
pub fn init(format: LogFormat, configured: Option<&str>) -> Result<()> {
    let directive = filter_directive(configured, |var| std::env::var(var).ok());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|e| {
        eprintln!("Invalid log filter '{}' ({}), using '{}'", directive, e, DEFAULT_DIRECTIVE);
        EnvFilter::new(DEFAULT_DIRECTIVE)
    });

    tracing_log::LogTracer::init().context("Failed to route log records to tracing")?;

    let registry = Registry::default().with(filter);
    match format {
        LogFormat::Plain => {
            tracing::subscriber::set_global_default(registry.with(fmt::layer().with_target(true)))
        }
        LogFormat::Json => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().json().with_current_span(true)),
        ),
    }
    .context("Failed to install tracing subscriber")?;

    Ok(())
}

/// `KITOPS_LOG`, then `RUST_LOG`, then the settings file, then `info`.
fn filter_directive<F>(configured: Option<&str>, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    [ENV_LOG, "RUST_LOG"]
        .into_iter()
        .filter_map(|var| lookup(var))
        .chain(configured.map(str::to_string))
        .find(|directive| !directive.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DIRECTIVE.to_string())
}
