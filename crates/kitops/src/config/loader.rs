//! Loading, environment overrides and validation of [`Settings`].

use std::path::{Path, PathBuf};

use super::settings::Settings;
use crate::cluster::RefreshPolicy;
use crate::error::ConfigError;
use crate::resource::is_valid_label_key;

/// Repository URL (the variable the controller has always honoured).
pub const ENV_DEPLOYMENTS_URL: &str = "KITOPS_DEPLOYMENTS_URL";
/// Checkout directory.
pub const ENV_REPO_DIR: &str = "KITOPS_REPO_DIR";
/// HTTP listen address.
pub const ENV_LISTEN: &str = "KITOPS_LISTEN";
/// kubectl executable.
pub const ENV_KUBECTL: &str = "KITOPS_KUBECTL";
/// kubeconfig context.
pub const ENV_KUBE_CONTEXT: &str = "KITOPS_KUBE_CONTEXT";

/// Loads settings from an optional YAML file, applies environment
/// overrides and validates the result.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let mut settings = match path {
        Some(path) => read_settings_file(path)?,
        None => Settings::default(),
    };

    apply_overrides(&mut settings, |var| std::env::var(var).ok())?;
    validate_settings(&settings)?;

    Ok(settings)
}

fn read_settings_file(path: &Path) -> Result<Settings, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_settings_from_str(&content).map_err(|e| match e {
        ConfigError::ParseYaml { message, .. } => ConfigError::ParseYaml {
            path: path.to_path_buf(),
            message,
        },
        other => other,
    })
}

/// Parses settings from YAML without overrides or validation.
///
/// An empty document yields the defaults.
pub fn load_settings_from_str(content: &str) -> Result<Settings, ConfigError> {
    if content.trim().is_empty() {
        return Ok(Settings::default());
    }

    Ok(serde_yaml::from_str(content)?)
}

/// Applies environment overrides; `lookup` returns the value of a variable.
///
/// Empty values are ignored.
pub fn apply_overrides<F>(settings: &mut Settings, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |var: &str| lookup(var).filter(|value| !value.trim().is_empty());

    if let Some(url) = get(ENV_DEPLOYMENTS_URL) {
        settings.repository.url = url;
    }

    if let Some(dir) = get(ENV_REPO_DIR) {
        settings.repository.directory = PathBuf::from(dir);
    }

    if let Some(listen) = get(ENV_LISTEN) {
        settings.server.listen = listen.parse().map_err(|e| ConfigError::InvalidEnv {
            var: ENV_LISTEN.to_string(),
            reason: format!("'{}' is not a socket address: {}", listen, e),
        })?;
    }

    if let Some(kubectl) = get(ENV_KUBECTL) {
        settings.cluster.kubectl = PathBuf::from(kubectl);
    }

    if let Some(context) = get(ENV_KUBE_CONTEXT) {
        settings.cluster.context = Some(context);
    }

    Ok(())
}

/// Checks settings for values the controller cannot run with.
pub fn validate_settings(settings: &Settings) -> Result<(), ConfigError> {
    let invalid = |message: String| Err(ConfigError::Validation { message });

    if settings.repository.url.trim().is_empty() {
        return invalid("repository.url must not be empty".to_string());
    }

    if settings.repository.directory.as_os_str().is_empty() {
        return invalid("repository.directory must not be empty".to_string());
    }

    if settings.repository.manifest_path.is_absolute()
        || settings
            .repository
            .manifest_path
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return invalid(format!(
            "repository.manifestPath must be a relative path inside the checkout, got '{}'",
            settings.repository.manifest_path.display()
        ));
    }

    if settings.repository.timeout_secs == 0 {
        return invalid("repository.timeoutSecs must be greater than zero".to_string());
    }

    if settings.cluster.timeout_secs == 0 {
        return invalid("cluster.timeoutSecs must be greater than zero".to_string());
    }

    if !is_valid_label_key(&settings.cluster.label_key) {
        return invalid(format!(
            "cluster.labelKey '{}' is not a valid label key",
            settings.cluster.label_key
        ));
    }

    let refresh = &settings.cluster.catalog_refresh;
    if refresh.mode == RefreshPolicy::Periodic && refresh.interval_secs == 0 {
        return invalid(
            "cluster.catalogRefresh.intervalSecs must be greater than zero in periodic mode"
                .to_string(),
        );
    }

    Ok(())
}
