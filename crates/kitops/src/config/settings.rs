//! Controller settings.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cluster::{Kubectl, RefreshPolicy};
use crate::reconciler::DEFAULT_HISTORY_LIMIT;
use crate::resource::{ResourceLabel, DEFAULT_LABEL_KEY};
use crate::source::GitSource;

/// Repository reconciled when none is configured.
pub const DEFAULT_REPOSITORY_URL: &str = "https://github.com/300481/kitops-test.git";

/// Top-level controller settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub repository: RepositorySettings,

    #[serde(default)]
    pub cluster: ClusterSettings,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub history: HistorySettings,
}

/// The manifest repository and its local checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositorySettings {
    /// Git remote URL.
    #[serde(default = "default_repository_url")]
    pub url: String,

    /// Local checkout directory.
    #[serde(default = "default_repository_directory")]
    pub directory: PathBuf,

    /// Sub-directory of the checkout holding the manifests; empty for the root.
    #[serde(default)]
    pub manifest_path: PathBuf,

    /// Timeout for each git command, in seconds.
    #[serde(default = "default_git_timeout")]
    pub timeout_secs: u64,
}

fn default_repository_url() -> String {
    DEFAULT_REPOSITORY_URL.to_string()
}

fn default_repository_directory() -> PathBuf {
    PathBuf::from("/tmp/repo")
}

fn default_git_timeout() -> u64 {
    120
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            url: default_repository_url(),
            directory: default_repository_directory(),
            manifest_path: PathBuf::new(),
            timeout_secs: default_git_timeout(),
        }
    }
}

/// How the cluster is reached and how managed resources are marked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSettings {
    /// kubectl executable, looked up in `PATH` when not absolute.
    #[serde(default = "default_kubectl")]
    pub kubectl: PathBuf,

    /// kubeconfig context; the current context when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    /// kubeconfig file; kubectl's default lookup when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<PathBuf>,

    /// Timeout for each kubectl command, in seconds.
    #[serde(default = "default_kubectl_timeout")]
    pub timeout_secs: u64,

    /// Key of the label marking resources managed from the repository.
    #[serde(default = "default_label_key")]
    pub label_key: String,

    #[serde(default)]
    pub catalog_refresh: CatalogRefreshSettings,
}

fn default_kubectl() -> PathBuf {
    PathBuf::from("kubectl")
}

fn default_kubectl_timeout() -> u64 {
    60
}

fn default_label_key() -> String {
    DEFAULT_LABEL_KEY.to_string()
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            kubectl: default_kubectl(),
            context: None,
            kubeconfig: None,
            timeout_secs: default_kubectl_timeout(),
            label_key: default_label_key(),
            catalog_refresh: CatalogRefreshSettings::default(),
        }
    }
}

/// When the kind catalog is re-read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogRefreshSettings {
    #[serde(default)]
    pub mode: RefreshPolicy,

    /// Interval of the background refresh in `periodic` mode, in seconds.
    #[serde(default = "default_refresh_interval")]
    pub interval_secs: u64,
}

fn default_refresh_interval() -> u64 {
    300 // 5 minutes
}

impl Default for CatalogRefreshSettings {
    fn default() -> Self {
        Self {
            mode: RefreshPolicy::default(),
            interval_secs: default_refresh_interval(),
        }
    }
}

/// HTTP front door.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSettings {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plain" | "text" => Ok(LogFormat::Plain),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingSettings {
    #[serde(default)]
    pub format: LogFormat,

    /// Filter directive (e.g. `info,kitops=debug`); the environment wins when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySettings {
    /// Number of reconcile records kept.
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            limit: default_history_limit(),
        }
    }
}

impl Settings {
    /// The git checkout described by these settings.
    pub fn git_source(&self) -> GitSource {
        GitSource::new(&self.repository.url, &self.repository.directory)
            .with_timeout(Duration::from_secs(self.repository.timeout_secs))
    }

    /// The kubectl client described by these settings.
    pub fn kubectl(&self) -> Kubectl {
        let mut kubectl = Kubectl::new(&self.cluster.kubectl)
            .with_timeout(Duration::from_secs(self.cluster.timeout_secs));
        if let Some(context) = &self.cluster.context {
            kubectl = kubectl.with_context(context);
        }
        if let Some(kubeconfig) = &self.cluster.kubeconfig {
            kubectl = kubectl.with_kubeconfig(kubeconfig);
        }
        kubectl
    }

    /// The reconciler-identity label for the configured repository.
    pub fn resource_label(&self) -> ResourceLabel {
        ResourceLabel::for_repository(&self.cluster.label_key, &self.repository.url)
    }
}
