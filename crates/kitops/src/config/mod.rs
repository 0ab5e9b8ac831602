pub mod loader;
pub mod settings;

pub use crate::cluster::RefreshPolicy;
pub use loader::{apply_overrides, load_settings, load_settings_from_str, validate_settings};
pub use settings::{
    CatalogRefreshSettings, ClusterSettings, HistorySettings, LogFormat, LoggingSettings,
    RepositorySettings, ServerSettings, Settings, DEFAULT_REPOSITORY_URL,
};
