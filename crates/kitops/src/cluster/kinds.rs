//! Dynamic kind catalog: which resource kinds are namespace-scoped.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::ClusterClient;

/// Kinds never entered into the catalog and skipped in cluster listings.
///
/// These are create-only review objects or read-only status objects that
/// cannot be listed or labelled.
pub const EXCLUDED_KINDS: &[&str] = &[
    "Binding",
    "ComponentStatus",
    "LocalSubjectAccessReview",
    "SelfSubjectAccessReview",
    "SelfSubjectRulesReview",
    "SubjectAccessReview",
    "TokenReview",
];

/// Returns true if `kind` is in [`EXCLUDED_KINDS`].
pub fn is_excluded_kind(kind: &str) -> bool {
    EXCLUDED_KINDS.contains(&kind)
}

/// Map of kind → "is namespaced".
pub type KindCatalog = HashMap<String, bool>;

/// When the catalog is re-read from the cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RefreshPolicy {
    /// Before every lookup.
    OnLookup,
    /// Once per reconcile cycle, after the apply pass.
    #[default]
    PerCycle,
    /// From a background task on a fixed interval.
    Periodic,
}

/// Parses `kubectl api-resources` output.
///
/// The header line is skipped and parsing stops at the first empty line.
/// The last column of a row is the kind, the one before it the namespaced
/// flag; rows that do not fit this shape and excluded kinds are ignored.
pub fn parse_api_resources(output: &str) -> KindCatalog {
    let mut catalog = KindCatalog::new();

    for line in output.lines().skip(1) {
        if line.trim().is_empty() {
            break;
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        let [.., namespaced, kind] = fields.as_slice() else {
            continue;
        };

        let namespaced = match *namespaced {
            "true" => true,
            "false" => false,
            _ => continue,
        };

        if is_excluded_kind(kind) {
            continue;
        }

        catalog.insert((*kind).to_string(), namespaced);
    }

    catalog
}

#[derive(Debug, Default)]
struct CatalogState {
    catalog: KindCatalog,
    refreshed_at: Option<DateTime<Utc>>,
}

/// Caches the kind catalog of one cluster.
///
/// Shared by `Arc` between the reconciler and, with the periodic policy,
/// the background refresher.
pub struct KindResolver {
    cluster: Arc<dyn ClusterClient>,
    policy: RefreshPolicy,
    state: RwLock<CatalogState>,
}

impl KindResolver {
    /// Creates a resolver with an empty catalog.
    pub fn new(cluster: Arc<dyn ClusterClient>, policy: RefreshPolicy) -> Self {
        Self {
            cluster,
            policy,
            state: RwLock::new(CatalogState::default()),
        }
    }

    pub fn policy(&self) -> RefreshPolicy {
        self.policy
    }

    /// Re-reads the catalog from the cluster, replacing the cached one.
    ///
    /// On failure the cached catalog is kept. Returns whether the catalog
    /// was replaced.
    pub async fn refresh(&self) -> bool {
        let output = match self.cluster.api_resources().await {
            Ok(output) => output,
            Err(e) => {
                log::warn!("Failed to refresh kind catalog, keeping cached one: {}", e);
                return false;
            }
        };

        let catalog = parse_api_resources(&output);
        if catalog.is_empty() {
            log::warn!("Cluster returned an empty kind catalog, keeping cached one");
            return false;
        }

        let mut state = self.state.write().await;
        log::debug!("Kind catalog refreshed: {} kinds", catalog.len());
        state.catalog = catalog;
        state.refreshed_at = Some(Utc::now());
        true
    }

    /// Refreshes the catalog when the policy asks for one per cycle.
    pub async fn begin_cycle(&self) {
        if self.policy == RefreshPolicy::PerCycle {
            self.refresh().await;
        }
    }

    /// Whether `kind` is namespace-scoped; `false` for unknown kinds.
    pub async fn is_namespaced(&self, kind: &str) -> bool {
        if self.policy == RefreshPolicy::OnLookup {
            self.refresh().await;
        }

        self.state
            .read()
            .await
            .catalog
            .get(kind)
            .copied()
            .unwrap_or(false)
    }

    /// Snapshot of the catalog, sorted by kind.
    pub async fn kinds(&self) -> Vec<(String, bool)> {
        if self.policy == RefreshPolicy::OnLookup {
            self.refresh().await;
        }

        let state = self.state.read().await;
        let mut kinds: Vec<_> = state
            .catalog
            .iter()
            .map(|(kind, namespaced)| (kind.clone(), *namespaced))
            .collect();
        kinds.sort();
        kinds
    }

    /// Number of cached kinds, without refreshing.
    pub async fn cached_len(&self) -> usize {
        self.state.read().await.catalog.len()
    }

    pub async fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.refreshed_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{ClusterError, Existence, ResourceRef, Result};
    use crate::resource::ResourceLabel;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const API_RESOURCES: &str = "\
NAME                              SHORTNAMES   APIVERSION                        NAMESPACED   KIND
bindings                                       v1                                true         Binding
componentstatuses                 cs           v1                                false        ComponentStatus
configmaps                        cm           v1                                true         ConfigMap
namespaces                        ns           v1                                false        Namespace
deployments                       deploy       apps/v1                           true         Deployment
tokenreviews                                   authentication.k8s.io/v1          false        TokenReview
clusterroles                                   rbac.authorization.k8s.io/v1      false        ClusterRole
";

    /// Answers `api-resources` from a script; nothing else is used.
    struct ScriptedCatalog {
        responses: Mutex<VecDeque<Result<String>>>,
        calls: AtomicUsize,
    }

    impl ScriptedCatalog {
        fn new(responses: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ClusterClient for ScriptedCatalog {
        async fn api_resources(&self) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ClusterError::Unreachable("script exhausted".into())))
        }

        async fn apply_dir(&self, _dir: &Path) -> Result<()> {
            unimplemented!()
        }

        async fn exists(&self, _target: &ResourceRef<'_>) -> Existence {
            unimplemented!()
        }

        async fn label(&self, _target: &ResourceRef<'_>, _label: &ResourceLabel) -> Result<()> {
            unimplemented!()
        }

        async fn delete(&self, _target: &ResourceRef<'_>) -> Result<()> {
            unimplemented!()
        }

        async fn list_labeled(
            &self,
            _kind: &str,
            _namespaced: bool,
            _label: &ResourceLabel,
        ) -> Result<Vec<u8>> {
            unimplemented!()
        }
    }

    #[test]
    fn test_parse_api_resources() {
        let catalog = parse_api_resources(API_RESOURCES);

        assert_eq!(catalog.len(), 4);
        assert_eq!(catalog.get("ConfigMap"), Some(&true));
        assert_eq!(catalog.get("Deployment"), Some(&true));
        assert_eq!(catalog.get("Namespace"), Some(&false));
        assert_eq!(catalog.get("ClusterRole"), Some(&false));
        assert!(!catalog.contains_key("TokenReview"));
        assert!(!catalog.contains_key("ComponentStatus"));
        assert!(!catalog.contains_key("Binding"));
    }

    #[test]
    fn test_parse_stops_at_empty_line() {
        let output = "NAME NAMESPACED KIND\npods true Pod\n\nsecrets true Secret\n";
        let catalog = parse_api_resources(output);

        assert!(catalog.contains_key("Pod"));
        assert!(!catalog.contains_key("Secret"));
    }

    #[test]
    fn test_parse_ignores_malformed_rows() {
        let output = "NAME NAMESPACED KIND\nlonely\npods maybe Pod\nsecrets true Secret\n";
        let catalog = parse_api_resources(output);

        assert_eq!(catalog.len(), 1);
        assert!(catalog.contains_key("Secret"));
    }

    #[tokio::test]
    async fn test_unknown_kind_is_cluster_scoped() {
        let cluster = ScriptedCatalog::new(vec![Ok(API_RESOURCES.to_string())]);
        let resolver = KindResolver::new(cluster, RefreshPolicy::PerCycle);
        resolver.begin_cycle().await;

        assert!(!resolver.is_namespaced("TotallyUnknownKind").await);
        assert!(resolver.is_namespaced("ConfigMap").await);
        assert!(!resolver.is_namespaced("TokenReview").await);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_catalog() {
        let cluster = ScriptedCatalog::new(vec![
            Ok(API_RESOURCES.to_string()),
            Err(ClusterError::Unreachable("connection refused".into())),
            Ok(String::new()),
        ]);
        let resolver = KindResolver::new(cluster, RefreshPolicy::PerCycle);

        assert!(resolver.refresh().await);
        let first = resolver.refreshed_at().await;
        assert!(!resolver.refresh().await);
        assert!(!resolver.refresh().await);

        assert!(resolver.is_namespaced("Deployment").await);
        assert_eq!(resolver.kinds().await.len(), 4);
        assert_eq!(resolver.refreshed_at().await, first);
    }

    #[tokio::test]
    async fn test_refresh_replaces_catalog() {
        let cluster = ScriptedCatalog::new(vec![
            Ok(API_RESOURCES.to_string()),
            Ok("NAME NAMESPACED KIND\nwidgets true Widget\n".to_string()),
        ]);
        let resolver = KindResolver::new(cluster, RefreshPolicy::PerCycle);

        resolver.refresh().await;
        resolver.refresh().await;

        assert_eq!(resolver.kinds().await, vec![("Widget".to_string(), true)]);
    }

    #[tokio::test]
    async fn test_policy_controls_refresh_timing() {
        let per_cycle = ScriptedCatalog::new(vec![Ok(API_RESOURCES.to_string())]);
        let resolver = KindResolver::new(per_cycle.clone(), RefreshPolicy::PerCycle);
        resolver.is_namespaced("Deployment").await;
        assert_eq!(per_cycle.calls.load(Ordering::SeqCst), 0);
        resolver.begin_cycle().await;
        assert_eq!(per_cycle.calls.load(Ordering::SeqCst), 1);

        let on_lookup = ScriptedCatalog::new(vec![
            Ok(API_RESOURCES.to_string()),
            Ok(API_RESOURCES.to_string()),
        ]);
        let resolver = KindResolver::new(on_lookup.clone(), RefreshPolicy::OnLookup);
        resolver.begin_cycle().await;
        assert_eq!(on_lookup.calls.load(Ordering::SeqCst), 0);
        assert!(resolver.is_namespaced("Deployment").await);
        assert!(resolver.is_namespaced("ConfigMap").await);
        assert_eq!(on_lookup.calls.load(Ordering::SeqCst), 2);

        let listing = ScriptedCatalog::new(vec![Ok(API_RESOURCES.to_string())]);
        let resolver = KindResolver::new(listing.clone(), RefreshPolicy::OnLookup);
        assert_eq!(resolver.kinds().await.len(), 4);
        assert_eq!(listing.calls.load(Ordering::SeqCst), 1);

        let periodic = ScriptedCatalog::new(vec![]);
        let resolver = KindResolver::new(periodic.clone(), RefreshPolicy::Periodic);
        resolver.begin_cycle().await;
        resolver.is_namespaced("Deployment").await;
        assert_eq!(periodic.calls.load(Ordering::SeqCst), 0);
    }
}
