//! The cluster command interface and its kubectl implementation.

mod error;
mod kinds;
mod kubectl;
mod refresher;

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;

use crate::resource::{ResourceLabel, ResourceStub};

pub use error::{classify_kubectl_error, ClusterError, Result};
pub use kinds::{
    is_excluded_kind, parse_api_resources, KindCatalog, KindResolver, RefreshPolicy,
    EXCLUDED_KINDS,
};
pub use kubectl::Kubectl;
pub use refresher::CatalogRefresher;

/// Address of one cluster object as the command interface sees it.
///
/// `namespace` is `None` for cluster-scoped kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceRef<'a> {
    pub kind: &'a str,
    pub name: &'a str,
    pub namespace: Option<&'a str>,
}

impl<'a> ResourceRef<'a> {
    /// Addresses `stub`, dropping its namespace when the kind is cluster-scoped.
    pub fn new(stub: &'a ResourceStub, namespaced: bool) -> Self {
        Self {
            kind: stub.kind(),
            name: stub.name(),
            namespace: namespaced.then(|| stub.namespace()),
        }
    }
}

impl fmt::Display for ResourceRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.namespace {
            Some(ns) => write!(f, "{}/{} in {}", self.kind, self.name, ns),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// Outcome of an existence check.
///
/// `Unknown` means the cluster could not answer; callers must not mutate or
/// delete on `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Existence {
    Exists,
    Absent,
    Unknown,
}

/// Operations the reconciler needs from a cluster.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Raw `api-resources` table.
    async fn api_resources(&self) -> Result<String>;

    /// Applies every manifest in `dir`.
    async fn apply_dir(&self, dir: &Path) -> Result<()>;

    async fn exists(&self, target: &ResourceRef<'_>) -> Existence;

    /// Sets `label` on `target`, overwriting any previous value.
    async fn label(&self, target: &ResourceRef<'_>, label: &ResourceLabel) -> Result<()>;

    async fn delete(&self, target: &ResourceRef<'_>) -> Result<()>;

    /// Lists every object of `kind` carrying `label`, as a YAML `List`.
    ///
    /// Namespaced kinds are listed across all namespaces.
    async fn list_labeled(
        &self,
        kind: &str,
        namespaced: bool,
        label: &ResourceLabel,
    ) -> Result<Vec<u8>>;
}
