//! Checksum-keyed sets of resource stubs (desired and actual state).

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use super::error::{ResourceError, Result};
use super::manifest::manifest_files;
use super::stub::{ManifestDocuments, RawManifest, ResourceStub};
use crate::cluster::is_excluded_kind;

/// Kind of the envelope a cluster listing must carry.
pub const LIST_KIND: &str = "List";

/// Set of resource stubs keyed by identity checksum.
///
/// Inserting a stub with an identity already present overwrites it.
#[derive(Debug, Clone, Default)]
pub struct ResourceCollection {
    items: HashMap<String, ResourceStub>,
}

/// What a manifest-tree load read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestLoad {
    /// Manifest files visited.
    pub files: usize,
    /// Documents turned into stubs.
    pub documents: usize,
    /// Documents or files that were skipped because they could not be used.
    pub skipped: usize,
}

#[derive(Debug, Deserialize)]
struct ClusterListing {
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    items: Vec<RawManifest>,
}

impl ResourceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a stub, returning the stub it replaced if the identity was present.
    pub fn insert(&mut self, stub: ResourceStub) -> Option<ResourceStub> {
        self.items.insert(stub.checksum(), stub)
    }

    pub fn contains(&self, checksum: &str) -> bool {
        self.items.contains_key(checksum)
    }

    pub fn get(&self, checksum: &str) -> Option<&ResourceStub> {
        self.items.get(checksum)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Read-only view of the checksum → stub map.
    pub fn items(&self) -> &HashMap<String, ResourceStub> {
        &self.items
    }

    /// Stubs in (kind, name, namespace) order.
    pub fn sorted(&self) -> Vec<ResourceStub> {
        let mut stubs: Vec<_> = self.items.values().cloned().collect();
        stubs.sort();
        stubs
    }

    /// Drains every document of one manifest file into the collection.
    ///
    /// Documents that cannot be used are logged and skipped. Returns the
    /// number of stubs added and the number of documents skipped.
    pub fn add_manifest(&mut self, content: &[u8], origin: &Path) -> (usize, usize) {
        let mut added = 0;
        let mut skipped = 0;

        for result in ManifestDocuments::new(content) {
            match result {
                Ok(stub) => {
                    self.insert(stub);
                    added += 1;
                }
                Err(e) => {
                    log::warn!("Skipping document in {}: {}", origin.display(), e);
                    skipped += 1;
                }
            }
        }

        (added, skipped)
    }

    /// Loads every `*.yaml` file below `root`.
    ///
    /// Unreadable or unparsable files are logged and skipped; only a missing
    /// root fails the load.
    pub fn load_from_manifest_tree(&mut self, root: &Path) -> Result<ManifestLoad> {
        if !root.is_dir() {
            return Err(ResourceError::ManifestDirNotFound(root.to_path_buf()));
        }

        let mut load = ManifestLoad::default();

        for path in manifest_files(root) {
            load.files += 1;

            let content = match fs::read(&path) {
                Ok(content) => content,
                Err(source) => {
                    let err = ResourceError::ReadFile {
                        path: path.clone(),
                        source,
                    };
                    log::warn!("{}", err);
                    load.skipped += 1;
                    continue;
                }
            };

            let (added, skipped) = self.add_manifest(&content, &path);
            load.documents += added;
            load.skipped += skipped;
        }

        log::debug!(
            "Loaded {} resources from {} manifest files under {}",
            load.documents,
            load.files,
            root.display()
        );

        Ok(load)
    }

    /// Loads a cluster listing (`kubectl get ... -o yaml`).
    ///
    /// The payload must be a `List`; items of excluded kinds and items
    /// without a kind are skipped. Returns the number of stubs added.
    pub fn load_from_cluster_listing(&mut self, bytes: &[u8]) -> Result<usize> {
        let listing: ClusterListing = serde_yaml::from_slice(bytes)?;

        let kind = listing.kind.unwrap_or_default();
        if kind != LIST_KIND {
            return Err(ResourceError::NotAList(kind));
        }

        let mut added = 0;
        for item in listing.items {
            if item.kind().map(is_excluded_kind).unwrap_or(false) {
                continue;
            }

            match ResourceStub::try_from(item) {
                Ok(stub) => {
                    self.insert(stub);
                    added += 1;
                }
                Err(e) => log::debug!("Skipping cluster listing item: {}", e),
            }
        }

        Ok(added)
    }

    /// Every stub of `self` whose identity is absent from `desired`.
    pub fn difference(&self, desired: &ResourceCollection) -> Vec<ResourceStub> {
        let mut stubs: Vec<_> = self
            .items
            .iter()
            .filter(|(checksum, _)| !desired.contains(checksum))
            .map(|(_, stub)| stub.clone())
            .collect();
        stubs.sort();
        stubs
    }
}

/// Resources present in `actual` but no longer declared in `desired`.
pub fn prune_set(desired: &ResourceCollection, actual: &ResourceCollection) -> Vec<ResourceStub> {
    actual.difference(desired)
}

impl FromIterator<ResourceStub> for ResourceCollection {
    fn from_iter<I: IntoIterator<Item = ResourceStub>>(iter: I) -> Self {
        let mut collection = Self::new();
        for stub in iter {
            collection.insert(stub);
        }
        collection
    }
}
