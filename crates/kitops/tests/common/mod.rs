//! Shared test utilities for kitops integration tests.
//!
//! This module provides:
//! - `FakeCluster`, an in-memory cluster answering the kubectl command interface
//! - `FakeSource`, a checkout whose commits are scripted file sets
//! - `ControllerHarness`, the reconciler wired to both

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use kitops::cluster::{ClusterClient, ClusterError, Existence, KindResolver, RefreshPolicy, ResourceRef};
use kitops::resource::{manifest::is_manifest_file, ManifestDocuments, ResourceLabel};
use kitops::source::{CommitId, SourceCheckout, SourceError};
use kitops::Reconciler;

pub const REPO_URL: &str = "https://example.com/org/manifests.git";
pub const REPO_LABEL_VALUE: &str = "https---example.com-org-manifests.git";

/// (kind, namespace for namespaced kinds, name)
pub type ObjectKey = (String, Option<String>, String);

#[derive(Default)]
struct ClusterState {
    catalog: Vec<(String, bool)>,
    objects: BTreeMap<ObjectKey, BTreeMap<String, String>>,
    applied: Vec<PathBuf>,
    failing_dirs: HashSet<String>,
    unknown_kinds: HashSet<String>,
    kinds_on_apply: Vec<(String, bool)>,
    deleted: Vec<ObjectKey>,
}

/// In-memory cluster: `apply_dir` creates objects from manifests, `label`
/// and `delete` mutate them, listings are rendered as YAML `List`s.
pub struct FakeCluster {
    state: Mutex<ClusterState>,
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        let catalog = [
            ("ConfigMap", true),
            ("Deployment", true),
            ("Service", true),
            ("Secret", true),
            ("Namespace", false),
            ("ClusterRole", false),
        ]
        .into_iter()
        .map(|(kind, namespaced)| (kind.to_string(), namespaced))
        .collect();

        Arc::new(Self {
            state: Mutex::new(ClusterState {
                catalog,
                ..ClusterState::default()
            }),
        })
    }

    fn namespaced(state: &ClusterState, kind: &str) -> bool {
        state
            .catalog
            .iter()
            .any(|(k, namespaced)| k == kind && *namespaced)
    }

    fn key(target: &ResourceRef<'_>) -> ObjectKey {
        (
            target.kind.to_string(),
            target.namespace.map(str::to_string),
            target.name.to_string(),
        )
    }

    /// Makes `apply_dir` fail for directories with this name.
    pub fn fail_apply_in(&self, dir_name: &str) {
        self.state.lock().unwrap().failing_dirs.insert(dir_name.to_string());
    }

    /// Makes existence checks for `kind` return `Unknown`.
    pub fn unknown_existence_for(&self, kind: &str) {
        self.state.lock().unwrap().unknown_kinds.insert(kind.to_string());
    }

    /// Serves `kind` from the first `apply_dir` on, as if an applied
    /// manifest had defined it.
    pub fn install_kind_on_apply(&self, kind: &str, namespaced: bool) {
        self.state
            .lock()
            .unwrap()
            .kinds_on_apply
            .push((kind.to_string(), namespaced));
    }

    /// Creates an object directly, as if someone had applied it earlier.
    pub fn insert_object(&self, kind: &str, namespace: Option<&str>, name: &str, labels: &[(&str, &str)]) {
        let labels = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.state.lock().unwrap().objects.insert(
            (kind.to_string(), namespace.map(str::to_string), name.to_string()),
            labels,
        );
    }

    pub fn has_object(&self, kind: &str, namespace: Option<&str>, name: &str) -> bool {
        self.labels_of(kind, namespace, name).is_some()
    }

    pub fn labels_of(&self, kind: &str, namespace: Option<&str>, name: &str) -> Option<BTreeMap<String, String>> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(&(kind.to_string(), namespace.map(str::to_string), name.to_string()))
            .cloned()
    }

    pub fn applied_dirs(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().applied.clone()
    }

    pub fn deleted(&self) -> Vec<ObjectKey> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn object_count(&self) -> usize {
        self.state.lock().unwrap().objects.len()
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn api_resources(&self) -> kitops::cluster::Result<String> {
        let state = self.state.lock().unwrap();
        let mut table = String::from("NAME SHORTNAMES APIVERSION NAMESPACED KIND\n");
        for (kind, namespaced) in &state.catalog {
            table.push_str(&format!("{}s v1 {} {}\n", kind.to_lowercase(), namespaced, kind));
        }
        Ok(table)
    }

    async fn apply_dir(&self, dir: &Path) -> kitops::cluster::Result<()> {
        let mut state = self.state.lock().unwrap();

        let dir_name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if state.failing_dirs.contains(&dir_name) {
            return Err(ClusterError::CommandFailed {
                command: "apply".to_string(),
                message: format!("error validating manifests in {}", dir.display()),
            });
        }

        let installed = std::mem::take(&mut state.kinds_on_apply);
        state.catalog.extend(installed);

        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| {
                let hidden = path
                    .file_name()
                    .map(|n| n.to_string_lossy().starts_with('.'))
                    .unwrap_or(false);
                !hidden && is_manifest_file(path)
            })
            .collect();
        files.sort();

        for file in files {
            let content = fs::read(&file).unwrap();
            for stub in ManifestDocuments::new(&content).flatten() {
                let namespace = Self::namespaced(&state, stub.kind()).then(|| stub.namespace().to_string());
                state
                    .objects
                    .entry((stub.kind().to_string(), namespace, stub.name().to_string()))
                    .or_default();
            }
        }

        state.applied.push(dir.to_path_buf());
        Ok(())
    }

    async fn exists(&self, target: &ResourceRef<'_>) -> Existence {
        let state = self.state.lock().unwrap();
        if state.unknown_kinds.contains(target.kind) {
            return Existence::Unknown;
        }
        if state.objects.contains_key(&Self::key(target)) {
            Existence::Exists
        } else {
            Existence::Absent
        }
    }

    async fn label(&self, target: &ResourceRef<'_>, label: &ResourceLabel) -> kitops::cluster::Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.objects.get_mut(&Self::key(target)) {
            Some(labels) => {
                labels.insert(label.key().to_string(), label.value().to_string());
                Ok(())
            }
            None => Err(ClusterError::NotFound(target.to_string())),
        }
    }

    async fn delete(&self, target: &ResourceRef<'_>) -> kitops::cluster::Result<()> {
        let mut state = self.state.lock().unwrap();
        let key = Self::key(target);
        state.objects.remove(&key);
        state.deleted.push(key);
        Ok(())
    }

    async fn list_labeled(
        &self,
        kind: &str,
        _namespaced: bool,
        label: &ResourceLabel,
    ) -> kitops::cluster::Result<Vec<u8>> {
        let state = self.state.lock().unwrap();
        let items: Vec<serde_json::Value> = state
            .objects
            .iter()
            .filter(|((k, _, _), labels)| {
                k == kind && labels.get(label.key()).map(String::as_str) == Some(label.value())
            })
            .map(|((k, namespace, name), labels)| {
                let mut metadata = serde_json::json!({ "name": name, "labels": labels });
                if let Some(namespace) = namespace {
                    metadata["namespace"] = serde_json::json!(namespace);
                }
                serde_json::json!({ "apiVersion": "v1", "kind": k, "metadata": metadata })
            })
            .collect();

        let listing = serde_json::json!({
            "apiVersion": "v1",
            "kind": "List",
            "items": items,
            "metadata": { "resourceVersion": "" },
        });
        Ok(serde_yaml::to_string(&listing).unwrap().into_bytes())
    }
}

/// Checkout whose commits are scripted sets of files.
pub struct FakeSource {
    url: String,
    dir: TempDir,
    commits: Mutex<HashMap<CommitId, Vec<(String, String)>>>,
    checkouts: Mutex<Vec<CommitId>>,
}

impl FakeSource {
    pub fn new(url: &str) -> Arc<Self> {
        Arc::new(Self {
            url: url.to_string(),
            dir: TempDir::new().unwrap(),
            commits: Mutex::new(HashMap::new()),
            checkouts: Mutex::new(Vec::new()),
        })
    }

    /// Scripts `commit` as the given (relative path, content) files.
    pub fn add_commit(&self, commit: &CommitId, files: &[(&str, &str)]) {
        let files = files
            .iter()
            .map(|(path, content)| (path.to_string(), content.to_string()))
            .collect();
        self.commits.lock().unwrap().insert(commit.clone(), files);
    }

    pub fn checkouts(&self) -> Vec<CommitId> {
        self.checkouts.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceCheckout for FakeSource {
    fn url(&self) -> &str {
        &self.url
    }

    fn directory(&self) -> &Path {
        self.dir.path()
    }

    async fn checkout(&self, commit: &CommitId) -> kitops::source::Result<()> {
        let files = self
            .commits
            .lock()
            .unwrap()
            .get(commit)
            .cloned()
            .ok_or_else(|| SourceError::UnknownCommit(commit.to_string()))?;

        for entry in fs::read_dir(self.dir.path()).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                fs::remove_dir_all(path).unwrap();
            } else {
                fs::remove_file(path).unwrap();
            }
        }

        for (relative, content) in files {
            let path = self.dir.path().join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }

        self.checkouts.lock().unwrap().push(commit.clone());
        Ok(())
    }
}

/// A reconciler wired to a fake cluster and a fake source.
pub struct ControllerHarness {
    pub cluster: Arc<FakeCluster>,
    pub source: Arc<FakeSource>,
    pub reconciler: Arc<Reconciler>,
}

impl ControllerHarness {
    pub fn new() -> Self {
        Self::with_manifest_path("")
    }

    pub fn with_manifest_path(manifest_path: &str) -> Self {
        Self::build(manifest_path, RefreshPolicy::PerCycle)
    }

    pub fn with_policy(policy: RefreshPolicy) -> Self {
        Self::build("", policy)
    }

    fn build(manifest_path: &str, policy: RefreshPolicy) -> Self {
        let cluster = FakeCluster::new();
        let source = FakeSource::new(REPO_URL);
        let kinds = Arc::new(KindResolver::new(cluster.clone(), policy));
        let reconciler = Reconciler::new(source.clone(), cluster.clone(), kinds)
            .with_manifest_path(manifest_path);

        Self {
            cluster,
            source,
            reconciler: Arc::new(reconciler),
        }
    }

    pub fn root(&self) -> PathBuf {
        self.source.directory().to_path_buf()
    }
}

/// Commit id `n` as a full 40-character hex string.
pub fn commit(n: u32) -> CommitId {
    CommitId::parse(&format!("{:040x}", n)).unwrap()
}

pub fn deployment(name: &str, namespace: &str) -> String {
    format!(
        "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: {}\n  namespace: {}\nspec:\n  replicas: 1\n",
        name, namespace
    )
}

pub fn service(name: &str, namespace: &str) -> String {
    format!(
        "apiVersion: v1\nkind: Service\nmetadata:\n  name: {}\n  namespace: {}\nspec:\n  ports:\n  - port: 80\n",
        name, namespace
    )
}

pub fn config_map(name: &str) -> String {
    format!("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: {}\ndata:\n  key: value\n", name)
}

pub fn widget(name: &str, namespace: &str) -> String {
    format!(
        "apiVersion: example.com/v1\nkind: Widget\nmetadata:\n  name: {}\n  namespace: {}\nspec:\n  size: 1\n",
        name, namespace
    )
}

pub fn widget_definition() -> String {
    "apiVersion: apiextensions.k8s.io/v1\nkind: CustomResourceDefinition\nmetadata:\n  name: widgets.example.com\n".to_string()
}

pub fn namespace(name: &str) -> String {
    format!("apiVersion: v1\nkind: Namespace\nmetadata:\n  name: {}\n", name)
}
