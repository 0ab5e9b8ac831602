//! The reconcile cycle for one commit.
//!
//! checkout → apply every manifest directory → refresh the kind catalog →
//! load desired state → label desired resources → load labelled cluster
//! resources → prune what is no longer declared. Only checkout and apply
//! decide the cycle's outcome; labelling and pruning failures are logged and
//! skipped.

mod history;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::Instrument;

use crate::cluster::{ClusterClient, Existence, KindResolver, ResourceRef};
use crate::queue::Processor;
use crate::resource::{
    manifest::manifest_dirs, prune_set, ResourceCollection, ResourceLabel, ResourceStub,
    DEFAULT_LABEL_KEY,
};
use crate::sanitize::redact_repo_url;
use crate::source::{CommitId, SourceCheckout};

pub use history::{CycleOutcome, ReconcileHistory, ReconcileRecord, DEFAULT_HISTORY_LIMIT};

/// Result of the apply pass.
#[derive(Debug, Clone, Default)]
pub struct ApplyOutcome {
    pub applied: Vec<PathBuf>,
    /// Failed directories with the reason.
    pub failed: Vec<(PathBuf, String)>,
}

/// Result of labelling the desired collection.
#[derive(Debug, Clone, Default)]
pub struct LabelOutcome {
    pub labeled: usize,
    pub skipped: Vec<ResourceStub>,
}

/// Result of the prune pass.
#[derive(Debug, Clone, Default)]
pub struct PruneOutcome {
    pub pruned: Vec<ResourceStub>,
    /// Candidates left in place because existence was unknown or delete failed.
    pub skipped: Vec<ResourceStub>,
    pub errors: Vec<String>,
}

/// Drives reconcile cycles for one repository against one cluster.
pub struct Reconciler {
    source: Arc<dyn SourceCheckout>,
    cluster: Arc<dyn ClusterClient>,
    kinds: Arc<KindResolver>,
    label: ResourceLabel,
    manifest_path: PathBuf,
    history: Arc<ReconcileHistory>,
}

impl Reconciler {
    /// Creates a reconciler labelling resources with the default label key.
    pub fn new(
        source: Arc<dyn SourceCheckout>,
        cluster: Arc<dyn ClusterClient>,
        kinds: Arc<KindResolver>,
    ) -> Self {
        let label = ResourceLabel::for_repository(DEFAULT_LABEL_KEY, source.url());
        Self {
            source,
            cluster,
            kinds,
            label,
            manifest_path: PathBuf::new(),
            history: Arc::new(ReconcileHistory::default()),
        }
    }

    pub fn with_label_key(mut self, key: &str) -> Self {
        self.label = ResourceLabel::for_repository(key, self.source.url());
        self
    }

    /// Restricts the manifest tree to a sub-directory of the checkout.
    pub fn with_manifest_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_path = path.into();
        self
    }

    pub fn with_history(mut self, history: Arc<ReconcileHistory>) -> Self {
        self.history = history;
        self
    }

    pub fn label(&self) -> &ResourceLabel {
        &self.label
    }

    pub fn history(&self) -> Arc<ReconcileHistory> {
        Arc::clone(&self.history)
    }

    pub fn kinds(&self) -> Arc<KindResolver> {
        Arc::clone(&self.kinds)
    }

    /// Root of the manifest tree inside the checkout.
    pub fn manifest_root(&self) -> PathBuf {
        if self.manifest_path.as_os_str().is_empty() {
            self.source.directory().to_path_buf()
        } else {
            self.source.directory().join(&self.manifest_path)
        }
    }

    /// Runs one full cycle for `commit` and records it in the history.
    pub async fn reconcile(&self, commit: &CommitId) -> ReconcileRecord {
        let mut record = ReconcileRecord::start(commit.clone());
        let span = tracing::info_span!(
            "reconcile",
            commit = %commit.short(),
            run_id = %record.run_id
        );

        self.run_cycle(commit, &mut record).instrument(span).await;
        record.finish();

        match record.outcome {
            CycleOutcome::Succeeded => log::info!(
                "Reconciled {} in {}ms: {} directories applied, {} labeled, {} pruned",
                commit.short(),
                record.duration_ms().unwrap_or_default(),
                record.applied_directories.len(),
                record.labeled,
                record.pruned.len()
            ),
            outcome => log::error!(
                "Reconcile of {} finished with {:?}: {} errors",
                commit.short(),
                outcome,
                record.errors.len()
            ),
        }

        self.history.push(record.clone());
        record
    }

    async fn run_cycle(&self, commit: &CommitId, record: &mut ReconcileRecord) {
        log::info!(
            "Reconciling {} from {}",
            commit,
            redact_repo_url(self.source.url())
        );

        if let Err(e) = self
            .source
            .checkout(commit)
            .instrument(tracing::info_span!("checkout"))
            .await
        {
            if e.is_retryable() {
                log::warn!("Checkout of {} failed, trigger it again: {}", commit.short(), e);
            } else {
                log::error!("Checkout of {} failed: {}", commit.short(), e);
            }
            record.outcome = CycleOutcome::CheckoutFailed;
            record.push_error(e);
            return;
        }

        let root = self.manifest_root();

        let applied = self
            .apply_tree(&root)
            .instrument(tracing::info_span!("apply_tree"))
            .await;
        record.applied_directories = applied.applied;
        if !applied.failed.is_empty() {
            record.outcome = CycleOutcome::ApplyFailed;
        }
        for (dir, reason) in applied.failed {
            record
                .errors
                .push(format!("apply {}: {}", dir.display(), reason));
            record.failed_directories.push(dir);
        }

        // Kinds defined by this commit are only served once it is applied.
        self.kinds.begin_cycle().await;

        let desired = match self.load_desired(&root) {
            Ok(desired) => desired,
            Err(e) => {
                log::error!("Skipping label and prune: {}", e);
                record.push_error(e);
                return;
            }
        };
        record.desired = desired.len();

        let labels = self
            .label_all(&desired)
            .instrument(tracing::info_span!("label"))
            .await;
        record.labeled = labels.labeled;
        record.unlabeled = labels.skipped;

        let actual = self
            .load_actual()
            .instrument(tracing::info_span!("load_actual"))
            .await;
        record.actual = actual.len();

        let pruned = self
            .prune(&desired, &actual)
            .instrument(tracing::info_span!("prune"))
            .await;
        record.pruned = pruned.pruned;
        record.prune_skipped = pruned.skipped;
        record.errors.extend(pruned.errors);
    }

    /// Applies every directory under `root` that directly holds a manifest.
    ///
    /// A failing directory is logged and the walk continues. A missing root
    /// counts as a failure.
    pub async fn apply_tree(&self, root: &Path) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();

        if !root.is_dir() {
            log::error!("Manifest root {} does not exist", root.display());
            outcome
                .failed
                .push((root.to_path_buf(), "manifest root not found".to_string()));
            return outcome;
        }

        for dir in manifest_dirs(root) {
            match self.cluster.apply_dir(&dir).await {
                Ok(()) => {
                    log::info!("Applied manifests in {}", dir.display());
                    outcome.applied.push(dir);
                }
                Err(e) => {
                    log::error!("Failed to apply manifests in {}: {}", dir.display(), e);
                    outcome.failed.push((dir, e.to_string()));
                }
            }
        }

        outcome
    }

    /// Loads the desired collection from the manifest tree.
    pub fn load_desired(&self, root: &Path) -> crate::resource::Result<ResourceCollection> {
        let mut desired = ResourceCollection::new();
        let load = desired.load_from_manifest_tree(root)?;
        if load.skipped > 0 {
            log::warn!(
                "{} manifest documents could not be read and were skipped",
                load.skipped
            );
        }
        Ok(desired)
    }

    /// Labels every desired resource that is present in the cluster.
    pub async fn label_all(&self, desired: &ResourceCollection) -> LabelOutcome {
        let mut outcome = LabelOutcome::default();

        for stub in desired.sorted() {
            let namespaced = self.kinds.is_namespaced(stub.kind()).await;
            let target = ResourceRef::new(&stub, namespaced);

            match self.cluster.exists(&target).await {
                Existence::Exists => match self.cluster.label(&target, &self.label).await {
                    Ok(()) => outcome.labeled += 1,
                    Err(e) => {
                        log::warn!("Failed to label {}: {}", target, e);
                        outcome.skipped.push(stub.clone());
                    }
                },
                Existence::Absent => {
                    log::warn!("Not labelling {}: it does not exist in the cluster", target);
                    outcome.skipped.push(stub.clone());
                }
                Existence::Unknown => {
                    log::warn!("Not labelling {}: existence unknown", target);
                    outcome.skipped.push(stub.clone());
                }
            }
        }

        outcome
    }

    /// Lists every resource carrying the label, across all catalog kinds.
    pub async fn load_actual(&self) -> ResourceCollection {
        let mut actual = ResourceCollection::new();

        for (kind, namespaced) in self.kinds.kinds().await {
            match self
                .cluster
                .list_labeled(&kind, namespaced, &self.label)
                .await
            {
                Ok(listing) => {
                    if let Err(e) = actual.load_from_cluster_listing(&listing) {
                        log::warn!("Ignoring {} listing: {}", kind, e);
                    }
                }
                Err(e) if e.is_retryable() => log::warn!("Failed to list {}: {}", kind, e),
                Err(e) => log::debug!("Failed to list {}: {}", kind, e),
            }
        }

        actual
    }

    /// Deletes every labelled resource that is no longer declared.
    pub async fn prune(
        &self,
        desired: &ResourceCollection,
        actual: &ResourceCollection,
    ) -> PruneOutcome {
        let mut outcome = PruneOutcome::default();

        for stub in prune_set(desired, actual) {
            let namespaced = self.kinds.is_namespaced(stub.kind()).await;
            let target = ResourceRef::new(&stub, namespaced);

            match self.cluster.exists(&target).await {
                Existence::Exists => match self.cluster.delete(&target).await {
                    Ok(()) => {
                        log::info!("Pruned {}", target);
                        outcome.pruned.push(stub.clone());
                    }
                    Err(e) => {
                        log::warn!("Failed to prune {}: {}", target, e);
                        outcome.errors.push(format!("delete {}: {}", target, e));
                        outcome.skipped.push(stub.clone());
                    }
                },
                Existence::Absent => log::debug!("{} is already gone", target),
                Existence::Unknown => {
                    log::warn!("Not pruning {}: existence unknown", target);
                    outcome.skipped.push(stub.clone());
                }
            }
        }

        outcome
    }
}

#[async_trait]
impl Processor<CommitId> for Reconciler {
    async fn process(&self, commit: &CommitId) -> bool {
        self.reconcile(commit).await.is_success()
    }
}
