//! Bounded history of reconcile cycles.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::KitopsError;
use crate::resource::ResourceStub;
use crate::source::CommitId;

/// Number of records kept when no limit is configured.
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// How a reconcile cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CycleOutcome {
    /// Checkout and every directory apply succeeded.
    Succeeded,
    /// At least one directory failed to apply (or the manifest root is missing).
    ApplyFailed,
    /// The commit could not be checked out; nothing else ran.
    CheckoutFailed,
}

impl CycleOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CycleOutcome::Succeeded)
    }
}

/// What one reconcile cycle did.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileRecord {
    pub run_id: Uuid,
    pub commit: CommitId,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: CycleOutcome,
    pub applied_directories: Vec<PathBuf>,
    pub failed_directories: Vec<PathBuf>,
    /// Resources declared at the commit.
    pub desired: usize,
    pub labeled: usize,
    /// Declared resources that were not labelled (absent, unknown or failed).
    pub unlabeled: Vec<ResourceStub>,
    /// Labelled resources found in the cluster.
    pub actual: usize,
    pub pruned: Vec<ResourceStub>,
    /// Prune candidates left in place (unknown existence or failed delete).
    pub prune_skipped: Vec<ResourceStub>,
    pub errors: Vec<String>,
}

impl ReconcileRecord {
    pub(crate) fn start(commit: CommitId) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            commit,
            started_at: Utc::now(),
            finished_at: None,
            outcome: CycleOutcome::Succeeded,
            applied_directories: Vec::new(),
            failed_directories: Vec::new(),
            desired: 0,
            labeled: 0,
            unlabeled: Vec::new(),
            actual: 0,
            pruned: Vec::new(),
            prune_skipped: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Records an error, prefixed with the concern it came from.
    pub(crate) fn push_error(&mut self, err: impl Into<KitopsError>) {
        self.errors.push(err.into().to_string());
    }

    pub(crate) fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// Wall-clock duration in milliseconds, once finished.
    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|finished| (finished - self.started_at).num_milliseconds())
    }
}

/// The most recent reconcile records, oldest first.
#[derive(Debug)]
pub struct ReconcileHistory {
    limit: usize,
    records: Mutex<VecDeque<ReconcileRecord>>,
}

impl ReconcileHistory {
    /// Creates a history keeping at most `limit` records (at least one).
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            limit,
            records: Mutex::new(VecDeque::with_capacity(limit)),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn push(&self, record: ReconcileRecord) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        while records.len() >= self.limit {
            records.pop_front();
        }
        records.push_back(record);
    }

    pub fn records(&self) -> Vec<ReconcileRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn latest(&self) -> Option<ReconcileRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .back()
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ReconcileHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}
