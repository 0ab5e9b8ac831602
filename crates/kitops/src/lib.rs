//! kitops - a minimal GitOps reconciliation engine.
//!
//! Given a commit of a manifest repository, kitops checks the commit out,
//! applies every manifest directory with `kubectl`, labels each declared
//! resource as managed by the repository, and deletes cluster resources that
//! carry the repository label but are no longer declared.
//!
//! Reconciliation requests are serialized through a [`CommitQueue`], so at
//! most one cycle touches the cluster at a time.

pub mod cluster;
pub mod config;
pub mod error;
pub mod queue;
pub mod reconciler;
pub mod resource;
pub mod sanitize;
pub mod source;

mod process;

pub use cluster::{ClusterClient, ClusterError, Existence, KindResolver, Kubectl, ResourceRef};
pub use config::{LogFormat, Settings};
pub use error::{ConfigError, KitopsError};
pub use queue::{CommitQueue, InFlight, Processor, QueueSnapshot, QueueStatus};
pub use reconciler::{CycleOutcome, ReconcileHistory, ReconcileRecord, Reconciler};
pub use resource::{ResourceCollection, ResourceError, ResourceLabel, ResourceStub};
pub use source::{CommitId, GitSource, SourceCheckout, SourceError};
