//! Source checkout: materializing a commit of the manifest repository.

mod commit;
mod error;
mod git;

use std::path::Path;

use async_trait::async_trait;

pub use commit::CommitId;
pub use error::{classify_git_error, Result, SourceError};
pub use git::GitSource;

/// A working tree that can be moved to any commit of one repository.
#[async_trait]
pub trait SourceCheckout: Send + Sync {
    /// Repository address; the reconciler-identity label is derived from it.
    fn url(&self) -> &str;

    /// Root of the working tree.
    fn directory(&self) -> &Path;

    /// Fetches the latest history and hard-resets the working tree to `commit`.
    ///
    /// Idempotent: checking out the same commit twice leaves the same tree.
    async fn checkout(&self, commit: &CommitId) -> Result<()>;
}
