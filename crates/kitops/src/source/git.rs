//! `git` implementation of [`SourceCheckout`].

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::error::{classify_git_error, Result, SourceError};
use super::{CommitId, SourceCheckout};
use crate::process::{format_command_error, run_with_timeout, RunError};
use crate::sanitize::redact_repo_url;

/// Per-command timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// A local clone of the manifest repository, driven by the `git` CLI.
#[derive(Debug, Clone)]
pub struct GitSource {
    url: String,
    directory: PathBuf,
    timeout: Duration,
}

impl GitSource {
    /// Creates a handle; nothing is cloned until the first checkout.
    pub fn new(url: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            directory: directory.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Checks if the directory is a git repository.
    pub fn is_git_repo(&self) -> bool {
        self.directory.join(".git").exists()
    }

    /// Clones the repository, or re-points `origin` of an existing clone.
    pub async fn prepare(&self) -> Result<()> {
        if self.is_git_repo() {
            return self.set_remote().await;
        }

        if self.directory.exists() {
            let non_empty = fs::read_dir(&self.directory)
                .map_err(|source| SourceError::PrepareDirectory {
                    path: self.directory.clone(),
                    source,
                })?
                .next()
                .is_some();
            if non_empty {
                return Err(SourceError::NotARepository(self.directory.clone()));
            }
        } else if let Some(parent) = self.directory.parent() {
            fs::create_dir_all(parent).map_err(|source| SourceError::PrepareDirectory {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        log::info!(
            "Cloning {} into {}",
            redact_repo_url(&self.url),
            self.directory.display()
        );

        let mut cmd = Command::new("git");
        cmd.arg("clone")
            .arg("--no-checkout")
            .arg(&self.url)
            .arg(&self.directory);
        self.checked(cmd).await.map(drop)
    }

    /// Sets the remote URL.
    async fn set_remote(&self) -> Result<()> {
        let remote_exists = self
            .run_git(["remote", "get-url", "origin"])
            .await
            .map(|output| output.status.success())
            .unwrap_or(false);

        if remote_exists {
            self.git(["remote", "set-url", "origin", self.url.as_str()]).await?;
        } else {
            self.git(["remote", "add", "origin", self.url.as_str()]).await?;
        }

        Ok(())
    }

    fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new("git");
        cmd.current_dir(&self.directory).args(args);
        cmd
    }

    /// Runs git in the working tree and returns its output whatever the exit status.
    async fn run_git<I, S>(&self, args: I) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.output(self.command(args)).await
    }

    /// Runs git in the working tree, classifying a non-zero exit as an error.
    async fn git<I, S>(&self, args: I) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.checked(self.command(args)).await
    }

    async fn output(&self, cmd: Command) -> Result<Output> {
        run_with_timeout(cmd, self.timeout)
            .await
            .map_err(|e| match e {
                RunError::Spawn(source) => SourceError::Spawn(source),
                RunError::TimedOut(timeout) => SourceError::GitTimeout(timeout.as_secs()),
            })
    }

    async fn checked(&self, cmd: Command) -> Result<Output> {
        let output = self.output(cmd).await?;

        if output.status.success() {
            Ok(output)
        } else {
            Err(classify_git_error(&format_command_error(&output)))
        }
    }

    /// Full id of the commit currently checked out.
    pub async fn head(&self) -> Result<String> {
        let output = self.git(["rev-parse", "HEAD"]).await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl SourceCheckout for GitSource {
    fn url(&self) -> &str {
        &self.url
    }

    fn directory(&self) -> &Path {
        &self.directory
    }

    async fn checkout(&self, commit: &CommitId) -> Result<()> {
        self.prepare().await?;

        self.git(["fetch", "--force", "--prune", "origin"]).await?;
        self.git(["checkout", "--force", "--detach", commit.as_str()])
            .await?;
        self.git(["reset", "--hard", commit.as_str()]).await?;
        self.git(["clean", "-ffd"]).await?;

        let head = self.head().await?;
        if !head.eq_ignore_ascii_case(commit.as_str()) {
            return Err(SourceError::GitOperation(format!(
                "HEAD is at {} after checking out {}",
                head, commit
            )));
        }

        log::info!("Checked out commit {}", commit.short());
        Ok(())
    }
}
