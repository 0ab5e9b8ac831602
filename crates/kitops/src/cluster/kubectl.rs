//! `kubectl` implementation of the cluster command interface.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::error::{classify_kubectl_error, ClusterError, Result};
use super::{ClusterClient, Existence, ResourceRef};
use crate::process::{format_command_error, run_with_timeout, RunError};
use crate::resource::ResourceLabel;

/// Per-call timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Shells out to `kubectl`, one process per operation.
#[derive(Debug, Clone)]
pub struct Kubectl {
    program: PathBuf,
    context: Option<String>,
    kubeconfig: Option<PathBuf>,
    timeout: Duration,
}

impl Kubectl {
    /// Creates a client running `program` (usually `kubectl` from `PATH`).
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            context: None,
            kubeconfig: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_kubeconfig(mut self, kubeconfig: impl Into<PathBuf>) -> Self {
        self.kubeconfig = Some(kubeconfig.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn command(&self, args: Vec<OsString>) -> Command {
        let mut cmd = Command::new(&self.program);
        if let Some(context) = &self.context {
            cmd.arg("--context").arg(context);
        }
        if let Some(kubeconfig) = &self.kubeconfig {
            cmd.arg("--kubeconfig").arg(kubeconfig);
        }
        cmd.args(args);
        cmd
    }

    /// Runs one kubectl invocation and returns its output whatever the exit status.
    async fn output(&self, verb: &str, args: Vec<OsString>) -> Result<Output> {
        log::debug!("kubectl {}", display_args(&args));

        run_with_timeout(self.command(args), self.timeout)
            .await
            .map_err(|e| match e {
                RunError::Spawn(source) => ClusterError::Spawn {
                    program: self.program.display().to_string(),
                    source,
                },
                RunError::TimedOut(timeout) => ClusterError::Timeout {
                    command: verb.to_string(),
                    secs: timeout.as_secs(),
                },
            })
    }

    /// Runs one kubectl invocation, classifying a non-zero exit as an error.
    async fn run(&self, verb: &str, args: Vec<OsString>) -> Result<Output> {
        let output = self.output(verb, args).await?;

        if output.status.success() {
            Ok(output)
        } else {
            Err(classify_kubectl_error(verb, &format_command_error(&output)))
        }
    }
}

impl Default for Kubectl {
    fn default() -> Self {
        Self::new("kubectl")
    }
}

fn to_args<const N: usize>(args: [&str; N]) -> Vec<OsString> {
    args.into_iter().map(OsString::from).collect()
}

fn display_args(args: &[OsString]) -> String {
    args.iter()
        .map(|a| a.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

fn push_scope(args: &mut Vec<OsString>, target: &ResourceRef<'_>) {
    if let Some(namespace) = target.namespace {
        args.push("-n".into());
        args.push(namespace.into());
    }
}

fn exists_args(target: &ResourceRef<'_>) -> Vec<OsString> {
    let mut args = to_args([
        "get",
        target.kind,
        target.name,
        "--ignore-not-found",
        "-o",
        "name",
    ]);
    push_scope(&mut args, target);
    args
}

fn label_args(target: &ResourceRef<'_>, label: &ResourceLabel) -> Vec<OsString> {
    let selector = label.to_string();
    let mut args = to_args(["label", "--overwrite", target.kind, target.name, &selector]);
    push_scope(&mut args, target);
    args
}

fn delete_args(target: &ResourceRef<'_>) -> Vec<OsString> {
    let mut args = to_args([
        "delete",
        target.kind,
        target.name,
        "--ignore-not-found",
        "--wait=false",
    ]);
    push_scope(&mut args, target);
    args
}

fn list_args(kind: &str, namespaced: bool, label: &ResourceLabel) -> Vec<OsString> {
    let selector = label.selector();
    let mut args = to_args(["get", kind, "-l", &selector, "-o", "yaml"]);
    if namespaced {
        args.push("-A".into());
    }
    args
}

fn apply_args(dir: &Path) -> Vec<OsString> {
    let mut target = dir.as_os_str().to_os_string();
    if !dir.as_os_str().to_string_lossy().ends_with('/') {
        target.push("/");
    }
    vec!["apply".into(), "-f".into(), target]
}

#[async_trait]
impl ClusterClient for Kubectl {
    async fn api_resources(&self) -> Result<String> {
        let output = self.run("api-resources", to_args(["api-resources"])).await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn apply_dir(&self, dir: &Path) -> Result<()> {
        let output = self.run("apply", apply_args(dir)).await?;
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            log::debug!("{}", line);
        }
        Ok(())
    }

    async fn exists(&self, target: &ResourceRef<'_>) -> Existence {
        match self.output("get", exists_args(target)).await {
            Ok(output) if output.status.success() => {
                if output.stdout.iter().all(u8::is_ascii_whitespace) {
                    Existence::Absent
                } else {
                    Existence::Exists
                }
            }
            Ok(output) => {
                log::warn!(
                    "Could not determine whether {} exists: {}",
                    target,
                    format_command_error(&output)
                );
                Existence::Unknown
            }
            Err(e) => {
                log::warn!("Could not determine whether {} exists: {}", target, e);
                Existence::Unknown
            }
        }
    }

    async fn label(&self, target: &ResourceRef<'_>, label: &ResourceLabel) -> Result<()> {
        self.run("label", label_args(target, label)).await.map(drop)
    }

    async fn delete(&self, target: &ResourceRef<'_>) -> Result<()> {
        self.run("delete", delete_args(target)).await.map(drop)
    }

    async fn list_labeled(
        &self,
        kind: &str,
        namespaced: bool,
        label: &ResourceLabel,
    ) -> Result<Vec<u8>> {
        let output = self.run("get", list_args(kind, namespaced, label)).await?;
        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    fn deployment() -> ResourceRef<'static> {
        ResourceRef {
            kind: "Deployment",
            name: "web",
            namespace: Some("prod"),
        }
    }

    #[test]
    fn test_exists_args_namespaced() {
        assert_eq!(
            strings(exists_args(&deployment())),
            vec!["get", "Deployment", "web", "--ignore-not-found", "-o", "name", "-n", "prod"]
        );
    }

    #[test]
    fn test_label_args_cluster_scoped() {
        let target = ResourceRef {
            kind: "Namespace",
            name: "prod",
            namespace: None,
        };
        let label = ResourceLabel::new("managedBy", "repo");

        assert_eq!(
            strings(label_args(&target, &label)),
            vec!["label", "--overwrite", "Namespace", "prod", "managedBy=repo"]
        );
    }

    #[test]
    fn test_delete_args() {
        assert_eq!(
            strings(delete_args(&deployment())),
            vec![
                "delete",
                "Deployment",
                "web",
                "--ignore-not-found",
                "--wait=false",
                "-n",
                "prod"
            ]
        );
    }

    #[test]
    fn test_list_args_all_namespaces_only_when_namespaced() {
        let label = ResourceLabel::new("managedBy", "repo");

        assert_eq!(
            strings(list_args("ConfigMap", true, &label)),
            vec!["get", "ConfigMap", "-l", "managedBy=repo", "-o", "yaml", "-A"]
        );
        assert_eq!(
            strings(list_args("Namespace", false, &label)),
            vec!["get", "Namespace", "-l", "managedBy=repo", "-o", "yaml"]
        );
    }

    #[test]
    fn test_apply_args_trailing_slash() {
        assert_eq!(
            strings(apply_args(Path::new("/tmp/repo/apps"))),
            vec!["apply", "-f", "/tmp/repo/apps/"]
        );
        assert_eq!(
            strings(apply_args(Path::new("/tmp/repo/apps/"))),
            vec!["apply", "-f", "/tmp/repo/apps/"]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_global_flags_precede_command() {
        let kubectl = Kubectl::new("echo")
            .with_context("staging")
            .with_kubeconfig("/etc/kube/config");

        let output = kubectl.api_resources().await.unwrap();

        assert_eq!(
            output.trim(),
            "--context staging --kubeconfig /etc/kube/config api-resources"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_existence_is_three_valued() {
        let target = deployment();

        assert_eq!(Kubectl::new("echo").exists(&target).await, Existence::Exists);
        assert_eq!(Kubectl::new("true").exists(&target).await, Existence::Absent);
        assert_eq!(Kubectl::new("false").exists(&target).await, Existence::Unknown);
        assert_eq!(
            Kubectl::new("/nonexistent/kubectl").exists(&target).await,
            Existence::Unknown
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_command_is_classified() {
        let err = Kubectl::new("false").delete(&deployment()).await.unwrap_err();

        assert!(matches!(err, ClusterError::CommandFailed { command, .. } if command == "delete"));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let err = Kubectl::new("/nonexistent/kubectl")
            .api_resources()
            .await
            .unwrap_err();

        assert!(matches!(err, ClusterError::Spawn { .. }));
    }
}
