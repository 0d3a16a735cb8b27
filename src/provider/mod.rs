//! External backends
//!
//! Cluster provisioning and container-image tooling are reached through two
//! traits so the lifecycle code never shells out directly:
//!
//! - [`Provider`] - create/delete/list clusters, export kubeconfig, list
//!   nodes and load image archives ([`KindProvider`])
//! - [`ImageTool`] - check, pull and save local images ([`DockerCli`])

mod docker;
mod kind;

pub use docker::DockerCli;
pub use kind::KindProvider;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Failure of an external tool invocation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("`{command}` failed: {message}")]
pub struct CommandError {
    pub command: String,
    pub message: String,
}

impl CommandError {
    pub fn new(program: &str, args: &[&str], message: impl Into<String>) -> Self {
        let command = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        Self {
            command,
            message: message.into(),
        }
    }
}

/// Everything the backend needs to bring a cluster up
#[derive(Clone, Debug)]
pub struct CreateRequest {
    pub name: String,
    /// Rendered cluster config document
    pub config: String,
    pub node_image: Option<String>,
    pub wait: Option<Duration>,
    pub kubeconfig: PathBuf,
}

/// Cluster provisioning backend session
#[async_trait]
pub trait Provider: Send + Sync {
    async fn create_cluster(&self, request: &CreateRequest) -> Result<(), CommandError>;

    async fn delete_cluster(&self, name: &str, kubeconfig: &Path) -> Result<(), CommandError>;

    async fn list_clusters(&self) -> Result<Vec<String>, CommandError>;

    async fn export_kubeconfig(&self, name: &str, kubeconfig: &Path)
        -> Result<(), CommandError>;

    async fn list_nodes(&self, name: &str) -> Result<Vec<String>, CommandError>;

    async fn load_image_archive(
        &self,
        name: &str,
        node: &str,
        archive: &Path,
    ) -> Result<(), CommandError>;
}

/// Local container-image tooling
#[async_trait]
pub trait ImageTool: Send + Sync {
    async fn image_exists(&self, image: &str) -> Result<bool, CommandError>;

    async fn pull(&self, image: &str) -> Result<(), CommandError>;

    /// Save all images into one archive
    async fn save(&self, images: &[String], archive: &Path) -> Result<(), CommandError>;
}

/// Mints a fresh provider session for every cluster handle
pub type ProviderFactory = Arc<dyn Fn() -> Box<dyn Provider> + Send + Sync>;

/// Factory for sessions driving the `kind` CLI
pub fn kind_provider_factory() -> ProviderFactory {
    Arc::new(|| Box::new(KindProvider::new()) as Box<dyn Provider>)
}

/// Run a tool to completion and return its stdout
pub(crate) async fn run_command(
    program: &str,
    args: &[&str],
    stdin: Option<&str>,
) -> Result<String, CommandError> {
    debug!("Running {} {}", program, args.join(" "));

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

    let mut child = cmd
        .spawn()
        .map_err(|e| CommandError::new(program, args, e.to_string()))?;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input.as_bytes())
            .await
            .map_err(|e| CommandError::new(program, args, e.to_string()))?;
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| CommandError::new(program, args, e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CommandError::new(program, args, stderr.trim()));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Non-empty trimmed lines of tool output
pub(crate) fn output_lines(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}
