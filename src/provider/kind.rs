//! `kind` CLI backend

use async_trait::async_trait;
use std::path::Path;
use tracing::info;

use super::{output_lines, run_command, CommandError, CreateRequest, Provider};

/// Provider session driving the `kind` binary
#[derive(Debug)]
pub struct KindProvider {
    binary: String,
}

impl Default for KindProvider {
    fn default() -> Self {
        Self {
            binary: "kind".to_string(),
        }
    }
}

impl KindProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific `kind` binary
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    async fn kind(&self, args: &[&str], stdin: Option<&str>) -> Result<String, CommandError> {
        run_command(&self.binary, args, stdin).await
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Arguments for `kind create cluster`, config read from stdin
fn create_args(request: &CreateRequest) -> Vec<String> {
    let mut args = vec![
        "create".to_string(),
        "cluster".to_string(),
        "--name".to_string(),
        request.name.clone(),
        "--config".to_string(),
        "-".to_string(),
        "--kubeconfig".to_string(),
        path_arg(&request.kubeconfig),
    ];

    if let Some(image) = &request.node_image {
        args.push("--image".to_string());
        args.push(image.clone());
    }

    if let Some(wait) = request.wait {
        args.push("--wait".to_string());
        args.push(format!("{}s", wait.as_secs()));
    }

    args
}

#[async_trait]
impl Provider for KindProvider {
    async fn create_cluster(&self, request: &CreateRequest) -> Result<(), CommandError> {
        info!("Creating kind cluster {}", request.name);
        let args = create_args(request);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.kind(&args, Some(&request.config)).await?;
        Ok(())
    }

    async fn delete_cluster(&self, name: &str, kubeconfig: &Path) -> Result<(), CommandError> {
        info!("Deleting kind cluster {}", name);
        let kubeconfig = path_arg(kubeconfig);
        self.kind(
            &["delete", "cluster", "--name", name, "--kubeconfig", &kubeconfig],
            None,
        )
        .await?;
        Ok(())
    }

    async fn list_clusters(&self) -> Result<Vec<String>, CommandError> {
        // "No kind clusters found." goes to stderr, stdout stays empty
        let stdout = self.kind(&["get", "clusters"], None).await?;
        Ok(output_lines(&stdout))
    }

    async fn export_kubeconfig(
        &self,
        name: &str,
        kubeconfig: &Path,
    ) -> Result<(), CommandError> {
        let kubeconfig = path_arg(kubeconfig);
        self.kind(
            &["export", "kubeconfig", "--name", name, "--kubeconfig", &kubeconfig],
            None,
        )
        .await?;
        Ok(())
    }

    async fn list_nodes(&self, name: &str) -> Result<Vec<String>, CommandError> {
        let stdout = self.kind(&["get", "nodes", "--name", name], None).await?;
        Ok(output_lines(&stdout))
    }

    async fn load_image_archive(
        &self,
        name: &str,
        node: &str,
        archive: &Path,
    ) -> Result<(), CommandError> {
        let archive = path_arg(archive);
        self.kind(
            &["load", "image-archive", &archive, "--name", name, "--nodes", node],
            None,
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    fn request() -> CreateRequest {
        CreateRequest {
            name: "e2e".to_string(),
            config: String::new(),
            node_image: None,
            wait: None,
            kubeconfig: PathBuf::from("/tmp/e2e-kubeconfig"),
        }
    }

    #[test]
    fn test_create_args_minimal() {
        assert_eq!(
            create_args(&request()),
            vec![
                "create",
                "cluster",
                "--name",
                "e2e",
                "--config",
                "-",
                "--kubeconfig",
                "/tmp/e2e-kubeconfig"
            ]
        );
    }

    #[test]
    fn test_create_args_image_and_wait() {
        let mut req = request();
        req.node_image = Some("kindest/node:v1.28.0".to_string());
        req.wait = Some(Duration::from_secs(90));

        let args = create_args(&req);
        assert_eq!(&args[8..], ["--image", "kindest/node:v1.28.0", "--wait", "90s"]);
    }

    #[tokio::test]
    async fn test_missing_binary_is_command_error() {
        let provider = KindProvider::new().with_binary("no-such-kind-binary");
        let err = provider.list_clusters().await.unwrap_err();
        assert!(err.command.starts_with("no-such-kind-binary get clusters"));
    }
}
