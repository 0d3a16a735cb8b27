//! `docker` CLI image tooling

use async_trait::async_trait;
use std::path::Path;
use tracing::info;

use super::{run_command, CommandError, ImageTool};

/// Image tool driving the `docker` binary
#[derive(Debug)]
pub struct DockerCli {
    binary: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self {
            binary: "docker".to_string(),
        }
    }
}

impl DockerCli {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }
}

#[async_trait]
impl ImageTool for DockerCli {
    async fn image_exists(&self, image: &str) -> Result<bool, CommandError> {
        let stdout = run_command(&self.binary, &["images", "-q", image], None).await?;
        Ok(!stdout.trim().is_empty())
    }

    async fn pull(&self, image: &str) -> Result<(), CommandError> {
        info!("Pulling image {}", image);
        run_command(&self.binary, &["pull", image], None).await?;
        Ok(())
    }

    async fn save(&self, images: &[String], archive: &Path) -> Result<(), CommandError> {
        let archive = archive.to_string_lossy().into_owned();
        let mut args = vec!["save", "-o", archive.as_str()];
        args.extend(images.iter().map(String::as_str));
        run_command(&self.binary, &args, None).await?;
        Ok(())
    }
}
