//! Post-install hooks

use async_trait::async_trait;
use tracing::info;

use crate::cluster::Cluster;
use crate::error::Result;

/// Work run against a freshly created cluster, before it is handed out
#[async_trait]
pub trait PostInstallHook: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, cluster: &Cluster) -> Result<()>;
}

/// Applies a fixed manifest, e.g. shared test fixtures
pub struct ManifestHook {
    name: String,
    manifest: String,
}

impl ManifestHook {
    pub fn new(name: impl Into<String>, manifest: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            manifest: manifest.into(),
        }
    }
}

#[async_trait]
impl PostInstallHook for ManifestHook {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, cluster: &Cluster) -> Result<()> {
        let applied = cluster.client().await?.dynamic().apply(&self.manifest).await?;
        info!("Hook {} applied {} object(s)", self.name, applied.len());
        Ok(())
    }
}
