//! E2E cluster facade
//!
//! Reuse-or-recreate policy on top of [`Cluster`], post-install hooks and
//! environment overrides, for test binaries that want one cluster per run.

mod hook;
mod ingress;

pub use hook::{ManifestHook, PostInstallHook};
pub use ingress::{IngressNginx, INGRESS_MANIFEST_URLS, INGRESS_NODE_PORT};

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::cluster::Cluster;
use crate::config::{default_cluster_name, ClusterConfig, ClusterOptions, EnvConfig, NodePort};
use crate::error::{Error, Result};
use crate::provider::{kind_provider_factory, DockerCli, ImageTool, ProviderFactory};

/// Default host port the ingress controller is published on
pub fn default_ingress_port() -> u16 {
    8080
}

/// Settings for [`E2eCluster::start`]
pub struct E2eClusterConfig {
    pub name: String,
    pub options: ClusterOptions,
    pub ingress: bool,
    pub ingress_address: String,
    pub ingress_port: u16,
    pub hooks: Vec<Arc<dyn PostInstallHook>>,
    pub reuse: bool,
    pub cleanup: bool,
    pub env_override: bool,
    pub provider: ProviderFactory,
    pub images: Arc<dyn ImageTool>,
}

impl Default for E2eClusterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for E2eClusterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hooks: Vec<&str> = self.hooks.iter().map(|h| h.name()).collect();
        f.debug_struct("E2eClusterConfig")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("ingress", &self.ingress)
            .field("ingress_address", &self.ingress_address)
            .field("ingress_port", &self.ingress_port)
            .field("hooks", &hooks)
            .field("reuse", &self.reuse)
            .field("cleanup", &self.cleanup)
            .field("env_override", &self.env_override)
            .finish()
    }
}

impl E2eClusterConfig {
    pub fn new() -> Self {
        Self {
            name: default_cluster_name(),
            options: ClusterOptions::default(),
            ingress: false,
            ingress_address: "localhost".to_string(),
            ingress_port: default_ingress_port(),
            hooks: Vec::new(),
            reuse: false,
            cleanup: true,
            env_override: false,
            provider: kind_provider_factory(),
            images: Arc::new(DockerCli::new()),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_options(mut self, options: ClusterOptions) -> Self {
        self.options = options;
        self
    }

    /// Install ingress-nginx, published on `ingress_port`
    pub fn with_ingress(mut self, enabled: bool) -> Self {
        self.ingress = enabled;
        self
    }

    pub fn with_ingress_address(mut self, address: impl Into<String>) -> Self {
        self.ingress_address = address.into();
        self
    }

    pub fn with_ingress_port(mut self, port: u16) -> Self {
        self.ingress_port = port;
        self
    }

    /// Hooks run in registration order
    pub fn with_hook(mut self, hook: impl PostInstallHook + 'static) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn with_reuse(mut self, reuse: bool) -> Self {
        self.reuse = reuse;
        self
    }

    pub fn with_cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = cleanup;
        self
    }

    /// Let `E2E_CLUSTER_*` variables override the settings above
    pub fn with_env_override(mut self, enabled: bool) -> Self {
        self.env_override = enabled;
        self
    }

    pub fn with_provider(mut self, provider: ProviderFactory) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_images(mut self, images: Arc<dyn ImageTool>) -> Self {
        self.images = images;
        self
    }

    /// Apply environment overrides
    pub fn merge_env(&mut self, env: &EnvConfig) {
        if let Some(cleanup) = env.cleanup {
            self.cleanup = cleanup;
        }
        if let Some(reuse) = env.reuse {
            self.reuse = reuse;
        }
        if let Some(name) = &env.name {
            self.name = name.clone();
        }
        if let Some(port) = env.ingress_port {
            self.ingress_port = port;
        }
    }

    /// Final cluster options and hook list, after env overrides
    fn resolve(mut self) -> Result<Self> {
        if self.env_override {
            let env = EnvConfig::load();
            if env.has_any() {
                debug!("Applying environment overrides: {:?}", env);
            }
            self.merge_env(&env);
        }

        if self.ingress {
            self.options
                .node_ports
                .push(NodePort::new(INGRESS_NODE_PORT, self.ingress_port));
            self.hooks.insert(0, Arc::new(IngressNginx::new()?));
        }

        Ok(self)
    }
}

/// A cluster owned (or borrowed, when reused) by a test run
pub struct E2eCluster {
    cluster: Cluster,
    auto_cleanup: bool,
    ingress_address: String,
    ingress_port: u16,
}

impl fmt::Debug for E2eCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("E2eCluster")
            .field("cluster", &self.cluster)
            .field("auto_cleanup", &self.auto_cleanup)
            .finish()
    }
}

impl E2eCluster {
    /// Reuse, recreate or create the configured cluster
    ///
    /// A reused cluster is never deleted by [`E2eCluster::cleanup`]. A freshly
    /// created one is deleted again if any hook fails.
    pub async fn start(config: E2eClusterConfig) -> Result<Self> {
        let config = config.resolve()?;
        let cluster_config = ClusterConfig::new(config.name.clone(), config.options.clone())?;
        let kubeconfig = cluster_config.kubeconfig_path();

        let existing = Cluster::get(
            (config.provider)(),
            cluster_config.name(),
            Some(kubeconfig.as_path()),
        )
        .await?;

        if let Some(cluster) = existing {
            if config.reuse {
                info!("Reusing cluster {}", cluster.name());
                return Ok(Self {
                    cluster,
                    auto_cleanup: false,
                    ingress_address: config.ingress_address,
                    ingress_port: config.ingress_port,
                });
            }

            info!("Recreating cluster {}", cluster.name());
            cluster.delete().await?;
        }

        let cluster =
            Cluster::create((config.provider)(), config.images.as_ref(), &cluster_config).await?;

        for hook in &config.hooks {
            info!("Running hook {} on {}", hook.name(), cluster.name());
            if let Err(e) = hook.run(&cluster).await {
                let err = Error::Hook {
                    hook: hook.name().to_string(),
                    source: Box::new(e),
                };
                cluster.rollback(&err).await;
                return Err(err);
            }
        }

        if let Some(wait) = config.options.wait() {
            settle(wait).await;
        }

        Ok(Self {
            cluster,
            auto_cleanup: config.cleanup,
            ingress_address: config.ingress_address,
            ingress_port: config.ingress_port,
        })
    }

    /// Delete the cluster if this handle owns it
    pub async fn cleanup(self) -> Result<()> {
        if !self.auto_cleanup {
            info!("Keeping cluster {}", self.cluster.name());
            return Ok(());
        }
        self.cluster.delete().await
    }

    /// Delete the cluster regardless of ownership
    pub async fn delete(self) -> Result<()> {
        self.cluster.delete().await
    }

    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    pub fn name(&self) -> &str {
        self.cluster.name()
    }

    pub fn kubeconfig(&self) -> &Path {
        self.cluster.kubeconfig()
    }

    pub fn auto_cleanup(&self) -> bool {
        self.auto_cleanup
    }

    /// Base URL of the ingress controller as seen from the host
    pub fn ingress_url(&self) -> String {
        format!("http://{}:{}", self.ingress_address, self.ingress_port)
    }
}

async fn settle(wait: Duration) {
    debug!("Settling for {:.1}s", wait.as_secs_f64());
    tokio::time::sleep(wait).await;
}
