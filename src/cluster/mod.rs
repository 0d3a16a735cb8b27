//! Cluster lifecycle
//!
//! Creates, finds and deletes provisioned clusters. A [`Cluster`] owns its
//! provider session and the kubeconfig exported for it.

mod preload;

pub use preload::preload_images;

use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{default_kubeconfig_path, ClusterConfig, NodePort};
use crate::error::{Error, Result};
use crate::k8s::K8sClient;
use crate::provider::{CreateRequest, ImageTool, Provider};

/// A provisioned cluster
pub struct Cluster {
    provider: Box<dyn Provider>,
    name: String,
    kubeconfig: PathBuf,
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster")
            .field("name", &self.name)
            .field("kubeconfig", &self.kubeconfig)
            .finish()
    }
}

impl Cluster {
    /// Create a cluster
    ///
    /// Order: host port check, node image pull, bring-up, kubeconfig export,
    /// image preload. Once the backend has registered the cluster, a later
    /// failure deletes it again before the error is returned.
    pub async fn create(
        provider: Box<dyn Provider>,
        images: &dyn ImageTool,
        config: &ClusterConfig,
    ) -> Result<Self> {
        let options = config.options();
        let start = Instant::now();

        check_host_ports(&options.node_ports)?;

        let node_image = config.node_image();
        if let Some(image) = &node_image {
            info!("Pulling node image {}", image);
            images.pull(image).await.map_err(|e| Error::NodeImage {
                image: image.clone(),
                source: e,
            })?;
        }

        let request = CreateRequest {
            name: config.name().to_string(),
            config: config.render(),
            node_image,
            wait: options.wait(),
            kubeconfig: config.kubeconfig_path(),
        };

        provider
            .create_cluster(&request)
            .await
            .map_err(|e| Error::Backend {
                operation: "create",
                cluster: request.name.clone(),
                source: e,
            })?;

        let cluster = Self {
            provider,
            name: request.name,
            kubeconfig: request.kubeconfig,
        };

        if let Err(e) = cluster.finish_create(images, &options.images).await {
            cluster.rollback(&e).await;
            return Err(e);
        }

        info!(
            "Cluster {} ready in {:.1}s",
            cluster.name,
            start.elapsed().as_secs_f64()
        );
        Ok(cluster)
    }

    async fn finish_create(&self, tool: &dyn ImageTool, images: &[String]) -> Result<()> {
        self.export_kubeconfig().await?;

        if images.is_empty() {
            return Ok(());
        }

        let nodes = self
            .provider
            .list_nodes(&self.name)
            .await
            .map_err(|e| Error::Backend {
                operation: "list nodes of",
                cluster: self.name.clone(),
                source: e,
            })?;

        preload_images(tool, self.provider.as_ref(), &self.name, &nodes, images).await
    }

    async fn export_kubeconfig(&self) -> Result<()> {
        debug!(
            "Exporting kubeconfig of {} to {}",
            self.name,
            self.kubeconfig.display()
        );
        self.provider
            .export_kubeconfig(&self.name, &self.kubeconfig)
            .await
            .map_err(|e| Error::Backend {
                operation: "export kubeconfig of",
                cluster: self.name.clone(),
                source: e,
            })
    }

    /// Best-effort teardown after a failure; never masks `cause`
    pub(crate) async fn rollback(self, cause: &Error) {
        warn!("Deleting cluster {} after failure: {}", self.name, cause);
        let name = self.name.clone();
        if let Err(e) = self.delete().await {
            warn!("Rollback of cluster {} failed: {}", name, e);
        }
    }

    /// Look up a cluster by name
    ///
    /// `Ok(None)` when the backend does not know the name. Otherwise the
    /// kubeconfig is exported to `kubeconfig` (or the default path) and a
    /// fresh handle returned.
    pub async fn get(
        provider: Box<dyn Provider>,
        name: &str,
        kubeconfig: Option<&Path>,
    ) -> Result<Option<Self>> {
        if !cluster_exists(provider.as_ref(), name).await? {
            debug!("Cluster {} not found", name);
            return Ok(None);
        }

        let cluster = Self {
            provider,
            name: name.to_string(),
            kubeconfig: kubeconfig
                .map(Path::to_path_buf)
                .unwrap_or_else(|| default_kubeconfig_path(name)),
        };
        cluster.export_kubeconfig().await?;

        Ok(Some(cluster))
    }

    /// Tear the cluster down
    pub async fn delete(self) -> Result<()> {
        self.provider
            .delete_cluster(&self.name, &self.kubeconfig)
            .await
            .map_err(|e| Error::Backend {
                operation: "delete",
                cluster: self.name.clone(),
                source: e,
            })?;

        info!("Cluster {} deleted", self.name);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kubeconfig(&self) -> &Path {
        &self.kubeconfig
    }

    /// Kubernetes client for this cluster's exported credentials
    pub async fn client(&self) -> Result<K8sClient> {
        K8sClient::from_kubeconfig(&self.kubeconfig).await
    }
}

/// Delete a cluster by name alone
///
/// The backend wants a kubeconfig to clean up, so a scratch one is used and
/// removed afterwards. A missing cluster is an error unless `quiet`.
pub async fn delete_cluster(provider: &dyn Provider, name: &str, quiet: bool) -> Result<()> {
    if !cluster_exists(provider, name).await? {
        if quiet {
            debug!("Cluster {} not found, nothing to delete", name);
            return Ok(());
        }
        return Err(Error::ClusterNotFound(name.to_string()));
    }

    let scratch = tempfile::Builder::new()
        .prefix(&format!("{name}-kubeconfig-"))
        .tempfile()?;

    provider
        .delete_cluster(name, scratch.path())
        .await
        .map_err(|e| Error::Backend {
            operation: "delete",
            cluster: name.to_string(),
            source: e,
        })?;

    info!("Cluster {} deleted", name);
    Ok(())
}

async fn cluster_exists(provider: &dyn Provider, name: &str) -> Result<bool> {
    let clusters = provider.list_clusters().await.map_err(|e| Error::Backend {
        operation: "list",
        cluster: name.to_string(),
        source: e,
    })?;
    Ok(clusters.iter().any(|c| c == name))
}

/// Fail fast when a mapped host port is already bound
fn check_host_ports(ports: &[NodePort]) -> Result<()> {
    for port in ports {
        TcpListener::bind(("0.0.0.0", port.host_port)).map_err(|e| Error::PortUnavailable {
            port: port.host_port,
            source: e,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusterOptions;
    use crate::testing::{FakeImages, FakeProvider};
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn config(dir: &tempfile::TempDir, options: ClusterOptions) -> ClusterConfig {
        let options = options.with_kubeconfig(dir.path().join("kubeconfig"));
        ClusterConfig::new("e2e", options).unwrap()
    }

    fn free_port() -> u16 {
        TcpListener::bind(("0.0.0.0", 0))
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    #[tokio::test]
    async fn test_create_stage_order() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FakeProvider::new();
        let images = FakeImages::default();
        let config = config(
            &dir,
            ClusterOptions::new()
                .with_kubernetes_version("1.28.0")
                .with_image("nginx:1.25")
                .with_wait(Duration::from_secs(30)),
        );

        let cluster = Cluster::create(provider.session(), &images, &config)
            .await
            .unwrap();

        assert_eq!(
            images.pulled(),
            vec!["kindest/node:v1.28.0".to_string(), "nginx:1.25".to_string()]
        );
        assert_eq!(
            provider.calls(),
            vec![
                "create e2e",
                "export e2e",
                "nodes e2e",
                "load e2e e2e-control-plane",
                "load e2e e2e-worker"
            ]
        );

        let request = provider.state().created[0].clone();
        assert_eq!(request.node_image.as_deref(), Some("kindest/node:v1.28.0"));
        assert_eq!(request.wait, Some(Duration::from_secs(30)));
        assert_eq!(request.config, config.render());

        assert_eq!(cluster.name(), "e2e");
        assert!(cluster.kubeconfig().exists());
    }

    #[tokio::test]
    async fn test_create_rejects_bound_host_port() {
        let dir = tempfile::tempdir().unwrap();
        let listener = TcpListener::bind(("0.0.0.0", 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        let provider = FakeProvider::new();

        let err = Cluster::create(
            provider.session(),
            &FakeImages::default(),
            &config(
                &dir,
                ClusterOptions::new().with_node_port(NodePort::new(32080, port)),
            ),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::PortUnavailable { port: p, .. } if p == port));
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_with_free_host_port() {
        let dir = tempfile::tempdir().unwrap();
        let port = free_port();
        let provider = FakeProvider::new();

        let cluster = Cluster::create(
            provider.session(),
            &FakeImages::default(),
            &config(
                &dir,
                ClusterOptions::new().with_node_port(NodePort::new(32080, port)),
            ),
        )
        .await;

        assert_ok!(cluster);
        assert!(provider.state().created[0]
            .config
            .contains(&format!("hostPort: {port}")));
    }

    #[tokio::test]
    async fn test_create_node_image_failure_before_bring_up() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FakeProvider::new();
        let images = FakeImages::default().fail_pull("kindest/node:v0.0.1");

        let err = Cluster::create(
            provider.session(),
            &images,
            &config(&dir, ClusterOptions::new().with_kubernetes_version("0.0.1")),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::NodeImage { ref image, .. } if image == "kindest/node:v0.0.1"));
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_backend_failure_is_wrapped() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FakeProvider::new().fail_create();

        let err = Cluster::create(
            provider.session(),
            &FakeImages::default(),
            &config(&dir, ClusterOptions::default()),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Backend { operation: "create", .. }));
        assert_eq!(provider.calls(), vec!["create e2e"]);
    }

    #[tokio::test]
    async fn test_preload_failure_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FakeProvider::new().fail_load("e2e-worker");

        let err = Cluster::create(
            provider.session(),
            &FakeImages::with_local(&["nginx:1.25"]),
            &config(&dir, ClusterOptions::new().with_image("nginx:1.25")),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::ImageLoad { .. }));
        assert_eq!(provider.calls().last().map(String::as_str), Some("delete e2e"));
        assert!(provider.state().clusters.is_empty());
    }

    #[tokio::test]
    async fn test_export_failure_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FakeProvider::new().fail_export();

        let result = Cluster::create(
            provider.session(),
            &FakeImages::default(),
            &config(&dir, ClusterOptions::default()),
        )
        .await;

        assert_err!(result);
        assert_eq!(provider.calls(), vec!["create e2e", "export e2e", "delete e2e"]);
    }

    #[tokio::test]
    async fn test_failed_rollback_keeps_original_error() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FakeProvider::new().fail_export().fail_delete();

        let err = Cluster::create(
            provider.session(),
            &FakeImages::default(),
            &config(&dir, ClusterOptions::default()),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Backend { operation: "export kubeconfig of", .. }));
        assert_eq!(provider.calls().last().map(String::as_str), Some("delete e2e"));
    }

    #[tokio::test]
    async fn test_get_missing_cluster_is_none() {
        let provider = FakeProvider::new().with_cluster("other");

        let found = Cluster::get(provider.session(), "e2e", None).await.unwrap();

        assert!(found.is_none());
        assert_eq!(provider.calls(), vec!["list"]);
    }

    #[tokio::test]
    async fn test_get_existing_cluster_exports_kubeconfig() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("found");
        let provider = FakeProvider::new().with_cluster("e2e");

        let cluster = Cluster::get(provider.session(), "e2e", Some(path.as_path()))
            .await
            .unwrap()
            .expect("cluster should be found");

        assert_eq!(cluster.kubeconfig(), path.as_path());
        assert!(path.exists());

        cluster.delete().await.unwrap();
        assert!(provider.state().clusters.is_empty());
    }

    #[tokio::test]
    async fn test_delete_cluster_missing() {
        let provider = FakeProvider::new();

        let err = delete_cluster(&provider, "missing", false).await.unwrap_err();
        assert!(err.is_not_found());

        assert_ok!(delete_cluster(&provider, "missing", true).await);
        assert!(provider.state().delete_kubeconfigs.is_empty());
    }

    #[tokio::test]
    async fn test_delete_cluster_uses_scratch_kubeconfig() {
        let provider = FakeProvider::new().with_cluster("e2e");

        delete_cluster(&provider, "e2e", false).await.unwrap();

        let (path, existed) = provider.state().delete_kubeconfigs[0].clone();
        assert!(existed);
        assert!(!path.exists());
        assert!(provider.state().clusters.is_empty());
    }
}
