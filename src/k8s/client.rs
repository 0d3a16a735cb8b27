//! Kubernetes client wrapper
//!
//! Builds clients from exported cluster credentials and hands out the
//! dynamic client and port-forward tunnels.

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::dynamic::DynamicClient;
use super::portforward::{forward_pod_port, PortForward, PortForwardOptions};
use crate::error::Result;

/// Kubernetes client wrapper
#[derive(Clone)]
pub struct K8sClient {
    client: Client,
}

impl K8sClient {
    /// Create a client from the ambient configuration
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self { client })
    }

    /// Create a client from an explicit kubeconfig file
    pub async fn from_kubeconfig(path: &Path) -> Result<Self> {
        debug!("Loading kubeconfig {}", path.display());
        let kubeconfig = Kubeconfig::read_from(path)?;
        let config =
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?;
        let client = Client::try_from(config)?;

        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// Get the underlying kube client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Dynamic client sharing this connection; each call starts a fresh
    /// mapping cache
    pub fn dynamic(&self) -> DynamicClient {
        DynamicClient::new(self.client.clone())
    }

    /// Forward a local port to a pod port
    pub async fn forward_pod_port(
        &self,
        cancel: CancellationToken,
        namespace: &str,
        pod: &str,
        remote_port: u16,
        options: PortForwardOptions,
    ) -> Result<PortForward> {
        forward_pod_port(
            self.client.clone(),
            cancel,
            namespace,
            pod,
            remote_port,
            options,
        )
        .await
    }
}
