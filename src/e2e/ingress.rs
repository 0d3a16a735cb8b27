//! ingress-nginx installation

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use std::time::Duration;
use tracing::info;

use super::hook::PostInstallHook;
use crate::cluster::Cluster;
use crate::error::{Error, Result};

/// Manifests applied in order
pub const INGRESS_MANIFEST_URLS: &[&str] = &[
    "https://raw.githubusercontent.com/kubernetes/ingress-nginx/controller-v1.9.4/deploy/static/provider/baremetal/deploy.yaml",
];

/// NodePort the controller's HTTP listener is pinned to
pub const INGRESS_NODE_PORT: u16 = 30080;

/// Pins the controller service to [`INGRESS_NODE_PORT`]
const CONTROLLER_SERVICE: &str = r#"apiVersion: v1
kind: Service
metadata:
  name: ingress-nginx-controller
  namespace: ingress-nginx
spec:
  type: NodePort
  selector:
    app.kubernetes.io/component: controller
    app.kubernetes.io/instance: ingress-nginx
    app.kubernetes.io/name: ingress-nginx
  ports:
  - name: http
    port: 80
    protocol: TCP
    targetPort: http
    nodePort: 30080
"#;

/// Installs ingress-nginx reachable through a NodePort
pub struct IngressNginx {
    urls: Vec<String>,
    http: HttpClient,
}

impl IngressNginx {
    pub fn new() -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(Error::HttpClient)?;

        Ok(Self {
            urls: INGRESS_MANIFEST_URLS.iter().map(|u| u.to_string()).collect(),
            http,
        })
    }

    /// Fetch manifests from other locations, e.g. a mirror
    pub fn with_urls(mut self, urls: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.urls = urls.into_iter().map(Into::into).collect();
        self
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let fetch_err = |e| Error::Fetch {
            url: url.to_string(),
            source: e,
        };

        self.http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(fetch_err)?
            .text()
            .await
            .map_err(fetch_err)
    }
}

#[async_trait]
impl PostInstallHook for IngressNginx {
    fn name(&self) -> &str {
        "ingress-nginx"
    }

    async fn run(&self, cluster: &Cluster) -> Result<()> {
        let dynamic = cluster.client().await?.dynamic();

        for url in &self.urls {
            info!("Applying ingress manifest {}", url);
            let manifest = self.fetch(url).await?;
            dynamic.apply(&manifest).await?;
        }

        dynamic.apply(CONTROLLER_SERVICE).await?;
        info!("ingress-nginx installed on node port {}", INGRESS_NODE_PORT);
        Ok(())
    }
}
