//! Cluster configuration
//!
//! Options describing a disposable cluster, their validation, rendering to a
//! kind config document and environment-variable overrides.

mod env;
mod render;

pub use env::{print_env_help, EnvBuilder, EnvConfig, EnvGuard};

#[cfg(test)]
pub(crate) use env::ENV_LOCK;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Cluster name used when none is configured
pub fn default_cluster_name() -> String {
    "e2e-cluster".to_string()
}

/// Kubeconfig location used when the caller does not choose one
pub fn default_kubeconfig_path(cluster: &str) -> PathBuf {
    std::env::temp_dir().join(format!("{cluster}-kubeconfig"))
}

/// Node image published for a Kubernetes version
pub fn node_image(version: &str) -> String {
    let version = version.trim();
    if version.starts_with('v') {
        format!("kindest/node:{version}")
    } else {
        format!("kindest/node:v{version}")
    }
}

/// A NodePort baked into the cluster topology, reachable on a host port
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePort {
    pub node_port: u16,
    pub host_port: u16,
}

impl NodePort {
    pub fn new(node_port: u16, host_port: u16) -> Self {
        Self {
            node_port,
            host_port,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.node_port != 0 && self.host_port != 0
    }
}

impl fmt::Display for NodePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node_port, self.host_port)
    }
}

impl FromStr for NodePort {
    type Err = String;

    /// `"32080:8080"`, or `"32080"` for identical ports
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parse = |p: &str| {
            p.trim()
                .parse::<u16>()
                .map_err(|e| format!("invalid port '{p}': {e}"))
        };

        match s.split_once(':') {
            Some((node, host)) => Ok(Self::new(parse(node)?, parse(host)?)),
            None => {
                let port = parse(s)?;
                Ok(Self::new(port, port))
            }
        }
    }
}

/// Cluster options
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClusterOptions {
    /// Verbatim kind config; overrides every other option
    pub raw_config: Option<String>,

    /// Images preloaded into every node
    pub images: Vec<String>,

    /// Ready wait for creation, also the settle period of the e2e facade
    pub wait_secs: Option<u64>,

    pub node_ports: Vec<NodePort>,

    pub workers: u32,

    /// Kubernetes version, e.g. "1.28.0"
    pub kubernetes_version: Option<String>,

    pub kubeconfig: Option<PathBuf>,

    /// Keep etcd data on a memory-backed path
    pub etcd_ram_disk: bool,
}

impl ClusterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_raw_config(mut self, config: impl Into<String>) -> Self {
        self.raw_config = Some(config.into());
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.images.push(image.into());
        self
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait_secs = Some(wait.as_secs());
        self
    }

    pub fn with_node_port(mut self, port: NodePort) -> Self {
        self.node_ports.push(port);
        self
    }

    pub fn with_node_ports(mut self, ports: impl IntoIterator<Item = NodePort>) -> Self {
        self.node_ports.extend(ports);
        self
    }

    pub fn with_workers(mut self, workers: u32) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_kubernetes_version(mut self, version: impl Into<String>) -> Self {
        self.kubernetes_version = Some(version.into());
        self
    }

    pub fn with_kubeconfig(mut self, path: impl Into<PathBuf>) -> Self {
        self.kubeconfig = Some(path.into());
        self
    }

    pub fn with_etcd_ram_disk(mut self, enabled: bool) -> Self {
        self.etcd_ram_disk = enabled;
        self
    }

    pub fn wait(&self) -> Option<Duration> {
        self.wait_secs.map(Duration::from_secs)
    }

    /// Load options from a YAML or JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;

        let options = if is_yaml(path.as_ref()) {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };

        Ok(options)
    }

    /// Save options to a YAML or JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = if is_yaml(path.as_ref()) {
            serde_yaml::to_string(self)?
        } else {
            serde_json::to_string_pretty(self)?
        };

        std::fs::write(path, content)?;
        Ok(())
    }
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}

/// Validated cluster name and options
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterConfig {
    name: String,
    options: ClusterOptions,
}

impl ClusterConfig {
    /// Validate a name and its options
    pub fn new(name: impl Into<String>, options: ClusterOptions) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidConfig("cluster name must not be empty".into()));
        }

        if let Some(port) = options.node_ports.iter().find(|p| !p.is_valid()) {
            return Err(Error::InvalidConfig(format!(
                "node port mapping {port} must have non-zero node and host ports"
            )));
        }

        Ok(Self { name, options })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &ClusterOptions {
        &self.options
    }

    /// Kubeconfig path, the configured one or the default temp path
    pub fn kubeconfig_path(&self) -> PathBuf {
        self.options
            .kubeconfig
            .clone()
            .unwrap_or_else(|| default_kubeconfig_path(&self.name))
    }

    pub fn node_image(&self) -> Option<String> {
        self.options
            .kubernetes_version
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .map(node_image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_config_rejects_empty_name() {
        let err = ClusterConfig::new("", ClusterOptions::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_new_config_rejects_zero_ports() {
        for port in [NodePort::new(0, 8080), NodePort::new(32080, 0)] {
            let options = ClusterOptions::new()
                .with_node_port(NodePort::new(32090, 9090))
                .with_node_port(port);
            assert!(ClusterConfig::new("e2e", options).is_err());
        }
    }

    #[test]
    fn test_new_config_accepts_valid() {
        let options = ClusterOptions::new().with_node_port(NodePort::new(32080, 8080));
        let config = ClusterConfig::new("e2e", options).unwrap();
        assert_eq!(config.name(), "e2e");
        assert_eq!(config.options().node_ports.len(), 1);
    }

    #[test]
    fn test_defaults_are_fresh() {
        let mut a = ClusterOptions::default();
        a.images.push("nginx".to_string());
        assert!(ClusterOptions::default().images.is_empty());
        assert_eq!(default_cluster_name(), "e2e-cluster");
    }

    #[test]
    fn test_kubeconfig_path() {
        let config = ClusterConfig::new("e2e", ClusterOptions::default()).unwrap();
        assert_eq!(config.kubeconfig_path(), default_kubeconfig_path("e2e"));

        let config =
            ClusterConfig::new("e2e", ClusterOptions::new().with_kubeconfig("/tmp/kc")).unwrap();
        assert_eq!(config.kubeconfig_path(), PathBuf::from("/tmp/kc"));
    }

    #[test]
    fn test_node_image() {
        assert_eq!(node_image("1.28.0"), "kindest/node:v1.28.0");
        assert_eq!(node_image("v1.27.3"), "kindest/node:v1.27.3");

        let config = ClusterConfig::new(
            "e2e",
            ClusterOptions::new().with_kubernetes_version("1.29.2"),
        )
        .unwrap();
        assert_eq!(config.node_image().as_deref(), Some("kindest/node:v1.29.2"));

        let config = ClusterConfig::new("e2e", ClusterOptions::default()).unwrap();
        assert!(config.node_image().is_none());
    }

    #[test]
    fn test_node_port_parse() {
        assert_eq!("32080:8080".parse::<NodePort>(), Ok(NodePort::new(32080, 8080)));
        assert_eq!("32090".parse::<NodePort>(), Ok(NodePort::new(32090, 32090)));
        assert!("abc:1".parse::<NodePort>().is_err());
        assert_eq!(NodePort::new(32080, 8080).to_string(), "32080:8080");
    }

    #[test]
    fn test_options_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let options = ClusterOptions::new()
            .with_workers(2)
            .with_image("nginx:1.25")
            .with_wait(Duration::from_secs(60))
            .with_node_port(NodePort::new(32080, 8080));

        let yaml = dir.path().join("options.yaml");
        options.save(&yaml).unwrap();
        assert_eq!(ClusterOptions::load(&yaml).unwrap(), options);

        let json = dir.path().join("options.json");
        options.save(&json).unwrap();
        assert_eq!(ClusterOptions::load(&json).unwrap(), options);
    }

    #[test]
    fn test_options_file_camel_case() {
        let options: ClusterOptions =
            serde_yaml::from_str("workers: 1\netcdRamDisk: true\nnodePorts:\n- nodePort: 32080\n  hostPort: 8080\n")
                .unwrap();
        assert_eq!(options.workers, 1);
        assert!(options.etcd_ram_disk);
        assert_eq!(options.node_ports, vec![NodePort::new(32080, 8080)]);
        assert_eq!(options.wait(), None);
    }
}
