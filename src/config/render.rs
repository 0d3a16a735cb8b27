//! kind config document rendering

use std::fmt::Write;

use super::ClusterConfig;

const HEADER: &str = "kind: Cluster\napiVersion: kind.x-k8s.io/v1alpha4\nnodes:\n- role: control-plane\n";

/// Relocates etcd onto the node's tmpfs
const ETCD_RAM_DISK_PATCH: &str = "kubeadmConfigPatches:
- |
  kind: ClusterConfiguration
  etcd:
    local:
      dataDir: /tmp/etcd
";

impl ClusterConfig {
    /// Render the kind config document
    ///
    /// A raw config is returned verbatim. Otherwise the document is the
    /// control-plane node, its port mappings, the worker nodes and finally
    /// the etcd patch, always in that order.
    pub fn render(&self) -> String {
        let options = self.options();
        if let Some(raw) = &options.raw_config {
            return raw.clone();
        }

        let mut doc = String::from(HEADER);

        if !options.node_ports.is_empty() {
            doc.push_str("  extraPortMappings:\n");
            for port in &options.node_ports {
                // writing to a String cannot fail
                let _ = write!(
                    doc,
                    "  - containerPort: {}\n    hostPort: {}\n    listenAddress: \"0.0.0.0\"\n    protocol: tcp\n",
                    port.node_port, port.host_port
                );
            }
        }

        for _ in 0..options.workers {
            doc.push_str("- role: worker\n");
        }

        if options.etcd_ram_disk {
            doc.push_str(ETCD_RAM_DISK_PATCH);
        }

        doc
    }
}
