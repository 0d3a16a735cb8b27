//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;

use e2e_cluster::config::NodePort;
use e2e_cluster::utils::LogLevel;

/// Disposable kind clusters for end-to-end tests
#[derive(Parser, Debug)]
#[command(name = "e2e-cluster")]
#[command(version)]
#[command(about = "Create, share and tear down kind clusters for e2e tests")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<LogLevel>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a cluster
    Create(CreateArgs),

    /// Delete a cluster
    Delete(DeleteArgs),

    /// Export the kubeconfig of an existing cluster
    Get(GetArgs),

    /// Reuse or create a cluster with hooks, honouring E2E_CLUSTER_* variables
    Up(UpArgs),

    /// Server-side apply a multi-document manifest
    Apply(ApplyArgs),

    /// Forward a local port to a pod
    PortForward(PortForwardArgs),

    /// Show environment variable overrides
    Env,
}

/// Cluster shape shared by create and up
#[derive(Parser, Debug)]
pub struct ClusterArgs {
    /// Cluster name
    #[arg(short, long)]
    pub name: Option<String>,

    /// Options file (YAML or JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Kubernetes version of the node image, e.g. 1.28.0
    #[arg(long)]
    pub kubernetes_version: Option<String>,

    /// Number of worker nodes
    #[arg(short, long)]
    pub workers: Option<u32>,

    /// NodePort mapping, "<nodePort>:<hostPort>" (repeatable)
    #[arg(short = 'p', long = "node-port")]
    pub node_ports: Vec<NodePort>,

    /// Image to preload into every node (repeatable)
    #[arg(short, long = "image")]
    pub images: Vec<String>,

    /// Seconds to wait for the control plane
    #[arg(long)]
    pub wait: Option<u64>,

    /// Keep etcd data on a RAM disk
    #[arg(long)]
    pub etcd_ram_disk: bool,

    /// Where to write the kubeconfig
    #[arg(short, long)]
    pub kubeconfig: Option<PathBuf>,
}

/// Arguments for create command
#[derive(Parser, Debug)]
pub struct CreateArgs {
    #[command(flatten)]
    pub cluster: ClusterArgs,

    /// Print the rendered kind config and exit
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for delete command
#[derive(Parser, Debug)]
pub struct DeleteArgs {
    /// Cluster name
    #[arg(short, long)]
    pub name: Option<String>,

    /// Succeed when the cluster does not exist
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for get command
#[derive(Parser, Debug)]
pub struct GetArgs {
    /// Cluster name
    #[arg(short, long)]
    pub name: Option<String>,

    /// Where to write the kubeconfig
    #[arg(short, long)]
    pub kubeconfig: Option<PathBuf>,
}

/// Arguments for up command
#[derive(Parser, Debug)]
pub struct UpArgs {
    #[command(flatten)]
    pub cluster: ClusterArgs,

    /// Install ingress-nginx
    #[arg(long)]
    pub ingress: bool,

    /// Host port the ingress controller is published on
    #[arg(long)]
    pub ingress_port: Option<u16>,

    /// Reuse an existing cluster of the same name
    #[arg(long)]
    pub reuse: bool,

    /// Manifest applied after creation (repeatable)
    #[arg(short = 'f', long = "manifest")]
    pub manifests: Vec<PathBuf>,
}

/// Arguments for apply command
#[derive(Parser, Debug)]
pub struct ApplyArgs {
    /// Manifest file
    #[arg(short = 'f', long)]
    pub file: PathBuf,

    /// Kubeconfig to use (inferred when omitted)
    #[arg(short, long)]
    pub kubeconfig: Option<PathBuf>,
}

/// Arguments for port-forward command
#[derive(Parser, Debug)]
pub struct PortForwardArgs {
    /// Pod name
    pub pod: String,

    /// Pod port
    pub port: u16,

    /// Pod namespace
    #[arg(short, long, default_value = "default")]
    pub namespace: String,

    /// Local port (0 picks a free one)
    #[arg(short, long, default_value = "0")]
    pub local_port: u16,

    /// Local address to listen on
    #[arg(long, default_value = "127.0.0.1")]
    pub address: IpAddr,

    /// Kubeconfig to use (inferred when omitted)
    #[arg(short, long)]
    pub kubeconfig: Option<PathBuf>,
}
