//! e2e-cluster - disposable kind clusters for end-to-end tests
//!
//! ## Usage
//!
//! ```bash
//! # Create a cluster with two workers and a NodePort mapping
//! e2e-cluster create --name e2e --workers 2 -p 30080:8080
//!
//! # Reuse or create a cluster with ingress-nginx, honouring E2E_CLUSTER_*
//! e2e-cluster up --ingress --reuse
//!
//! # Apply a manifest with server-side apply
//! e2e-cluster apply -f deploy.yaml --kubeconfig /tmp/e2e-kubeconfig
//!
//! # Forward a local port to a pod until Ctrl-C
//! e2e-cluster port-forward web-0 80 --local-port 8080
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

mod cli;

use cli::{Args, ClusterArgs, Command};
use e2e_cluster::cluster::{delete_cluster, Cluster};
use e2e_cluster::config::{default_cluster_name, print_env_help, ClusterConfig, ClusterOptions};
use e2e_cluster::e2e::{E2eCluster, E2eClusterConfig, ManifestHook};
use e2e_cluster::k8s::{K8sClient, PortForwardOptions};
use e2e_cluster::provider::{DockerCli, KindProvider};
use e2e_cluster::utils::{init_logger, LogLevel};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logger(LogLevel::resolve(args.verbose, args.log_level));

    match args.command {
        Command::Create(create_args) => create(create_args).await?,
        Command::Delete(delete_args) => {
            let name = delete_args.name.unwrap_or_else(default_cluster_name);
            delete_cluster(&KindProvider::new(), &name, delete_args.quiet).await?;
        }
        Command::Get(get_args) => get(get_args).await?,
        Command::Up(up_args) => up(up_args).await?,
        Command::Apply(apply_args) => apply(apply_args).await?,
        Command::PortForward(pf_args) => port_forward(pf_args).await?,
        Command::Env => print_env_help(),
    }

    Ok(())
}

/// Options file first, then flags
fn cluster_options(args: &ClusterArgs) -> Result<ClusterOptions> {
    let mut options = match &args.config {
        Some(path) => ClusterOptions::load(path)
            .with_context(|| format!("Failed to load options from {}", path.display()))?,
        None => ClusterOptions::default(),
    };

    if let Some(version) = &args.kubernetes_version {
        options = options.with_kubernetes_version(version);
    }
    if let Some(workers) = args.workers {
        options = options.with_workers(workers);
    }
    if let Some(wait) = args.wait {
        options = options.with_wait(Duration::from_secs(wait));
    }
    if let Some(kubeconfig) = &args.kubeconfig {
        options = options.with_kubeconfig(kubeconfig);
    }
    if args.etcd_ram_disk {
        options = options.with_etcd_ram_disk(true);
    }

    options = options.with_node_ports(args.node_ports.iter().copied());
    for image in &args.images {
        options = options.with_image(image);
    }

    Ok(options)
}

async fn create(args: cli::CreateArgs) -> Result<()> {
    let name = args
        .cluster
        .name
        .clone()
        .unwrap_or_else(default_cluster_name);
    let config = ClusterConfig::new(name, cluster_options(&args.cluster)?)?;

    if args.dry_run {
        print!("{}", config.render());
        return Ok(());
    }

    let cluster = Cluster::create(Box::new(KindProvider::new()), &DockerCli::new(), &config).await?;
    println!("{}", cluster.kubeconfig().display());
    Ok(())
}

async fn get(args: cli::GetArgs) -> Result<()> {
    let name = args.name.unwrap_or_else(default_cluster_name);
    let cluster = Cluster::get(
        Box::new(KindProvider::new()),
        &name,
        args.kubeconfig.as_deref(),
    )
    .await?
    .with_context(|| format!("Cluster {name} not found"))?;

    println!("{}", cluster.kubeconfig().display());
    Ok(())
}

async fn up(args: cli::UpArgs) -> Result<()> {
    let mut config = E2eClusterConfig::new()
        .with_options(cluster_options(&args.cluster)?)
        .with_ingress(args.ingress)
        .with_reuse(args.reuse)
        .with_cleanup(false)
        .with_env_override(true);

    if let Some(name) = &args.cluster.name {
        config = config.with_name(name);
    }
    if let Some(port) = args.ingress_port {
        config = config.with_ingress_port(port);
    }
    for path in &args.manifests {
        let manifest = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        config = config.with_hook(ManifestHook::new(path.display().to_string(), manifest));
    }

    let cluster = E2eCluster::start(config).await?;
    info!("Cluster {} is up", cluster.name());
    println!("{}", cluster.kubeconfig().display());
    if args.ingress {
        println!("{}", cluster.ingress_url());
    }
    Ok(())
}

async fn client(kubeconfig: Option<&Path>) -> Result<K8sClient> {
    let client = match kubeconfig {
        Some(path) => K8sClient::from_kubeconfig(path).await?,
        None => K8sClient::try_default().await?,
    };
    Ok(client)
}

async fn apply(args: cli::ApplyArgs) -> Result<()> {
    let manifest = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let client = client(args.kubeconfig.as_deref()).await?;
    let applied = client.dynamic().apply(&manifest).await?;

    for obj in &applied {
        let kind = obj.types.as_ref().map(|t| t.kind.as_str()).unwrap_or("?");
        println!(
            "{}/{} applied",
            kind.to_lowercase(),
            obj.metadata.name.as_deref().unwrap_or_default()
        );
    }
    Ok(())
}

async fn port_forward(args: cli::PortForwardArgs) -> Result<()> {
    let client = client(args.kubeconfig.as_deref()).await?;
    let cancel = CancellationToken::new();

    let options = PortForwardOptions::new()
        .address(args.address)
        .local_port(args.local_port);
    let forward = client
        .forward_pod_port(cancel.clone(), &args.namespace, &args.pod, args.port, options)
        .await?;

    println!(
        "Forwarding {}:{} -> {}/{}:{}",
        args.address,
        forward.local_port(),
        forward.namespace(),
        forward.pod(),
        forward.remote_port()
    );

    tokio::signal::ctrl_c().await?;
    info!("Stopping port-forward");
    cancel.cancel();
    forward.join().await?;
    Ok(())
}
