//! Disposable Kubernetes clusters for end-to-end tests
//!
//! Brings up local kind clusters from declarative options, preloads container
//! images, installs an ingress controller, applies manifests through
//! discovery-backed server-side apply and forwards ports into pods.
//!
//! ```no_run
//! use e2e_cluster::e2e::{E2eCluster, E2eClusterConfig};
//!
//! # async fn run() -> e2e_cluster::Result<()> {
//! let cluster = E2eCluster::start(
//!     E2eClusterConfig::new()
//!         .with_ingress(true)
//!         .with_env_override(true),
//! )
//! .await?;
//!
//! let client = cluster.cluster().client().await?;
//! client.dynamic().apply("apiVersion: v1\nkind: Namespace\nmetadata:\n  name: demo\n").await?;
//!
//! cluster.cleanup().await?;
//! # Ok(())
//! # }
//! ```

pub mod cluster;
pub mod config;
pub mod e2e;
pub mod error;
pub mod k8s;
pub mod pool;
pub mod provider;
pub mod utils;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
