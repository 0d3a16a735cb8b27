//! Pod port-forwarding
//!
//! Bridges a local TCP port to one pod port over upgraded connections to
//! the API server's `portforward` subresource.

use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, Portforwarder};
use kube::Client;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Local side of a port-forward
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortForwardOptions {
    pub address: IpAddr,
    /// 0 lets the OS pick a port
    pub local_port: u16,
}

impl Default for PortForwardOptions {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            local_port: 0,
        }
    }
}

impl PortForwardOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn local_port(mut self, port: u16) -> Self {
        self.local_port = port;
        self
    }

    pub fn address(mut self, address: IpAddr) -> Self {
        self.address = address;
        self
    }
}

/// A running tunnel
#[derive(Debug)]
pub struct PortForward {
    local_port: u16,
    namespace: String,
    pod: String,
    remote_port: u16,
    task: JoinHandle<Result<()>>,
}

impl PortForward {
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn pod(&self) -> &str {
        &self.pod
    }

    pub fn remote_port(&self) -> u16 {
        self.remote_port
    }

    /// Wait for the tunnel to stop, after cancellation or failure
    pub async fn join(self) -> Result<()> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(Error::PortForward {
                pod: self.pod,
                port: self.remote_port,
                reason: format!("tunnel task aborted: {e}"),
            }),
        }
    }
}

/// Forward a local port to `remote_port` of a pod
///
/// Returns once the local listener is bound and the first upgraded
/// connection is established; the tunnel then runs in the background until
/// `cancel` fires. Cancellation before that point returns
/// [`Error::Cancelled`].
pub async fn forward_pod_port(
    client: Client,
    cancel: CancellationToken,
    namespace: &str,
    pod: &str,
    remote_port: u16,
    options: PortForwardOptions,
) -> Result<PortForward> {
    let pods: Api<Pod> = Api::namespaced(client, namespace);
    let failed = |reason: String| Error::PortForward {
        pod: format!("{namespace}/{pod}"),
        port: remote_port,
        reason,
    };

    let setup = async {
        let listener = TcpListener::bind(SocketAddr::new(options.address, options.local_port))
            .await
            .map_err(|e| failed(format!("bind {}:{}: {e}", options.address, options.local_port)))?;
        let forwarder = pods
            .portforward(pod, &[remote_port])
            .await
            .map_err(|e| failed(e.to_string()))?;
        Ok::<_, Error>((listener, forwarder))
    };

    let (listener, forwarder) = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        ready = setup => ready?,
    };

    let local_port = listener.local_addr()?.port();
    info!(
        "Forwarding {}:{} to {}/{}:{}",
        options.address, local_port, namespace, pod, remote_port
    );

    let tunnel = Tunnel {
        pods,
        pod: pod.to_string(),
        remote_port,
    };
    let task = tokio::spawn(tunnel.serve(listener, Some(forwarder), cancel));

    Ok(PortForward {
        local_port,
        namespace: namespace.to_string(),
        pod: pod.to_string(),
        remote_port,
        task,
    })
}

struct Tunnel {
    pods: Api<Pod>,
    pod: String,
    remote_port: u16,
}

impl Tunnel {
    /// Accept local connections until cancelled
    ///
    /// A forwarder carries one stream per port, so every connection except
    /// the one served by `ready` gets its own upgraded connection.
    async fn serve(
        self,
        listener: TcpListener,
        mut ready: Option<Portforwarder>,
        cancel: CancellationToken,
    ) -> Result<()> {
        loop {
            let (conn, peer) = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => accepted.map_err(|e| Error::PortForward {
                    pod: self.pod.clone(),
                    port: self.remote_port,
                    reason: format!("accept failed: {e}"),
                })?,
            };
            debug!("Accepted port-forward connection from {}", peer);

            let forwarder = match ready.take() {
                Some(forwarder) => forwarder,
                None => match self.pods.portforward(&self.pod, &[self.remote_port]).await {
                    Ok(forwarder) => forwarder,
                    Err(e) => {
                        warn!("Port-forward to {} failed: {}", self.pod, e);
                        continue;
                    }
                },
            };

            tokio::spawn(bridge(conn, forwarder, self.remote_port, cancel.clone()));
        }

        debug!("Port-forward to {}:{} stopped", self.pod, self.remote_port);
        Ok(())
    }
}

/// Copy bytes between a local connection and the pod until either side closes
async fn bridge(
    mut conn: TcpStream,
    mut forwarder: Portforwarder,
    port: u16,
    cancel: CancellationToken,
) {
    let Some(mut upstream) = forwarder.take_stream(port) else {
        warn!("No stream for port {} in forwarder", port);
        return;
    };

    if let Some(remote_error) = forwarder.take_error(port) {
        tokio::spawn(async move {
            if let Some(message) = remote_error.await {
                warn!("Port-forward error from pod: {}", message);
            }
        });
    }

    tokio::select! {
        _ = cancel.cancelled() => {}
        copied = tokio::io::copy_bidirectional(&mut conn, &mut upstream) => match copied {
            Ok((sent, received)) => debug!(sent, received, "Port-forward connection closed"),
            Err(e) => debug!("Port-forward connection error: {}", e),
        },
    }

    drop(upstream);
    if let Err(e) = forwarder.join().await {
        debug!("Port-forward session ended with error: {}", e);
    }
}
