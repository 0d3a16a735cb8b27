//! Error types
//!
//! One error enum for the whole library. Every failure path names the
//! offending cluster, image, node, document or kind.

use thiserror::Error;

use crate::provider::CommandError;

/// Result alias used throughout the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Library errors
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid cluster config: {0}")]
    InvalidConfig(String),

    #[error("Host port {port} is unavailable: {source}")]
    PortUnavailable {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to pull node image {image}: {source}")]
    NodeImage {
        image: String,
        #[source]
        source: CommandError,
    },

    #[error("Failed to pull image {image}: {source}")]
    ImagePull {
        image: String,
        #[source]
        source: CommandError,
    },

    #[error("Failed to save images to archive: {source}")]
    ImageSave {
        #[source]
        source: CommandError,
    },

    #[error("Failed to load image archive into node {node}: {source}")]
    ImageLoad {
        node: String,
        #[source]
        source: CommandError,
    },

    #[error("Failed to {operation} cluster {cluster}: {source}")]
    Backend {
        operation: &'static str,
        cluster: String,
        #[source]
        source: CommandError,
    },

    #[error("Cluster {0} not found")]
    ClusterNotFound(String),

    #[error("Empty manifest")]
    EmptyManifest,

    #[error("Failed to decode manifest document {index}: {reason}")]
    Decode { index: usize, reason: String },

    #[error("No REST mapping for {api_version}/{kind}: {reason}")]
    UnknownKind {
        api_version: String,
        kind: String,
        reason: String,
    },

    #[error("Failed to apply {kind} {name}: {source}")]
    Apply {
        kind: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("Post-install hook {hook} failed: {source}")]
    Hook {
        hook: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("Failed to fetch manifest from {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Port-forward to {pod}:{port} failed: {reason}")]
    PortForward {
        pod: String,
        port: u16,
        reason: String,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Kubernetes client error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Kubeconfig error: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this is a lookup miss rather than a real failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::ClusterNotFound(_))
    }
}
