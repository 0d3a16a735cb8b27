//! Kubernetes API access
//!
//! Client construction, generic manifest apply and pod port-forwarding.

mod client;
mod dynamic;
mod manifest;
mod portforward;

pub use client::K8sClient;
pub use dynamic::{DynamicClient, RestMapping, DEFAULT_NAMESPACE, FIELD_MANAGER};
pub use manifest::{decode_document, object_gvk, parse_manifest, split_documents};
pub use portforward::{forward_pod_port, PortForward, PortForwardOptions};
