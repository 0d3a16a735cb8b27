//! Schema-agnostic resource client
//!
//! Applies arbitrary manifests with server-side apply. Kinds are resolved to
//! REST resources through API discovery and the results cached per client.

use kube::api::{Api, ApiResource, DynamicObject, GroupVersionKind, Patch, PatchParams};
use kube::discovery::{self, Scope};
use kube::Client;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::manifest::{object_gvk, parse_manifest};
use crate::error::{Error, Result};

/// Field manager for every server-side apply
pub const FIELD_MANAGER: &str = "e2e-cluster";

/// Namespace given to namespaced objects that name none
pub const DEFAULT_NAMESPACE: &str = "default";

/// Concrete REST resource for a kind
#[derive(Clone, Debug)]
pub struct RestMapping {
    pub resource: ApiResource,
    pub namespaced: bool,
}

type MappingKey = (String, String);

fn api_version(gvk: &GroupVersionKind) -> String {
    if gvk.group.is_empty() {
        gvk.version.clone()
    } else {
        format!("{}/{}", gvk.group, gvk.version)
    }
}

/// Dynamic client with a shared REST-mapping cache
#[derive(Clone)]
pub struct DynamicClient {
    client: Client,
    mappings: Arc<RwLock<HashMap<MappingKey, RestMapping>>>,
}

impl DynamicClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            mappings: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Apply every document of a multi-document manifest, in order
    ///
    /// Returns the objects as stored by the API server.
    pub async fn apply(&self, yaml: &str) -> Result<Vec<DynamicObject>> {
        let objects = parse_manifest(yaml)?;
        let mut applied = Vec::with_capacity(objects.len());

        for (index, object) in objects.into_iter().enumerate() {
            applied.push(self.apply_object(object, index).await?);
        }

        Ok(applied)
    }

    /// Server-side apply one decoded object
    pub async fn apply_object(
        &self,
        mut object: DynamicObject,
        index: usize,
    ) -> Result<DynamicObject> {
        let gvk = object_gvk(&object, index)?;
        let mapping = self.rest_mapping(&gvk).await?;
        let name = object.metadata.name.clone().unwrap_or_default();

        let api: Api<DynamicObject> = if mapping.namespaced {
            let namespace = object
                .metadata
                .namespace
                .get_or_insert_with(|| DEFAULT_NAMESPACE.to_string())
                .clone();
            Api::namespaced_with(self.client.clone(), &namespace, &mapping.resource)
        } else {
            Api::all_with(self.client.clone(), &mapping.resource)
        };

        let params = PatchParams::apply(FIELD_MANAGER).force();
        let applied = api
            .patch(&name, &params, &Patch::Apply(&object))
            .await
            .map_err(|e| Error::Apply {
                kind: gvk.kind.clone(),
                name: name.clone(),
                source: e,
            })?;

        info!(
            kind = %gvk.kind,
            name = %name,
            namespace = ?object.metadata.namespace,
            "Applied object"
        );
        Ok(applied)
    }

    /// Resolve a kind, from cache or discovery
    pub async fn rest_mapping(&self, gvk: &GroupVersionKind) -> Result<RestMapping> {
        let key = (api_version(gvk), gvk.kind.clone());

        if let Some(mapping) = self.mappings.read().await.get(&key) {
            return Ok(mapping.clone());
        }

        debug!("Discovering REST mapping for {}/{}", key.0, key.1);
        let (resource, capabilities) = discovery::pinned_kind(&self.client, gvk)
            .await
            .map_err(|e| Error::UnknownKind {
                api_version: key.0.clone(),
                kind: key.1.clone(),
                reason: e.to_string(),
            })?;

        let mapping = RestMapping {
            resource,
            namespaced: matches!(capabilities.scope, Scope::Namespaced),
        };

        // concurrent misses resolve to the same mapping, last insert wins
        self.mappings.write().await.insert(key, mapping.clone());
        Ok(mapping)
    }

    /// Seed the cache for a kind known ahead of time
    pub async fn register_mapping(&self, gvk: &GroupVersionKind, mapping: RestMapping) {
        self.mappings
            .write()
            .await
            .insert((api_version(gvk), gvk.kind.clone()), mapping);
    }

    /// Forget cached mappings so later kinds (new CRDs) are rediscovered
    pub async fn reset_mappings(&self) {
        self.mappings.write().await.clear();
    }

    pub async fn cached_mappings(&self) -> usize {
        self.mappings.read().await.len()
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}
