//! In-memory backends for unit tests

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::provider::{CommandError, CreateRequest, ImageTool, Provider, ProviderFactory};

/// Request side of the in-process API server behind [`mock_client`]
pub type ApiServerHandle =
    tower_test::mock::Handle<http::Request<hyper::Body>, http::Response<hyper::Body>>;

/// kube client whose requests are answered through the returned handle
pub fn mock_client() -> (kube::Client, ApiServerHandle) {
    let (service, handle) =
        tower_test::mock::pair::<http::Request<hyper::Body>, http::Response<hyper::Body>>();
    (kube::Client::new(service, "default"), handle)
}

fn fail(what: &str) -> CommandError {
    CommandError::new("fake", &[what], format!("{what} failed"))
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub clusters: Vec<String>,
    /// Every backend call in order, e.g. "create e2e"
    pub calls: Vec<String>,
    pub created: Vec<CreateRequest>,
    pub loads: Vec<(String, PathBuf)>,
    /// Whether the kubeconfig handed to each delete existed at the time
    pub delete_kubeconfigs: Vec<(PathBuf, bool)>,
    pub fail_create: bool,
    pub fail_export: bool,
    pub fail_delete: bool,
    pub fail_load: Option<String>,
}

/// Provider whose sessions share one in-memory backend
#[derive(Clone, Debug, Default)]
pub struct FakeProvider {
    state: Arc<Mutex<FakeState>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cluster(self, name: &str) -> Self {
        self.state().clusters.push(name.to_string());
        self
    }

    pub fn fail_create(self) -> Self {
        self.state().fail_create = true;
        self
    }

    pub fn fail_export(self) -> Self {
        self.state().fail_export = true;
        self
    }

    pub fn fail_delete(self) -> Self {
        self.state().fail_delete = true;
        self
    }

    pub fn fail_load(self, node: &str) -> Self {
        self.state().fail_load = Some(node.to_string());
        self
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn session(&self) -> Box<dyn Provider> {
        Box::new(self.clone())
    }

    pub fn factory(&self) -> ProviderFactory {
        let shared = self.clone();
        Arc::new(move || Box::new(shared.clone()) as Box<dyn Provider>)
    }
}

#[async_trait]
impl Provider for FakeProvider {
    async fn create_cluster(&self, request: &CreateRequest) -> Result<(), CommandError> {
        let mut state = self.state();
        state.calls.push(format!("create {}", request.name));
        state.created.push(request.clone());
        if state.fail_create {
            return Err(fail("create"));
        }
        state.clusters.push(request.name.clone());
        Ok(())
    }

    async fn delete_cluster(&self, name: &str, kubeconfig: &Path) -> Result<(), CommandError> {
        let mut state = self.state();
        state.calls.push(format!("delete {name}"));
        state
            .delete_kubeconfigs
            .push((kubeconfig.to_path_buf(), kubeconfig.exists()));
        if state.fail_delete {
            return Err(fail("delete"));
        }
        state.clusters.retain(|c| c != name);
        Ok(())
    }

    async fn list_clusters(&self) -> Result<Vec<String>, CommandError> {
        let mut state = self.state();
        state.calls.push("list".to_string());
        Ok(state.clusters.clone())
    }

    async fn export_kubeconfig(
        &self,
        name: &str,
        kubeconfig: &Path,
    ) -> Result<(), CommandError> {
        let mut state = self.state();
        state.calls.push(format!("export {name}"));
        if state.fail_export {
            return Err(fail("export"));
        }
        std::fs::write(kubeconfig, format!("current-context: kind-{name}\n"))
            .map_err(|e| CommandError::new("fake", &["export"], e.to_string()))
    }

    async fn list_nodes(&self, name: &str) -> Result<Vec<String>, CommandError> {
        let mut state = self.state();
        state.calls.push(format!("nodes {name}"));
        Ok(vec![format!("{name}-control-plane"), format!("{name}-worker")])
    }

    async fn load_image_archive(
        &self,
        name: &str,
        node: &str,
        archive: &Path,
    ) -> Result<(), CommandError> {
        let mut state = self.state();
        state.calls.push(format!("load {name} {node}"));
        state.loads.push((node.to_string(), archive.to_path_buf()));
        if state.fail_load.as_deref() == Some(node) {
            return Err(fail("load"));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ImageState {
    local: HashSet<String>,
    pulled: Vec<String>,
    saves: usize,
}

/// Image tool backed by an in-memory image store
#[derive(Debug, Default)]
pub struct FakeImages {
    state: Mutex<ImageState>,
    fail_pull: Option<String>,
    fail_save: bool,
}

impl FakeImages {
    pub fn with_local(images: &[&str]) -> Self {
        let tool = Self::default();
        tool.lock()
            .local
            .extend(images.iter().map(|i| i.to_string()));
        tool
    }

    pub fn fail_pull(mut self, image: &str) -> Self {
        self.fail_pull = Some(image.to_string());
        self
    }

    pub fn fail_save(mut self) -> Self {
        self.fail_save = true;
        self
    }

    fn lock(&self) -> MutexGuard<'_, ImageState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn pulled(&self) -> Vec<String> {
        self.lock().pulled.clone()
    }

    pub fn saves(&self) -> usize {
        self.lock().saves
    }
}

#[async_trait]
impl ImageTool for FakeImages {
    async fn image_exists(&self, image: &str) -> Result<bool, CommandError> {
        Ok(self.lock().local.contains(image))
    }

    async fn pull(&self, image: &str) -> Result<(), CommandError> {
        if self.fail_pull.as_deref() == Some(image) {
            return Err(fail("pull"));
        }
        let mut state = self.lock();
        state.pulled.push(image.to_string());
        state.local.insert(image.to_string());
        Ok(())
    }

    async fn save(&self, images: &[String], archive: &Path) -> Result<(), CommandError> {
        if self.fail_save {
            return Err(fail("save"));
        }
        self.lock().saves += 1;
        std::fs::write(archive, images.join("\n"))
            .map_err(|e| CommandError::new("fake", &["save"], e.to_string()))
    }
}
