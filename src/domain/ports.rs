use crate::domain::model::Network;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Releases one acquired resource. Runs at most once.
pub type TeardownFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

/// How a launched container signals that it accepts traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessSignal {
    LogLine(String),
    ListeningPort(u16),
}

/// A file placed into the container before it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerFile {
    pub container_path: String,
    pub contents: Vec<u8>,
    pub mode: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Container names start with this prefix.
    pub name_prefix: String,
    pub image: String,
    pub network: String,
    pub exposed_ports: Vec<u16>,
    pub env: Vec<(String, String)>,
    pub files: Vec<ContainerFile>,
}

/// A started container as known to the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn create_network(&self) -> Result<Network>;

    async fn remove_network(&self, network: &Network) -> Result<()>;

    /// Create and start a container attached to `spec.network`.
    async fn start_container(&self, spec: &ContainerSpec) -> Result<ContainerHandle>;

    async fn wait_ready(&self, container: &ContainerHandle, signal: &ReadinessSignal) -> Result<()>;

    async fn mapped_port(&self, container: &ContainerHandle, port: u16) -> Result<u16>;

    async fn remove_container(&self, container: &ContainerHandle) -> Result<()>;

    /// Host on which mapped ports are reachable.
    fn host(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Issue one GET. Only transport failures are errors; any status is returned.
    async fn get(&self, endpoint: &str) -> Result<HttpResponse>;
}
