//! Container definitions for the four backends of a stack.

pub mod collector;
pub mod jaeger;
pub mod prometheus;
pub mod seq;

pub use collector::Collector;
pub use jaeger::Jaeger;
pub use prometheus::Prometheus;
pub use seq::Seq;

use crate::domain::model::{Network, ServiceKind};
use crate::domain::ports::{ContainerFile, ContainerSpec, ReadinessSignal};

/// Static description of one backend container.
pub trait Backend: Send + Sync {
    fn kind(&self) -> ServiceKind;

    fn image(&self) -> &str;

    /// Container ports mapped to ephemeral host ports.
    fn ports(&self) -> &'static [u16];

    fn readiness(&self) -> ReadinessSignal;

    fn env(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Rendered configuration files copied in before start.
    fn files(&self) -> Vec<ContainerFile> {
        Vec::new()
    }

    fn container_spec(&self, network: &Network) -> ContainerSpec {
        ContainerSpec {
            name_prefix: format!("otelstack-{}", self.kind()),
            image: self.image().to_string(),
            network: network.name.clone(),
            exposed_ports: self.ports().to_vec(),
            env: self.env(),
            files: self.files(),
        }
    }
}
