use crate::app::backends::Backend;
use crate::domain::model::{Network, ServiceInstance};
use crate::domain::ports::{ContainerHandle, ContainerRuntime, TeardownFn};
use crate::utils::error::{Result, StackError};
use std::collections::HashMap;
use std::sync::Arc;

/// Starts one backend container and resolves its ports.
#[derive(Clone)]
pub struct ServiceLauncher {
    runtime: Arc<dyn ContainerRuntime>,
}

impl ServiceLauncher {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// Launch, wait for readiness, resolve every logical port.
    ///
    /// The returned teardown removes the container. If any step after the
    /// launch fails the container is removed before the error is returned.
    pub async fn start(
        &self,
        backend: &dyn Backend,
        network: &Network,
    ) -> Result<(ServiceInstance, TeardownFn)> {
        let service = backend.kind().to_string();
        let spec = backend.container_spec(network);

        tracing::info!("Starting {} ({}) on network {}", service, spec.image, network.name);
        let container = self
            .runtime
            .start_container(&spec)
            .await
            .map_err(|e| StackError::LaunchError {
                service: service.clone(),
                source: Box::new(e),
            })?;

        let ports = match self.resolve(backend, &container).await {
            Ok(ports) => ports,
            Err(e) => {
                if let Err(cleanup) = self.runtime.remove_container(&container).await {
                    tracing::warn!("Could not remove {} after failed start: {}", container.name, cleanup);
                }
                return Err(e);
            }
        };

        let instance = ServiceInstance {
            kind: backend.kind(),
            name: container.name.clone(),
            host: self.runtime.host().to_string(),
            ports,
            ready: true,
        };
        tracing::info!("{} ready as {} (ports {:?})", service, instance.name, instance.ports);

        let runtime = self.runtime.clone();
        let teardown: TeardownFn = Box::new(move || {
            Box::pin(async move { runtime.remove_container(&container).await })
        });

        Ok((instance, teardown))
    }

    async fn resolve(
        &self,
        backend: &dyn Backend,
        container: &ContainerHandle,
    ) -> Result<HashMap<u16, u16>> {
        let service = backend.kind().to_string();

        self.runtime
            .wait_ready(container, &backend.readiness())
            .await
            .map_err(|e| StackError::ReadinessError {
                service: service.clone(),
                message: e.to_string(),
            })?;

        let mut ports = HashMap::new();
        for &port in backend.ports() {
            let host_port = self
                .runtime
                .mapped_port(container, port)
                .await
                .map_err(|e| StackError::PortResolutionError {
                    service: service.clone(),
                    port,
                    message: e.to_string(),
                })?;
            ports.insert(port, host_port);
        }

        Ok(ports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::backends::{collector, Collector, Seq};
    use crate::test_support::{MockFailure, MockRuntime};

    fn network() -> Network {
        Network::new("net-id", "net")
    }

    #[tokio::test]
    async fn test_start_resolves_every_port() {
        let runtime = Arc::new(MockRuntime::new());
        let launcher = ServiceLauncher::new(runtime.clone());

        let (instance, teardown) = launcher
            .start(&Collector::new(collector::DEFAULT_IMAGE, "jaeger", "seq"), &network())
            .await
            .unwrap();

        assert!(instance.ready);
        assert!(instance.name.starts_with("otelstack-collector"));
        assert_eq!(instance.ports.len(), 3);
        for port in [4317, 4318, 13133] {
            assert!(instance.port(port).is_ok());
        }

        teardown().await.unwrap();
        assert_eq!(runtime.removed_containers(), vec![instance.name.clone()]);
    }

    #[tokio::test]
    async fn test_readiness_failure_removes_container() {
        let runtime = Arc::new(MockRuntime::new());
        runtime.fail_on(MockFailure::Readiness, "seq");
        let launcher = ServiceLauncher::new(runtime.clone());

        let err = launcher
            .start(&Seq::new("datalust/seq:2024.3"), &network())
            .await
            .err()
            .unwrap();

        assert!(matches!(err, StackError::ReadinessError { ref service, .. } if service == "seq"));
        assert!(runtime.running_containers().is_empty());
        assert_eq!(runtime.removed_containers().len(), 1);
    }

    #[tokio::test]
    async fn test_port_failure_is_tagged_with_port() {
        let runtime = Arc::new(MockRuntime::new());
        runtime.fail_on(MockFailure::PortResolution, "seq");
        let launcher = ServiceLauncher::new(runtime.clone());

        let err = launcher
            .start(&Seq::new("datalust/seq:2024.3"), &network())
            .await
            .err()
            .unwrap();

        assert!(matches!(err, StackError::PortResolutionError { port: 80, .. }));
        assert!(runtime.running_containers().is_empty());
    }

    #[tokio::test]
    async fn test_launch_failure_leaves_nothing_to_remove() {
        let runtime = Arc::new(MockRuntime::new());
        runtime.fail_on(MockFailure::Start, "seq");
        let launcher = ServiceLauncher::new(runtime.clone());

        let err = launcher
            .start(&Seq::new("datalust/seq:2024.3"), &network())
            .await
            .err()
            .unwrap();

        assert!(matches!(err, StackError::LaunchError { .. }));
        assert!(runtime.removed_containers().is_empty());
    }
}
