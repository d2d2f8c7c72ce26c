//! Sequential start-up of a stack with ordered rollback.
//!
//! Stages run in dependency order: network, trace backend, log backend,
//! collector (which needs the backends' container names), metric backend
//! (which needs the collector's). Every acquired resource registers a
//! teardown; a failure at any stage unwinds the registered teardowns newest
//! first and reports the failing stage together with any unwind errors.

use crate::adapters::docker::DockerRuntime;
use crate::app::backends::{collector, Backend, Collector, Jaeger, Prometheus, Seq};
use crate::config::StackConfig;
use crate::core::launcher::ServiceLauncher;
use crate::core::poller::Poller;
use crate::core::stack::Stack;
use crate::core::teardown::TeardownStack;
use crate::domain::model::{Network, ServiceInstance, ServiceToggles, Stage};
use crate::domain::ports::{ContainerRuntime, TeardownFn};
use crate::utils::error::{Result, StackError};
use crate::utils::validation::Validate;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct StackOrchestrator {
    runtime: Arc<dyn ContainerRuntime>,
    launcher: ServiceLauncher,
    config: StackConfig,
}

impl StackOrchestrator {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: StackConfig) -> Self {
        Self {
            launcher: ServiceLauncher::new(runtime.clone()),
            runtime,
            config,
        }
    }

    /// Orchestrator backed by the docker (or podman) CLI named in the config.
    pub fn docker(config: StackConfig) -> Self {
        let runtime = Arc::new(DockerRuntime::from_config(&config.runtime));
        Self::new(runtime, config)
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    /// Start on a fresh network with no external cancellation.
    pub async fn start(&self, toggles: ServiceToggles) -> Result<Stack> {
        self.start_with(toggles, None, &CancellationToken::new()).await
    }

    /// Start the enabled backends plus the collector.
    ///
    /// A supplied `network` is used as is and never removed. On failure every
    /// resource acquired so far is released before the error is returned.
    pub async fn start_with(
        &self,
        toggles: ServiceToggles,
        network: Option<Network>,
        cancel: &CancellationToken,
    ) -> Result<Stack> {
        let poller = self.poller(cancel)?;
        let mut teardown = TeardownStack::new();

        let (network, owns_network) = match network {
            Some(network) => {
                tracing::info!("Using caller network {}", network.name);
                (network, false)
            }
            None => {
                check_cancelled(cancel, Stage::Network)
                    .map_err(|e| start_error(Stage::Network, e, Vec::new()))?;
                let network = self.runtime.create_network().await.map_err(|e| {
                    start_error(
                        Stage::Network,
                        StackError::NetworkCreationError {
                            source: Box::new(e),
                        },
                        Vec::new(),
                    )
                })?;
                tracing::info!("Created network {}", network.name);
                teardown.push(
                    format!("network {}", network.name),
                    remove_network(self.runtime.clone(), network.clone()),
                );
                (network, true)
            }
        };

        let images = &self.config.images;

        let jaeger = if toggles.traces {
            let backend = Jaeger::new(images.jaeger.clone());
            Some(
                self.launch(Stage::TraceBackend, &backend, &network, &mut teardown, cancel)
                    .await?,
            )
        } else {
            None
        };

        let seq = if toggles.logs {
            let backend = Seq::new(images.seq.clone());
            Some(
                self.launch(Stage::LogBackend, &backend, &network, &mut teardown, cancel)
                    .await?,
            )
        } else {
            None
        };

        let collector_backend = Collector::new(
            images.collector.clone(),
            jaeger
                .as_ref()
                .map_or(collector::PLACEHOLDER_TRACE_BACKEND, |j| j.name.as_str()),
            seq.as_ref()
                .map_or(collector::PLACEHOLDER_LOG_BACKEND, |s| s.name.as_str()),
        );
        let collector = self
            .launch(Stage::Collector, &collector_backend, &network, &mut teardown, cancel)
            .await?;

        let prometheus = if toggles.metrics {
            let backend = Prometheus::new(images.prometheus.clone(), &collector.name);
            Some(
                self.launch(Stage::MetricBackend, &backend, &network, &mut teardown, cancel)
                    .await?,
            )
        } else {
            None
        };

        tracing::info!(
            "Stack ready on network {} ({} teardown step(s) registered)",
            network.name,
            teardown.len()
        );

        Ok(Stack {
            network,
            owns_network,
            collector,
            jaeger,
            seq,
            prometheus,
            toggles,
            teardown,
            poller,
        })
    }

    /// Checked before anything is acquired, so a bad config leaks nothing.
    fn poller(&self, cancel: &CancellationToken) -> Result<Poller> {
        self.config.validate()?;
        let transport = self.config.polling.transport()?;
        Ok(Poller::new(Arc::new(transport), self.config.polling.settings())
            .with_cancellation(cancel.clone()))
    }

    async fn launch(
        &self,
        stage: Stage,
        backend: &dyn Backend,
        network: &Network,
        teardown: &mut TeardownStack,
        cancel: &CancellationToken,
    ) -> Result<ServiceInstance> {
        let launched = match check_cancelled(cancel, stage) {
            Ok(()) => self.launcher.start(backend, network).await,
            Err(e) => Err(e),
        };

        match launched {
            Ok((instance, remove)) => {
                teardown.push(instance.name.clone(), remove);
                Ok(instance)
            }
            Err(e) => {
                tracing::warn!("Stage {} failed, unwinding {} step(s): {}", stage, teardown.len(), e);
                let unwind_errors = std::mem::take(teardown).unwind().await;
                Err(start_error(stage, e, unwind_errors))
            }
        }
    }
}

fn check_cancelled(cancel: &CancellationToken, stage: Stage) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(StackError::Cancelled {
            context: format!("before starting {}", stage),
        });
    }
    Ok(())
}

fn start_error(stage: Stage, source: StackError, unwind_errors: Vec<StackError>) -> StackError {
    StackError::StackStartError {
        stage,
        source: Box::new(source),
        unwind_errors,
    }
}

fn remove_network(runtime: Arc<dyn ContainerRuntime>, network: Network) -> TeardownFn {
    Box::new(move || Box::pin(async move { runtime.remove_network(&network).await }))
}
