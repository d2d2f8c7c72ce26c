use crate::app::backends::{collector, jaeger, prometheus, seq};
use crate::app::queries::{probe_collector, LogClient, MetricClient, TraceClient};
use crate::core::poller::Poller;
use crate::core::teardown::TeardownStack;
use crate::domain::model::{Network, ServiceInstance, ServiceToggles};
use crate::utils::error::{Result, StackError};

pub const OTLP_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtlpProtocol {
    Grpc,
    Http,
}

impl OtlpProtocol {
    fn port(&self) -> u16 {
        match self {
            OtlpProtocol::Grpc => collector::OTLP_GRPC_PORT,
            OtlpProtocol::Http => collector::OTLP_HTTP_PORT,
        }
    }
}

/// A fully started stack. Dropping it leaks the containers; call [`Stack::shutdown`].
#[derive(Debug)]
pub struct Stack {
    pub(crate) network: Network,
    pub(crate) owns_network: bool,
    pub(crate) collector: ServiceInstance,
    pub(crate) jaeger: Option<ServiceInstance>,
    pub(crate) seq: Option<ServiceInstance>,
    pub(crate) prometheus: Option<ServiceInstance>,
    pub(crate) toggles: ServiceToggles,
    pub(crate) teardown: TeardownStack,
    pub(crate) poller: Poller,
}

impl Stack {
    pub fn network(&self) -> &Network {
        &self.network
    }

    /// False when the network was supplied by the caller and will outlive the stack.
    pub fn owns_network(&self) -> bool {
        self.owns_network
    }

    pub fn toggles(&self) -> ServiceToggles {
        self.toggles
    }

    pub fn collector(&self) -> &ServiceInstance {
        &self.collector
    }

    pub fn jaeger(&self) -> Option<&ServiceInstance> {
        self.jaeger.as_ref()
    }

    pub fn seq(&self) -> Option<&ServiceInstance> {
        self.seq.as_ref()
    }

    pub fn prometheus(&self) -> Option<&ServiceInstance> {
        self.prometheus.as_ref()
    }

    /// Every running service, in start order.
    pub fn services(&self) -> Vec<&ServiceInstance> {
        let mut services = Vec::with_capacity(4);
        services.extend(self.jaeger.as_ref());
        services.extend(self.seq.as_ref());
        services.push(&self.collector);
        services.extend(self.prometheus.as_ref());
        services
    }

    /// Replace the poller handed to query clients, e.g. to shorten the interval.
    pub fn set_poller(&mut self, poller: Poller) {
        self.poller = poller;
    }

    pub fn trace_client(&self) -> Result<TraceClient> {
        let instance = disabled_check(self.jaeger.as_ref(), "traces")?;
        Ok(TraceClient::new(
            instance.base_url(jaeger::QUERY_PORT)?,
            self.poller.clone(),
        ))
    }

    pub fn log_client(&self) -> Result<LogClient> {
        let instance = disabled_check(self.seq.as_ref(), "logs")?;
        Ok(LogClient::new(
            instance.base_url(seq::API_PORT)?,
            self.poller.clone(),
        ))
    }

    pub fn metric_client(&self) -> Result<MetricClient> {
        let instance = disabled_check(self.prometheus.as_ref(), "metrics")?;
        Ok(MetricClient::new(
            instance.base_url(prometheus::API_PORT)?,
            self.poller.clone(),
        ))
    }

    /// Where exporters under test should send OTLP data.
    pub fn otlp_endpoint(&self, protocol: OtlpProtocol) -> Result<String> {
        self.collector.base_url(protocol.port())
    }

    /// `OTEL_EXPORTER_OTLP_ENDPOINT` pair for a child process environment.
    pub fn otlp_env(&self, protocol: OtlpProtocol) -> Result<(String, String)> {
        Ok((OTLP_ENDPOINT_ENV.to_string(), self.otlp_endpoint(protocol)?))
    }

    pub async fn collector_healthy(&self) -> Result<bool> {
        let base_url = self.collector.base_url(collector::HEALTH_CHECK_PORT)?;
        probe_collector(self.poller.transport(), &base_url).await
    }

    /// Remove every container, newest first, then the network if it was created here.
    pub async fn shutdown(self) -> Result<()> {
        tracing::info!("Tearing down stack on network {}", self.network.name);
        let errors = self.teardown.unwind().await;
        if errors.is_empty() {
            tracing::info!("Stack torn down");
            Ok(())
        } else {
            Err(StackError::TeardownError { errors })
        }
    }
}

fn disabled_check<'a>(
    instance: Option<&'a ServiceInstance>,
    toggle: &str,
) -> Result<&'a ServiceInstance> {
    instance.ok_or_else(|| {
        StackError::config(format!("{} backend was not started (services.{} = false)", toggle, toggle))
    })
}
