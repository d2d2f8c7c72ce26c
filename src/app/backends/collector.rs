use super::Backend;
use crate::domain::model::ServiceKind;
use crate::domain::ports::{ContainerFile, ReadinessSignal};

pub const DEFAULT_IMAGE: &str = "otel/opentelemetry-collector:0.117.0";

pub const OTLP_GRPC_PORT: u16 = 4317;
pub const OTLP_HTTP_PORT: u16 = 4318;
pub const HEALTH_CHECK_PORT: u16 = 13133;
/// Prometheus exporter, scraped over the stack network only.
pub const SCRAPE_PORT: u16 = 8889;
pub const HEALTH_CHECK_PATH: &str = "/health/status";

const PORTS: [u16; 3] = [OTLP_GRPC_PORT, OTLP_HTTP_PORT, HEALTH_CHECK_PORT];
const CONFIG_PATH: &str = "/etc/otelcol/config.yaml";
const READY_LINE: &str = "Everything is ready. Begin running and processing data";

/// Placeholder peers used when a storage backend is disabled.
pub const PLACEHOLDER_TRACE_BACKEND: &str = "jaeger";
pub const PLACEHOLDER_LOG_BACKEND: &str = "seq";

/// OTEL collector fanning OTLP out to the trace, log and metric backends.
#[derive(Debug, Clone)]
pub struct Collector {
    image: String,
    trace_backend: String,
    log_backend: String,
}

impl Collector {
    pub fn new(image: impl Into<String>, trace_backend: &str, log_backend: &str) -> Self {
        Self {
            image: image.into(),
            trace_backend: trace_backend.to_string(),
            log_backend: log_backend.to_string(),
        }
    }

    pub fn render_config(&self) -> String {
        format!(
            r#"
receivers:
  otlp:
    protocols:
      grpc:
        endpoint: 0.0.0.0:{grpc}
      http:
        endpoint: 0.0.0.0:{http}

exporters:
  otlp:
    endpoint: {traces}:4317
    tls:
      insecure: true

  otlphttp/logs:
    endpoint: http://{logs}/ingest/otlp

  prometheus:
    endpoint: "0.0.0.0:{scrape}"
    send_timestamps: true
    metric_expiration: 180m
    resource_to_telemetry_conversion:
      enabled: true

extensions:
  health_check:
    endpoint: "0.0.0.0:{health}"
    path: "{health_path}"
    check_collector_pipeline:
      enabled: true
      interval: "10s"
      exporter_failure_threshold: 5

service:
  extensions: [health_check]
  pipelines:
    traces:
      receivers: [otlp]
      exporters: [otlp]

    logs:
      receivers: [otlp]
      exporters: [otlphttp/logs]

    metrics:
      receivers: [otlp]
      exporters: [prometheus]
"#,
            grpc = OTLP_GRPC_PORT,
            http = OTLP_HTTP_PORT,
            traces = self.trace_backend,
            logs = self.log_backend,
            scrape = SCRAPE_PORT,
            health = HEALTH_CHECK_PORT,
            health_path = HEALTH_CHECK_PATH,
        )
    }
}

impl Backend for Collector {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Collector
    }

    fn image(&self) -> &str {
        &self.image
    }

    fn ports(&self) -> &'static [u16] {
        &PORTS
    }

    fn readiness(&self) -> ReadinessSignal {
        ReadinessSignal::LogLine(READY_LINE.to_string())
    }

    fn files(&self) -> Vec<ContainerFile> {
        vec![ContainerFile {
            container_path: CONFIG_PATH.to_string(),
            contents: self.render_config().into_bytes(),
            mode: 0o644,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Network;

    #[test]
    fn test_render_config_embeds_peer_names() {
        let collector = Collector::new(DEFAULT_IMAGE, "otelstack-jaeger-1", "otelstack-seq-2");
        let config = collector.render_config();

        assert!(config.contains("endpoint: otelstack-jaeger-1:4317"));
        assert!(config.contains("endpoint: http://otelstack-seq-2/ingest/otlp"));
        assert!(config.contains(r#"endpoint: "0.0.0.0:8889""#));
        assert!(config.contains(r#"path: "/health/status""#));
    }

    #[test]
    fn test_container_spec_carries_config_file() {
        let collector = Collector::new(DEFAULT_IMAGE, "jaeger", "seq");
        let spec = collector.container_spec(&Network::new("net-id", "net"));

        assert_eq!(spec.name_prefix, "otelstack-collector");
        assert_eq!(spec.network, "net");
        assert_eq!(spec.exposed_ports, vec![4317, 4318, 13133]);
        assert_eq!(spec.files.len(), 1);
        assert_eq!(spec.files[0].container_path, "/etc/otelcol/config.yaml");
        assert_eq!(spec.files[0].mode, 0o644);
        assert_eq!(
            collector.readiness(),
            ReadinessSignal::LogLine(READY_LINE.to_string())
        );
    }
}
