use super::collector::SCRAPE_PORT;
use super::Backend;
use crate::domain::model::ServiceKind;
use crate::domain::ports::{ContainerFile, ReadinessSignal};

pub const DEFAULT_IMAGE: &str = "prom/prometheus:v3.2.1";

pub const API_PORT: u16 = 9090;

const PORTS: [u16; 1] = [API_PORT];
const CONFIG_PATH: &str = "/etc/prometheus/prometheus.yml";

/// Prometheus scraping the collector's exporter, the metric backend.
#[derive(Debug, Clone)]
pub struct Prometheus {
    image: String,
    collector: String,
}

impl Prometheus {
    pub fn new(image: impl Into<String>, collector: &str) -> Self {
        Self {
            image: image.into(),
            collector: collector.to_string(),
        }
    }

    pub fn render_config(&self) -> String {
        format!(
            r#"
global:
  scrape_interval: 2s
  evaluation_interval: 2s

scrape_configs:
  - job_name: otel
    static_configs:
      - targets: ["{collector}:{scrape}"]

otlp:
  keep_identifying_resource_attributes: true
  promote_resource_attributes:
    - service.instance.id
    - service.name
    - service.namespace
    - service.version

storage:
  tsdb:
    out_of_order_time_window: 10m
"#,
            collector = self.collector,
            scrape = SCRAPE_PORT,
        )
    }
}

impl Backend for Prometheus {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Prometheus
    }

    fn image(&self) -> &str {
        &self.image
    }

    fn ports(&self) -> &'static [u16] {
        &PORTS
    }

    fn readiness(&self) -> ReadinessSignal {
        ReadinessSignal::ListeningPort(API_PORT)
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

    #[test]
    fn test_render_config_scrapes_collector() {
        let prometheus = Prometheus::new(DEFAULT_IMAGE, "collector");
        assert!(prometheus
            .render_config()
            .contains(r#"- targets: ["collector:8889"]"#));
    }
}
