use super::Backend;
use crate::domain::model::ServiceKind;
use crate::domain::ports::ReadinessSignal;

pub const DEFAULT_IMAGE: &str = "jaegertracing/all-in-one:1.65.0";

pub const QUERY_PORT: u16 = 16686;
pub const COLLECTOR_HTTP_PORT: u16 = 14268;
pub const AGENT_PORT: u16 = 6831;
pub const OTLP_GRPC_PORT: u16 = 4317;

const PORTS: [u16; 4] = [QUERY_PORT, COLLECTOR_HTTP_PORT, AGENT_PORT, OTLP_GRPC_PORT];
const READY_LINE: &str = r#""msg":"Health Check state change","status":"ready""#;

/// Jaeger all-in-one, the trace backend.
#[derive(Debug, Clone)]
pub struct Jaeger {
    image: String,
}

impl Jaeger {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
        }
    }
}

impl Backend for Jaeger {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Jaeger
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
}
