use crate::utils::error::{Result, StackError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

/// Isolated virtual network shared by every container of a stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    pub id: String,
    pub name: String,
}

impl Network {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Collector,
    Jaeger,
    Seq,
    Prometheus,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Collector => "collector",
            ServiceKind::Jaeger => "jaeger",
            ServiceKind::Seq => "seq",
            ServiceKind::Prometheus => "prometheus",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Start-up stage of a stack, in dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Network,
    TraceBackend,
    LogBackend,
    Collector,
    MetricBackend,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Network => "network",
            Stage::TraceBackend => "trace backend (jaeger)",
            Stage::LogBackend => "log backend (seq)",
            Stage::Collector => "collector",
            Stage::MetricBackend => "metric backend (prometheus)",
        };
        f.write_str(name)
    }
}

/// Which storage backends to start. The collector always runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceToggles {
    pub metrics: bool,
    pub logs: bool,
    pub traces: bool,
}

impl ServiceToggles {
    pub fn all() -> Self {
        Self {
            metrics: true,
            logs: true,
            traces: true,
        }
    }

    pub fn none() -> Self {
        Self {
            metrics: false,
            logs: false,
            traces: false,
        }
    }
}

impl Default for ServiceToggles {
    fn default() -> Self {
        Self::all()
    }
}

/// A launched, ready container and its resolved host ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInstance {
    pub kind: ServiceKind,
    pub name: String,
    pub host: String,
    pub ports: HashMap<u16, u16>,
    pub ready: bool,
}

impl ServiceInstance {
    /// Host port mapped to the given container port.
    pub fn port(&self, logical: u16) -> Result<u16> {
        self.ports.get(&logical).copied().ok_or_else(|| {
            StackError::config(format!(
                "{} does not expose logical port {}",
                self.kind, logical
            ))
        })
    }

    pub fn base_url(&self, logical: u16) -> Result<String> {
        Ok(format!("http://{}:{}", self.host, self.port(logical)?))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceRecord {
    pub trace_id: String,
    pub spans: Vec<Span>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Span {
    pub trace_id: String,
    pub span_id: String,
    pub operation_name: String,
    pub references: Vec<SpanReference>,
    pub start_time: DateTime<Utc>,
    pub duration: Duration,
    pub tags: Vec<Tag>,
    pub logs: Vec<SpanLog>,
    pub service_name: Option<String>,
}

impl Span {
    pub fn tag(&self, key: &str) -> Option<&Tag> {
        self.tags.iter().find(|t| t.key == key)
    }

    /// Span ID of the `CHILD_OF` parent, if any.
    pub fn parent_span_id(&self) -> Option<&str> {
        self.references
            .iter()
            .find(|r| r.ref_type == "CHILD_OF")
            .map(|r| r.span_id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpanReference {
    pub ref_type: String,
    pub trace_id: String,
    pub span_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tag {
    pub key: String,
    pub value_type: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpanLog {
    pub timestamp: DateTime<Utc>,
    pub fields: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEvent {
    pub id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub level: Option<String>,
    pub message_tokens: Vec<MessageToken>,
    pub properties: Vec<Property>,
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
}

impl LogEvent {
    /// Tokens joined back into the rendered message.
    pub fn message(&self) -> String {
        self.message_tokens
            .iter()
            .map(|t| t.text.as_str())
            .collect()
    }

    pub fn property(&self, name: &str) -> Option<&serde_json::Value> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageToken {
    pub text: String,
    pub property_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Property {
    pub name: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSeries {
    pub name: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub samples: Vec<Sample>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Result of a successful poll.
#[derive(Debug, Clone)]
pub struct QueryOutcome<T> {
    pub records: T,
    pub endpoint: String,
    pub attempts: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance() -> ServiceInstance {
        ServiceInstance {
            kind: ServiceKind::Seq,
            name: "seq-1".to_string(),
            host: "localhost".to_string(),
            ports: HashMap::from([(80, 49153), (5341, 49154)]),
            ready: true,
        }
    }

    #[test]
    fn test_service_instance_ports() {
        let seq = instance();
        assert_eq!(seq.port(80).unwrap(), 49153);
        assert_eq!(seq.base_url(5341).unwrap(), "http://localhost:49154");
        assert!(matches!(seq.port(9090), Err(StackError::ConfigError { .. })));
    }

    #[test]
    fn test_log_event_message_joins_tokens() {
        let event = LogEvent {
            id: Some("event-1".to_string()),
            timestamp: Utc::now(),
            level: Some("Error".to_string()),
            message_tokens: vec![
                MessageToken {
                    text: "user ".to_string(),
                    property_name: None,
                },
                MessageToken {
                    text: "42".to_string(),
                    property_name: Some("UserId".to_string()),
                },
            ],
            properties: vec![Property {
                name: "UserId".to_string(),
                value: serde_json::json!(42),
            }],
            trace_id: None,
            span_id: None,
        };

        assert_eq!(event.message(), "user 42");
        assert_eq!(event.property("UserId"), Some(&serde_json::json!(42)));
    }
}
