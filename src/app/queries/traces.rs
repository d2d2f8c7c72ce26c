//! Trace retrieval from the Jaeger query API.

use crate::core::poller::{Poller, QueryVariant};
use crate::domain::model::{QueryOutcome, Span, SpanLog, SpanReference, Tag, TraceRecord};
use crate::utils::error::{Result, StackError};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

#[derive(Debug, Deserialize)]
pub struct JaegerResponse {
    /// Null when nothing matched.
    #[serde(default)]
    pub data: Option<Vec<JaegerTrace>>,
}

#[derive(Debug, Deserialize)]
pub struct JaegerTrace {
    #[serde(rename = "traceID")]
    pub trace_id: String,
    #[serde(default)]
    pub spans: Vec<JaegerSpan>,
    #[serde(default)]
    pub processes: HashMap<String, JaegerProcess>,
}

#[derive(Debug, Deserialize)]
pub struct JaegerProcess {
    #[serde(rename = "serviceName")]
    pub service_name: String,
}

#[derive(Debug, Deserialize)]
pub struct JaegerSpan {
    #[serde(rename = "traceID")]
    pub trace_id: String,
    #[serde(rename = "spanID")]
    pub span_id: String,
    #[serde(rename = "operationName", default)]
    pub operation_name: String,
    #[serde(default)]
    pub references: Vec<JaegerReference>,
    /// Microseconds since the epoch.
    #[serde(rename = "startTime", default)]
    pub start_time: i64,
    /// Microseconds.
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub tags: Vec<JaegerKeyValue>,
    #[serde(default)]
    pub logs: Vec<JaegerLog>,
    #[serde(rename = "processID", default)]
    pub process_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct JaegerReference {
    #[serde(rename = "refType")]
    pub ref_type: String,
    #[serde(rename = "traceID")]
    pub trace_id: String,
    #[serde(rename = "spanID")]
    pub span_id: String,
}

#[derive(Debug, Deserialize)]
pub struct JaegerKeyValue {
    pub key: String,
    #[serde(rename = "type", default)]
    pub value_type: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct JaegerLog {
    pub timestamp: i64,
    #[serde(default)]
    pub fields: Vec<JaegerKeyValue>,
}

/// `GET /api/traces?service=<service>&limit=<expected>`.
#[derive(Debug, Clone)]
pub struct TraceQuery {
    pub base_url: String,
    pub service: String,
    pub limit: usize,
}

impl QueryVariant for TraceQuery {
    type Response = JaegerResponse;
    type Output = Vec<TraceRecord>;

    fn endpoint(&self, _elapsed: Duration) -> Result<String> {
        let mut url = Url::parse(&self.base_url)
            .and_then(|base| base.join("/api/traces"))
            .map_err(|e| StackError::InvalidConfigValueError {
                field: "base_url".to_string(),
                value: self.base_url.clone(),
                reason: e.to_string(),
            })?;
        url.query_pairs_mut()
            .append_pair("service", &self.service)
            .append_pair("limit", &self.limit.to_string());
        Ok(url.to_string())
    }

    fn normalize(&self, response: Self::Response) -> std::result::Result<Self::Output, String> {
        response
            .data
            .unwrap_or_default()
            .into_iter()
            .map(normalize_trace)
            .collect()
    }

    fn record_count(output: &Self::Output) -> usize {
        output.len()
    }
}

fn normalize_trace(trace: JaegerTrace) -> std::result::Result<TraceRecord, String> {
    let processes = trace.processes;
    let spans = trace
        .spans
        .into_iter()
        .map(|span| {
            let service_name = span
                .process_id
                .as_ref()
                .and_then(|id| processes.get(id))
                .map(|p| p.service_name.clone());
            normalize_span(span, service_name)
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(TraceRecord {
        trace_id: trace.trace_id,
        spans,
    })
}

fn normalize_span(
    span: JaegerSpan,
    service_name: Option<String>,
) -> std::result::Result<Span, String> {
    let duration = u64::try_from(span.duration)
        .map_err(|_| format!("span {} has negative duration {}", span.span_id, span.duration))?;

    let logs = span
        .logs
        .into_iter()
        .map(|log| -> std::result::Result<SpanLog, String> {
            Ok(SpanLog {
                timestamp: micros_to_datetime(log.timestamp)?,
                fields: log.fields.into_iter().map(tag).collect(),
            })
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(Span {
        start_time: micros_to_datetime(span.start_time)?,
        duration: Duration::from_micros(duration),
        trace_id: span.trace_id,
        span_id: span.span_id,
        operation_name: span.operation_name,
        references: span
            .references
            .into_iter()
            .map(|r| SpanReference {
                ref_type: r.ref_type,
                trace_id: r.trace_id,
                span_id: r.span_id,
            })
            .collect(),
        tags: span.tags.into_iter().map(tag).collect(),
        logs,
        service_name,
    })
}

fn tag(kv: JaegerKeyValue) -> Tag {
    Tag {
        key: kv.key,
        value_type: kv.value_type,
        value: kv.value,
    }
}

fn micros_to_datetime(micros: i64) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| format!("timestamp {} out of range", micros))
}

/// Polls the trace backend for a service's traces.
#[derive(Debug, Clone)]
pub struct TraceClient {
    base_url: String,
    poller: Poller,
}

impl TraceClient {
    pub fn new(base_url: impl Into<String>, poller: Poller) -> Self {
        Self {
            base_url: base_url.into(),
            poller,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Wait until at least `expected` traces of `service` are stored.
    pub async fn traces(
        &self,
        service: &str,
        expected: usize,
        max_attempts: u32,
    ) -> Result<QueryOutcome<Vec<TraceRecord>>> {
        let query = TraceQuery {
            base_url: self.base_url.clone(),
            service: service.to_string(),
            limit: expected,
        };
        self.poller.poll(&query, expected, max_attempts).await
    }
}
