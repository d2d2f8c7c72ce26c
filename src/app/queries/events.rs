//! Log event retrieval from the Seq events API.

use crate::core::poller::{Poller, QueryVariant};
use crate::domain::model::{LogEvent, MessageToken, Property, QueryOutcome};
use crate::utils::error::{Result, StackError};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SeqEvent {
    #[serde(default)]
    pub id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub message_template_tokens: Vec<SeqToken>,
    #[serde(default)]
    pub properties: Vec<SeqProperty>,
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub span_id: Option<String>,
}

/// Either literal text or a rendered property hole.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SeqToken {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub property_name: Option<String>,
    #[serde(default)]
    pub formatted_value: Option<String>,
    #[serde(default)]
    pub raw_text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SeqProperty {
    pub name: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// `GET /api/events?count=<expected>`.
#[derive(Debug, Clone)]
pub struct LogQuery {
    pub base_url: String,
    pub count: usize,
}

impl QueryVariant for LogQuery {
    type Response = Vec<SeqEvent>;
    type Output = Vec<LogEvent>;

    fn endpoint(&self, _elapsed: Duration) -> Result<String> {
        let mut url = Url::parse(&self.base_url)
            .and_then(|base| base.join("/api/events"))
            .map_err(|e| StackError::InvalidConfigValueError {
                field: "base_url".to_string(),
                value: self.base_url.clone(),
                reason: e.to_string(),
            })?;
        url.query_pairs_mut()
            .append_pair("count", &self.count.to_string());
        Ok(url.to_string())
    }

    fn normalize(&self, response: Self::Response) -> std::result::Result<Self::Output, String> {
        Ok(response.into_iter().map(normalize_event).collect())
    }

    fn record_count(output: &Self::Output) -> usize {
        output.len()
    }
}

fn normalize_event(event: SeqEvent) -> LogEvent {
    let properties: Vec<Property> = event
        .properties
        .into_iter()
        .map(|p| Property {
            name: p.name,
            value: p.value,
        })
        .collect();

    // Older Seq versions only carry trace context as properties.
    let trace_id = event
        .trace_id
        .or_else(|| string_property(&properties, "TraceId"));
    let span_id = event
        .span_id
        .or_else(|| string_property(&properties, "SpanId"));

    LogEvent {
        id: event.id,
        timestamp: event.timestamp,
        level: event.level,
        message_tokens: event
            .message_template_tokens
            .into_iter()
            .map(normalize_token)
            .collect(),
        properties,
        trace_id,
        span_id,
    }
}

fn normalize_token(token: SeqToken) -> MessageToken {
    let text = match (token.text, &token.property_name) {
        (Some(text), _) => text,
        (None, Some(name)) => token
            .formatted_value
            .or(token.raw_text)
            .unwrap_or_else(|| format!("{{{}}}", name)),
        (None, None) => token.raw_text.unwrap_or_default(),
    };

    MessageToken {
        text,
        property_name: token.property_name,
    }
}

fn string_property(properties: &[Property], name: &str) -> Option<String> {
    properties
        .iter()
        .find(|p| p.name == name)
        .and_then(|p| p.value.as_str())
        .map(str::to_string)
}

/// Polls the log backend for the most recent events.
#[derive(Debug, Clone)]
pub struct LogClient {
    base_url: String,
    poller: Poller,
}

impl LogClient {
    pub fn new(base_url: impl Into<String>, poller: Poller) -> Self {
        Self {
            base_url: base_url.into(),
            poller,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn events(
        &self,
        expected: usize,
        max_attempts: u32,
    ) -> Result<QueryOutcome<Vec<LogEvent>>> {
        let query = LogQuery {
            base_url: self.base_url.clone(),
            count: expected,
        };
        self.poller.poll(&query, expected, max_attempts).await
    }
}
