use crate::domain::ports::{HttpResponse, HttpTransport};
use crate::utils::error::{Result, StackError};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Statuses a backend may return while it is still settling.
pub const RETRYABLE_STATUSES: [u16; 9] = [408, 429, 500, 502, 503, 504, 409, 423, 425];

const BODY_PREVIEW_LIMIT: usize = 512;

/// `HttpTransport` backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            StackError::config(format!("could not build HTTP client: {}", e))
        })?;
        Ok(Self { client })
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, endpoint: &str) -> Result<HttpResponse> {
        tracing::debug!("GET {}", endpoint);
        let transport_error = |source| StackError::TransportError {
            endpoint: endpoint.to_string(),
            source,
        };

        let response = self.client.get(endpoint).send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport_error)?;

        tracing::debug!("Response status {} ({} bytes)", status, body.len());
        Ok(HttpResponse { status, body })
    }
}

/// Map a non-200 status to its error class.
pub fn check_status(status: u16, endpoint: &str) -> Result<()> {
    if status == 200 {
        return Ok(());
    }

    if RETRYABLE_STATUSES.contains(&status) {
        Err(StackError::RetryableResponseError {
            status,
            endpoint: endpoint.to_string(),
        })
    } else {
        Err(StackError::NonRetryableResponseError {
            status,
            endpoint: endpoint.to_string(),
        })
    }
}

/// Parse a 200 body, keeping a preview of the body on failure.
pub fn decode_body<T: DeserializeOwned>(response: &HttpResponse, endpoint: &str) -> Result<T> {
    serde_json::from_str(&response.body).map_err(|e| StackError::DecodeError {
        endpoint: endpoint.to_string(),
        reason: format!("{} in body {}", e, preview(&response.body)),
    })
}

/// One GET, status check and decode.
pub async fn fetch_json<T: DeserializeOwned>(
    transport: &dyn HttpTransport,
    endpoint: &str,
) -> Result<T> {
    let response = transport.get(endpoint).await?;
    check_status(response.status, endpoint)?;
    decode_body(&response, endpoint)
}

fn preview(body: &str) -> String {
    if body.len() <= BODY_PREVIEW_LIMIT {
        return body.to_string();
    }
    let mut end = BODY_PREVIEW_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
