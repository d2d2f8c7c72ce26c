//! Eventually-consistent polling of a backend's read API.
//!
//! Each call issues one GET per attempt, sleeping a fixed interval between
//! attempts, until the normalized record count reaches the expected value,
//! a non-retryable failure occurs, or the attempt budget runs out.

use crate::core::request::{fetch_json, ReqwestTransport};
use crate::domain::model::QueryOutcome;
use crate::domain::ports::HttpTransport;
use crate::utils::error::{Result, StackError};
use crate::utils::validation::validate_positive_number;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// One backend's read API: how to address it and how to read its answer.
pub trait QueryVariant: Send + Sync {
    /// Backend-specific JSON shape.
    type Response: DeserializeOwned + Send;
    /// Shared result type.
    type Output: Send;

    /// Endpoint for an attempt made `elapsed` after the first one.
    fn endpoint(&self, elapsed: Duration) -> Result<String>;

    fn normalize(&self, response: Self::Response) -> std::result::Result<Self::Output, String>;

    fn record_count(output: &Self::Output) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

#[derive(Clone)]
pub struct Poller {
    transport: Arc<dyn HttpTransport>,
    settings: PollSettings,
    cancel: CancellationToken,
}

impl Poller {
    pub fn new(transport: Arc<dyn HttpTransport>, settings: PollSettings) -> Self {
        Self {
            transport,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort in-flight polls when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn settings(&self) -> PollSettings {
        self.settings
    }

    pub fn transport(&self) -> &dyn HttpTransport {
        self.transport.as_ref()
    }

    pub async fn poll<Q: QueryVariant>(
        &self,
        query: &Q,
        expected: usize,
        max_attempts: u32,
    ) -> Result<QueryOutcome<Q::Output>> {
        validate_positive_number("max_attempts", max_attempts as usize, 1)?;

        let started = Instant::now();
        let mut attempt: u32 = 1;

        loop {
            if attempt > 1 {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        return Err(StackError::Cancelled {
                            context: format!("waiting to retry, {} attempt(s) made", attempt - 1),
                        });
                    }
                    _ = tokio::time::sleep(self.settings.interval) => {}
                }
            }

            let endpoint = query.endpoint(started.elapsed())?;
            tracing::debug!("Poll attempt {}/{} on {}", attempt, max_attempts, endpoint);

            let response = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return Err(StackError::Cancelled {
                        context: format!("attempt {} on {}", attempt, endpoint),
                    });
                }
                response = fetch_json::<Q::Response>(self.transport.as_ref(), &endpoint) => response,
            };

            let failure = match response {
                Ok(raw) => {
                    let records = query.normalize(raw).map_err(|reason| StackError::DecodeError {
                        endpoint: endpoint.clone(),
                        reason,
                    })?;
                    let found = Q::record_count(&records);
                    if found >= expected {
                        return Ok(QueryOutcome {
                            records,
                            endpoint,
                            attempts: attempt,
                        });
                    }
                    StackError::InsufficientResultsError {
                        expected,
                        found,
                        attempts: attempt,
                        endpoint,
                    }
                }
                Err(e) if e.is_retryable() => e,
                Err(e) => return Err(e),
            };

            if attempt >= max_attempts {
                return Err(failure);
            }

            tracing::debug!("Attempt {} unsatisfied: {}", attempt, failure);
            attempt += 1;
        }
    }
}

impl Default for Poller {
    fn default() -> Self {
        Self::new(Arc::new(ReqwestTransport::new()), PollSettings::default())
    }
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("settings", &self.settings)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
