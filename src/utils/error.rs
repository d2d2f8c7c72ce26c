use crate::domain::model::Stage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StackError {
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value for {field} ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Container runtime command `{command}` failed: {message}")]
    RuntimeError { command: String, message: String },

    #[error("Could not create network: {source}")]
    NetworkCreationError {
        #[source]
        source: Box<StackError>,
    },

    #[error("{service}: could not launch container: {source}")]
    LaunchError {
        service: String,
        #[source]
        source: Box<StackError>,
    },

    #[error("{service}: readiness signal not observed: {message}")]
    ReadinessError { service: String, message: String },

    #[error("{service}: could not resolve host port for {port}: {message}")]
    PortResolutionError {
        service: String,
        port: u16,
        message: String,
    },

    #[error("Could not start {stage}: {source}{}", format_unwind(.unwind_errors))]
    StackStartError {
        stage: Stage,
        #[source]
        source: Box<StackError>,
        unwind_errors: Vec<StackError>,
    },

    #[error("{} error(s) while tearing down stack: {}", .errors.len(), join_errors(.errors))]
    TeardownError { errors: Vec<StackError> },

    #[error("Request to {endpoint} failed: {source}")]
    TransportError {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Retryable status {status} from {endpoint}")]
    RetryableResponseError { status: u16, endpoint: String },

    #[error("Non-retryable status {status} from {endpoint}")]
    NonRetryableResponseError { status: u16, endpoint: String },

    #[error("Could not decode response from {endpoint}: {reason}")]
    DecodeError { endpoint: String, reason: String },

    #[error("Expected at least {expected} records but found {found} after {attempts} attempt(s) on {endpoint}")]
    InsufficientResultsError {
        expected: usize,
        found: usize,
        attempts: u32,
        endpoint: String,
    },

    #[error("Operation cancelled ({context})")]
    Cancelled { context: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Provisioning,
    Query,
    Teardown,
}

impl StackError {
    pub fn config(message: impl Into<String>) -> Self {
        StackError::ConfigError {
            message: message.into(),
        }
    }

    /// True for HTTP statuses worth asking again for.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StackError::RetryableResponseError { .. })
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            StackError::ConfigError { .. } | StackError::InvalidConfigValueError { .. } => {
                ErrorCategory::Configuration
            }
            StackError::IoError(_)
            | StackError::RuntimeError { .. }
            | StackError::NetworkCreationError { .. }
            | StackError::LaunchError { .. }
            | StackError::ReadinessError { .. }
            | StackError::PortResolutionError { .. }
            | StackError::StackStartError { .. } => ErrorCategory::Provisioning,
            StackError::TeardownError { .. } => ErrorCategory::Teardown,
            StackError::TransportError { .. }
            | StackError::RetryableResponseError { .. }
            | StackError::NonRetryableResponseError { .. }
            | StackError::DecodeError { .. }
            | StackError::InsufficientResultsError { .. }
            | StackError::Cancelled { .. } => ErrorCategory::Query,
        }
    }

    /// The endpoint a query error was raised against, if any.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            StackError::TransportError { endpoint, .. }
            | StackError::RetryableResponseError { endpoint, .. }
            | StackError::NonRetryableResponseError { endpoint, .. }
            | StackError::DecodeError { endpoint, .. }
            | StackError::InsufficientResultsError { endpoint, .. } => Some(endpoint),
            _ => None,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            StackError::ConfigError { .. } | StackError::InvalidConfigValueError { .. } => {
                "Check the stack configuration file and command line flags"
            }
            StackError::RuntimeError { .. } | StackError::NetworkCreationError { .. } => {
                "Make sure the container engine is running and the current user can reach it"
            }
            StackError::LaunchError { .. } => {
                "Check that the image can be pulled and no other container holds the same name"
            }
            StackError::ReadinessError { .. } => {
                "Inspect the container logs or raise runtime.readiness_timeout_secs"
            }
            StackError::StackStartError { source, .. } => source.recovery_suggestion(),
            StackError::InsufficientResultsError { .. } | StackError::RetryableResponseError { .. } => {
                "Telemetry may still be in flight; raise the attempt count or flush exporters first"
            }
            StackError::TeardownError { .. } => {
                "Remove leftover containers and networks with the container engine CLI"
            }
            _ => "Re-run with --verbose for more detail",
        }
    }
}

fn join_errors(errors: &[StackError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn format_unwind(errors: &[StackError]) -> String {
    if errors.is_empty() {
        String::new()
    } else {
        format!(
            " (additionally {} error(s) while unwinding: {})",
            errors.len(),
            join_errors(errors)
        )
    }
}

pub type Result<T> = std::result::Result<T, StackError>;
