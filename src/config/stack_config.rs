use crate::app::backends::{collector, jaeger, prometheus, seq};
use crate::core::poller::PollSettings;
use crate::core::request::ReqwestTransport;
use crate::domain::model::ServiceToggles;
use crate::utils::error::{Result, StackError};
use crate::utils::validation::{validate_non_empty_string, validate_positive_number, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    /// Service name used by CLI queries when none is given on the command line.
    pub service_name: Option<String>,
    pub services: ServiceToggles,
    pub images: ImageConfig,
    pub runtime: RuntimeConfig,
    pub polling: PollingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub collector: String,
    pub jaeger: String,
    pub seq: String,
    pub prometheus: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            collector: collector::DEFAULT_IMAGE.to_string(),
            jaeger: jaeger::DEFAULT_IMAGE.to_string(),
            seq: seq::DEFAULT_IMAGE.to_string(),
            prometheus: prometheus::DEFAULT_IMAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Container engine CLI, `docker` or `podman`.
    pub binary: String,
    /// Host on which published ports are reachable.
    pub host: String,
    pub readiness_timeout_secs: u64,
    pub stop_timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            binary: "docker".to_string(),
            host: "localhost".to_string(),
            readiness_timeout_secs: 60,
            stop_timeout_secs: 30,
        }
    }
}

impl RuntimeConfig {
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_ms: u64,
    pub request_timeout_secs: Option<u64>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            request_timeout_secs: None,
        }
    }
}

impl PollingConfig {
    pub fn settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(self.interval_ms),
        }
    }

    pub fn transport(&self) -> Result<ReqwestTransport> {
        match self.request_timeout_secs {
            Some(secs) => ReqwestTransport::with_timeout(Duration::from_secs(secs)),
            None => Ok(ReqwestTransport::new()),
        }
    }
}

impl StackConfig {
    /// Load from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// Parse TOML, substituting `${VAR}` from the environment first.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content)?;

        toml::from_str(&processed).map_err(|e| StackError::InvalidConfigValueError {
            field: "toml_parsing".to_string(),
            value: String::new(),
            reason: format!("TOML parsing error: {}", e),
        })
    }

    /// Unset variables are left as written.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| StackError::config(format!("invalid substitution pattern: {}", e)))?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }
}

impl Validate for StackConfig {
    fn validate(&self) -> Result<()> {
        validate_non_empty_string("images.collector", &self.images.collector)?;
        validate_non_empty_string("images.jaeger", &self.images.jaeger)?;
        validate_non_empty_string("images.seq", &self.images.seq)?;
        validate_non_empty_string("images.prometheus", &self.images.prometheus)?;

        validate_non_empty_string("runtime.binary", &self.runtime.binary)?;
        validate_non_empty_string("runtime.host", &self.runtime.host)?;
        validate_positive_number(
            "runtime.readiness_timeout_secs",
            self.runtime.readiness_timeout_secs as usize,
            1,
        )?;

        validate_positive_number("polling.interval_ms", self.polling.interval_ms as usize, 1)?;
        if let Some(timeout) = self.polling.request_timeout_secs {
            validate_positive_number("polling.request_timeout_secs", timeout as usize, 1)?;
        }

        if let Some(service) = &self.service_name {
            validate_non_empty_string("service_name", service)?;
        }

        Ok(())
    }
}
