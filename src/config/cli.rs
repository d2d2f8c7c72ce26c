use crate::config::StackConfig;
use crate::domain::model::ServiceToggles;
use crate::utils::error::{Result, StackError};
use crate::utils::validation::{
    validate_non_empty_string, validate_positive_number, validate_url, Validate,
};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "otelstack")]
#[command(about = "Ephemeral OpenTelemetry backends for integration tests")]
pub struct CliConfig {
    /// TOML stack configuration.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Log as JSON lines")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Start a stack, print its endpoints and wait for Ctrl-C.
    Up(UpArgs),
    /// Poll a trace backend for a service's traces.
    Traces(TracesArgs),
    /// Poll a log backend for recent events.
    Events(EventsArgs),
    /// Poll a metric backend for a service's metric samples.
    Metrics(MetricsArgs),
}

#[derive(Debug, Clone, Args)]
pub struct UpArgs {
    #[arg(long)]
    pub no_traces: bool,

    #[arg(long)]
    pub no_logs: bool,

    #[arg(long)]
    pub no_metrics: bool,
}

impl UpArgs {
    /// Flags can only switch off what the config enables.
    pub fn toggles(&self, configured: ServiceToggles) -> ServiceToggles {
        ServiceToggles {
            traces: configured.traces && !self.no_traces,
            logs: configured.logs && !self.no_logs,
            metrics: configured.metrics && !self.no_metrics,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct PollArgs {
    #[arg(long, default_value = "1")]
    pub expected: usize,

    #[arg(long, default_value = "10")]
    pub attempts: u32,
}

#[derive(Debug, Clone, Args)]
pub struct TracesArgs {
    #[arg(long, default_value = "http://localhost:16686")]
    pub url: String,

    #[arg(long)]
    pub service: Option<String>,

    #[command(flatten)]
    pub poll: PollArgs,
}

#[derive(Debug, Clone, Args)]
pub struct EventsArgs {
    #[arg(long, default_value = "http://localhost:5380")]
    pub url: String,

    #[command(flatten)]
    pub poll: PollArgs,
}

#[derive(Debug, Clone, Args)]
pub struct MetricsArgs {
    #[arg(long, default_value = "http://localhost:9090")]
    pub url: String,

    #[arg(long)]
    pub metric: String,

    #[arg(long)]
    pub service: Option<String>,

    #[arg(long, default_value = "60")]
    pub lookback_secs: u64,

    #[command(flatten)]
    pub poll: PollArgs,
}

impl CliConfig {
    /// Stack config from `--config`, or defaults.
    pub fn stack_config(&self) -> Result<StackConfig> {
        let config = match &self.config {
            Some(path) => StackConfig::from_file(path)?,
            None => StackConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Service name from the command line, else from the config file.
pub fn resolve_service(explicit: Option<&str>, config: &StackConfig) -> Result<String> {
    explicit
        .map(str::to_string)
        .or_else(|| config.service_name.clone())
        .ok_or_else(|| StackError::InvalidConfigValueError {
            field: "service".to_string(),
            value: String::new(),
            reason: "pass --service or set service_name in the config file".to_string(),
        })
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        let (url, poll) = match &self.command {
            Command::Up(_) => return Ok(()),
            Command::Traces(args) => (&args.url, &args.poll),
            Command::Events(args) => (&args.url, &args.poll),
            Command::Metrics(args) => {
                validate_non_empty_string("metric", &args.metric)?;
                (&args.url, &args.poll)
            }
        };

        validate_url("url", url)?;
        validate_positive_number("attempts", poll.attempts as usize, 1)?;
        Ok(())
    }
}
