pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod test_support;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::DockerRuntime;
pub use app::queries::{LogClient, MetricClient, TraceClient};
pub use config::StackConfig;
pub use core::{OtlpProtocol, PollSettings, Poller, Stack, StackOrchestrator};
pub use domain::{
    LogEvent, MetricSeries, Network, QueryOutcome, ServiceInstance, ServiceToggles, TraceRecord,
};
pub use utils::error::{ErrorCategory, Result, StackError};
