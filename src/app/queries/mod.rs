//! Polling clients for the read APIs of the storage backends.

pub mod events;
pub mod health;
pub mod metrics;
pub mod traces;

pub use events::{LogClient, LogQuery};
pub use health::probe_collector;
pub use metrics::{MetricClient, MetricQuery};
pub use traces::{TraceClient, TraceQuery};
