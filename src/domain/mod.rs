// Domain layer: shared models and the ports (traits) the core drives.

pub mod model;
pub mod ports;

pub use model::{
    LogEvent, MetricSeries, Network, QueryOutcome, ServiceInstance, ServiceKind, ServiceToggles,
    Span, Stage, TraceRecord,
};
pub use ports::{ContainerRuntime, HttpTransport, TeardownFn};
