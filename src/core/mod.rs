pub mod launcher;
pub mod orchestrator;
pub mod poller;
pub mod request;
pub mod stack;
pub mod teardown;

pub use launcher::ServiceLauncher;
pub use orchestrator::StackOrchestrator;
pub use poller::{PollSettings, Poller, QueryVariant};
pub use request::ReqwestTransport;
pub use stack::{OtlpProtocol, Stack};
pub use teardown::TeardownStack;
pub use crate::utils::error::Result;
