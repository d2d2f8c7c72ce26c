// Adapters layer: concrete container runtimes behind the domain ports.

pub mod docker;

pub use docker::DockerRuntime;
