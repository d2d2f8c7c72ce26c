use anyhow::Result;
use otelstack::utils::validation::Validate;
use otelstack::{ServiceToggles, StackConfig, StackOrchestrator};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

#[test]
fn test_full_config_file() -> Result<()> {
    std::env::set_var("OTELSTACK_IT_ENGINE", "podman");

    let mut file = NamedTempFile::new()?;
    writeln!(
        file,
        r#"
service_name = "checkout"

[services]
metrics = false
logs = true
traces = true

[images]
jaeger = "jaegertracing/all-in-one:1.66.0"

[runtime]
binary = "${{OTELSTACK_IT_ENGINE}}"
host = "127.0.0.1"
readiness_timeout_secs = 90
stop_timeout_secs = 5

[polling]
interval_ms = 500
request_timeout_secs = 10
"#
    )?;

    let config = StackConfig::from_file(file.path())?;
    config.validate()?;

    assert_eq!(config.runtime.binary, "podman");
    assert_eq!(config.runtime.host, "127.0.0.1");
    assert_eq!(config.runtime.stop_timeout(), Duration::from_secs(5));
    assert_eq!(config.images.jaeger, "jaegertracing/all-in-one:1.66.0");
    assert_eq!(config.images.seq, "datalust/seq:2024.3");
    assert_eq!(
        config.services,
        ServiceToggles {
            metrics: false,
            logs: true,
            traces: true
        }
    );
    assert_eq!(config.polling.settings().interval, Duration::from_millis(500));
    assert!(config.polling.transport().is_ok());

    let orchestrator = StackOrchestrator::docker(config);
    assert_eq!(orchestrator.config().service_name.as_deref(), Some("checkout"));

    std::env::remove_var("OTELSTACK_IT_ENGINE");
    Ok(())
}

#[test]
fn test_missing_file_is_an_io_error() {
    let result = StackConfig::from_file("/nonexistent/otelstack.toml");
    assert!(matches!(result, Err(otelstack::StackError::IoError(_))));
}
