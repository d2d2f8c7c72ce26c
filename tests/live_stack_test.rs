//! Needs a running docker daemon: `cargo test -- --ignored`.

use anyhow::Result;
use otelstack::{OtlpProtocol, ServiceToggles, StackConfig, StackOrchestrator};

#[tokio::test]
#[ignore]
async fn test_full_stack_against_docker() -> Result<()> {
    let orchestrator = StackOrchestrator::docker(StackConfig::default());
    let stack = orchestrator.start(ServiceToggles::all()).await?;

    let checks = async {
        assert!(stack.otlp_endpoint(OtlpProtocol::Grpc)?.starts_with("http://localhost:"));
        assert!(stack.collector_healthy().await?);

        // Nothing has been exported, so empty answers must come back cleanly.
        let events = stack.log_client()?;
        let err = events.events(1, 1).await.err();
        assert!(matches!(
            err,
            Some(otelstack::StackError::InsufficientResultsError { found: 0, .. })
        ));
        anyhow::Ok(())
    }
    .await;

    stack.shutdown().await?;
    checks
}
