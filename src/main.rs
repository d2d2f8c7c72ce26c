use clap::Parser;
use otelstack::config::cli::{resolve_service, Command};
use otelstack::utils::{logger, validation::Validate};
use otelstack::{
    CliConfig, ErrorCategory, LogClient, MetricClient, OtlpProtocol, Poller, QueryOutcome,
    StackConfig, StackError, StackOrchestrator, TraceClient,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    if cli.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose);
    }
    tracing::debug!("CLI config: {:?}", cli);

    if let Err(e) = cli.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        eprintln!("❌ {}", e);
        eprintln!("💡 {}", e.recovery_suggestion());
        std::process::exit(exit_code(e.category()));
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted, cleaning up");
                cancel.cancel();
            }
        });
    }

    if let Err(e) = run(cli, cancel).await {
        tracing::error!("❌ {} (category: {:?})", e, e.category());
        eprintln!("❌ {}", e);
        if let Some(endpoint) = e.endpoint() {
            eprintln!("🔗 Last endpoint: {}", endpoint);
        }
        eprintln!("💡 {}", e.recovery_suggestion());
        std::process::exit(exit_code(e.category()));
    }

    Ok(())
}

async fn run(cli: CliConfig, cancel: CancellationToken) -> Result<(), StackError> {
    let config = cli.stack_config()?;

    match cli.command {
        Command::Up(args) => {
            let toggles = args.toggles(config.services);
            let orchestrator = StackOrchestrator::docker(config);
            let stack = orchestrator.start_with(toggles, None, &cancel).await?;

            println!("✅ Stack ready on network {}", stack.network().name);
            for service in stack.services() {
                let mut ports: Vec<_> = service.ports.iter().collect();
                ports.sort();
                println!("  {:<10} {:<32} {:?}", service.kind.as_str(), service.name, ports);
            }
            for protocol in [OtlpProtocol::Grpc, OtlpProtocol::Http] {
                let (key, value) = stack.otlp_env(protocol)?;
                println!("  {:?}: {}={}", protocol, key, value);
            }
            match stack.collector_healthy().await {
                Ok(healthy) => tracing::info!("Collector healthy: {}", healthy),
                Err(e) => tracing::warn!("Collector health probe failed: {}", e),
            }

            println!("Press Ctrl-C to tear down");
            cancel.cancelled().await;
            stack.shutdown().await?;
            println!("🧹 Stack torn down");
        }
        Command::Traces(args) => {
            let service = resolve_service(args.service.as_deref(), &config)?;
            let client = TraceClient::new(args.url, poller(&config, &cancel)?);
            let outcome = client
                .traces(&service, args.poll.expected, args.poll.attempts)
                .await?;
            print_outcome(&outcome)?;
        }
        Command::Events(args) => {
            let client = LogClient::new(args.url, poller(&config, &cancel)?);
            let outcome = client.events(args.poll.expected, args.poll.attempts).await?;
            print_outcome(&outcome)?;
        }
        Command::Metrics(args) => {
            let service = resolve_service(args.service.as_deref(), &config)?;
            let client = MetricClient::new(args.url, poller(&config, &cancel)?);
            let outcome = client
                .series(
                    &args.metric,
                    &service,
                    Duration::from_secs(args.lookback_secs),
                    args.poll.expected,
                    args.poll.attempts,
                )
                .await?;
            print_outcome(&outcome)?;
        }
    }

    Ok(())
}

fn poller(config: &StackConfig, cancel: &CancellationToken) -> Result<Poller, StackError> {
    Ok(Poller::new(
        Arc::new(config.polling.transport()?),
        config.polling.settings(),
    )
    .with_cancellation(cancel.clone()))
}

fn print_outcome<T: Serialize>(outcome: &QueryOutcome<T>) -> Result<(), StackError> {
    tracing::info!(
        "✅ Satisfied after {} attempt(s) on {}",
        outcome.attempts,
        outcome.endpoint
    );
    let json = serde_json::to_string_pretty(&outcome.records)
        .map_err(|e| StackError::config(format!("could not render records: {}", e)))?;
    println!("{}", json);
    Ok(())
}

fn exit_code(category: ErrorCategory) -> i32 {
    match category {
        ErrorCategory::Query => 1,
        ErrorCategory::Configuration => 2,
        ErrorCategory::Provisioning => 3,
        ErrorCategory::Teardown => 4,
    }
}
