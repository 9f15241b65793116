//! Stockfeed Producer - daily stock price collector

use anyhow::{Context, Result};
use clap::Parser;
use stockfeed_common::logging::{init_logging, LogConfig, LogLevel};
use stockfeed_producer::error::{Error, LifecycleError};
use stockfeed_producer::publisher::{JsonSerializer, KafkaPublisher};
use stockfeed_producer::{lifecycle, Config};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "stockfeed-producer")]
#[command(author, version, about = "Publishes daily stock prices to Kafka")]
struct Cli {
    /// Run a single iteration and exit
    #[arg(long)]
    once: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbose flag
    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("stockfeed-producer")
        .build();

    // Merge with environment variables (they take precedence)
    let log_config = LogConfig::from_lookup(log_config, |key| std::env::var(key).ok())
        .context("Invalid logging configuration")?;

    let _log_guard = init_logging(&log_config)?;

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e).context("Failed to load configuration");
        },
    };

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let result = lifecycle::run(
        &config,
        |broker, shutdown| async move {
            KafkaPublisher::connect(&broker, JsonSerializer, &shutdown).await
        },
        shutdown,
        cli.once,
    )
    .await;

    let summary = match result {
        Ok(summary) => summary,
        Err(Error::Lifecycle(LifecycleError::Interrupted)) => {
            info!("Interrupted during startup, nothing to flush");
            return Ok(());
        },
        Err(e) => return Err(e).context("Producer stopped with an error"),
    };

    info!(
        cycles = summary.cycles,
        delivered = summary.delivered,
        failed = summary.failed,
        unpublished = summary.unpublished,
        "Producer shut down"
    );

    Ok(())
}

/// Cancel `shutdown` on Ctrl+C or SIGTERM
async fn cancel_on_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, finishing current iteration before shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, finishing current iteration before shutdown");
        },
    }

    shutdown.cancel();
}
