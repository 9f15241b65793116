//! Process lifecycle: startup validation, connection, supervised run, teardown
//!
//! Startup is all-or-nothing. Configuration is validated before anything
//! touches the network, and the scheduler only starts once the broker
//! connection is proven. Once the connection exists, every exit path
//! (interrupt, loop error, panic) goes through [`teardown`] exactly once.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{BrokerConfig, Config};
use crate::error::{Error, LifecycleError};
use crate::fetcher::{Fetcher, HttpPageSource};
use crate::publisher::Publisher;
use crate::scheduler::{RunSummary, Scheduler, SystemClock};

/// Validate, connect, run the scheduler until shutdown, then tear down.
///
/// `connect` is only called after configuration has been validated. It gets
/// the shutdown token so an interrupt can end its retries.
pub async fn run<P, F, Fut>(
    config: &Config,
    connect: F,
    shutdown: CancellationToken,
    once: bool,
) -> Result<RunSummary, Error>
where
    P: Publisher,
    F: FnOnce(BrokerConfig, CancellationToken) -> Fut,
    Fut: Future<Output = Result<P, LifecycleError>>,
{
    config.validate()?;
    log_startup(config);

    let publisher = Arc::new(connect(config.broker.clone(), shutdown.clone()).await?);
    let shutdown_timeout = config.broker.shutdown_timeout();

    let source = match HttpPageSource::new(&config.source) {
        Ok(source) => source,
        Err(e) => {
            error!(error = %e, "Failed to build HTTP client");
            teardown(publisher.as_ref(), shutdown_timeout).await;
            return Err(e.into());
        },
    };

    let scheduler = Scheduler::new(
        Fetcher::from_config(source, &config.source),
        Arc::clone(&publisher),
        SystemClock::new(config.schedule.utc_offset),
        config,
    );

    supervise(
        scheduler.run(&shutdown, once),
        publisher.as_ref(),
        shutdown_timeout,
    )
    .await
}

/// Drive `work` to completion, catching panics, then tear down the publisher
pub async fn supervise<W, P>(work: W, publisher: &P, timeout: Duration) -> Result<RunSummary, Error>
where
    W: Future<Output = Result<RunSummary, Error>>,
    P: Publisher + ?Sized,
{
    let outcome = AssertUnwindSafe(work).catch_unwind().await;

    teardown(publisher, timeout).await;

    match outcome {
        Ok(Ok(summary)) => {
            info!(
                iterations = summary.iterations,
                cycles = summary.cycles,
                skipped = summary.skipped,
                delivered = summary.delivered,
                failed = summary.failed,
                unpublished = summary.unpublished,
                truncated_cycles = summary.truncated_cycles,
                "Scheduler stopped"
            );
            Ok(summary)
        },
        Ok(Err(e)) => {
            error!(error = %e, "Scheduler stopped on error");
            Err(e)
        },
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!(panic = %message, "Scheduler panicked");
            Err(LifecycleError::Aborted(message).into())
        },
    }
}

/// Flush then close, each bounded by `timeout`. Failures are logged, never returned.
pub async fn teardown<P: Publisher + ?Sized>(publisher: &P, timeout: Duration) {
    if let Err(e) = publisher.flush(timeout).await {
        warn!(error = %e, "Flush did not complete, some messages may be lost");
    }
    if let Err(e) = publisher.close(timeout).await {
        warn!(error = %e, "Close did not complete");
    }
    info!("Broker connection released");
}

fn log_startup(config: &Config) {
    info!(
        brokers = %config.broker.bootstrap_list(),
        topic = %config.broker.topic,
        endpoint = %config.source.endpoint_url(),
        page_size = config.source.page_size,
        interval_secs = config.schedule.interval_secs,
        cadence = %config.schedule.cadence,
        utc_offset = %config.schedule.utc_offset,
        reference_date = ?config.schedule.reference_date,
        "Starting stock price producer"
    );
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
