//! Collection cadence
//!
//! Each iteration either skips (weekend in the market's zone) or runs one
//! cycle: fetch every page for the reference date, then publish the records
//! one at a time. Between iterations the scheduler sleeps. A shutdown request
//! interrupts that sleep, and during a cycle it stops publishing before the
//! next record. Fetching and the send already in flight always complete.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Utc, Weekday};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{Cadence, Config};
use crate::error::Error;
use crate::fetcher::{FetchOutcome, Fetcher, PageSource};
use crate::publisher::Publisher;
use stockfeed_common::types::Envelope;

// ============================================================================
// Clock
// ============================================================================

/// Source of the current time in the market's zone
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Wall clock viewed at a fixed UTC offset
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }
}

/// A clock stopped at one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<FixedOffset>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.0
    }
}

/// Weekends are the only non-trading days
pub fn is_trading_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

// ============================================================================
// Reports
// ============================================================================

/// What one trading-day cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub reference_date: NaiveDate,
    pub requests: u32,
    pub fetched: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Records left unsent because shutdown was requested mid-cycle
    pub unpublished: usize,
    pub truncated: bool,
    pub elapsed: Duration,
}

/// Result of one scheduler iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    Skipped { date: NaiveDate },
    Cycle(CycleReport),
}

/// Totals over a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub iterations: u64,
    pub skipped: u64,
    pub cycles: u64,
    pub delivered: u64,
    pub failed: u64,
    pub unpublished: u64,
    pub truncated_cycles: u64,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &IterationOutcome) {
        self.iterations += 1;
        match outcome {
            IterationOutcome::Skipped { .. } => self.skipped += 1,
            IterationOutcome::Cycle(report) => {
                self.cycles += 1;
                self.delivered += report.delivered as u64;
                self.failed += report.failed as u64;
                self.unpublished += report.unpublished as u64;
                if report.truncated {
                    self.truncated_cycles += 1;
                }
            },
        }
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Drives fetch and publish on a fixed interval
pub struct Scheduler<S, P, C = SystemClock> {
    fetcher: Fetcher<S>,
    publisher: P,
    clock: C,
    topic: String,
    endpoint: String,
    interval: Duration,
    cadence: Cadence,
    reference_date: Option<NaiveDate>,
}

impl<S, P, C> Scheduler<S, P, C>
where
    S: PageSource,
    P: Publisher,
    C: Clock,
{
    pub fn new(fetcher: Fetcher<S>, publisher: P, clock: C, config: &Config) -> Self {
        Self {
            fetcher,
            publisher,
            clock,
            topic: config.broker.topic.clone(),
            endpoint: config.source.endpoint.clone(),
            interval: config.schedule.interval(),
            cadence: config.schedule.cadence,
            reference_date: config.schedule.reference_date,
        }
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Run one iteration: skip a non-trading day, otherwise fetch and publish.
    ///
    /// Per-record publish failures are counted and skipped. Only a publisher
    /// that can no longer deliver anything ends the iteration with an error.
    /// Once `shutdown` is cancelled no further record is handed to the publisher.
    pub async fn run_iteration(&self, shutdown: &CancellationToken) -> Result<IterationOutcome, Error> {
        let today = self.clock.today();
        if !is_trading_day(today) {
            info!(date = %today, weekday = %today.weekday(), "Non-trading day, skipping cycle");
            return Ok(IterationOutcome::Skipped { date: today });
        }

        let reference_date = self.reference_date.unwrap_or(today);
        let report = self.run_cycle(reference_date, shutdown).await?;
        Ok(IterationOutcome::Cycle(report))
    }

    #[instrument(skip(self, shutdown), fields(topic = %self.topic))]
    async fn run_cycle(
        &self,
        reference_date: NaiveDate,
        shutdown: &CancellationToken,
    ) -> Result<CycleReport, Error> {
        let started = Instant::now();
        info!("Starting collection cycle");

        let collection = self.fetcher.fetch_all(reference_date).await;
        if let FetchOutcome::Truncated { page, error } = &collection.outcome {
            warn!(
                page,
                error = %error,
                collected = collection.len(),
                "Fetch truncated, publishing partial data"
            );
        }

        let mut delivered = 0;
        let mut failed = 0;
        let mut unpublished = 0;
        for (record_index, record) in collection.records.iter().enumerate() {
            if shutdown.is_cancelled() {
                unpublished = collection.len() - record_index;
                info!(
                    record_index,
                    unpublished, "Shutdown requested, leaving remaining records unpublished"
                );
                break;
            }

            let envelope = Envelope::new(&self.endpoint, reference_date, self.clock.now(), record);
            match self.publisher.publish(&self.topic, &envelope).await {
                Ok(report) => {
                    delivered += 1;
                    debug!(
                        record_index,
                        partition = report.partition,
                        offset = report.offset,
                        "Record delivered"
                    );
                },
                Err(e) if e.is_recoverable() => {
                    failed += 1;
                    warn!(record_index, error = %e, "Publish failed, dropping record");
                },
                Err(e) => {
                    error!(record_index, delivered, error = %e, "Publisher cannot continue");
                    return Err(e.into());
                },
            }
        }

        let report = CycleReport {
            reference_date,
            requests: collection.requests,
            fetched: collection.len(),
            delivered,
            failed,
            unpublished,
            truncated: collection.is_truncated(),
            elapsed: started.elapsed(),
        };

        info!(
            requests = report.requests,
            fetched = report.fetched,
            delivered = report.delivered,
            failed = report.failed,
            unpublished = report.unpublished,
            truncated = report.truncated,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Collection cycle finished"
        );

        Ok(report)
    }

    /// Pause before the next iteration
    pub fn next_delay(&self, outcome: &IterationOutcome) -> Duration {
        match (outcome, self.cadence) {
            (IterationOutcome::Cycle(report), Cadence::Anchored) => {
                self.interval.saturating_sub(report.elapsed)
            },
            _ => self.interval,
        }
    }

    /// Loop until `shutdown` is cancelled, or for a single iteration when
    /// `once` is set. Cancellation mid-cycle ends the cycle after the send in
    /// flight.
    pub async fn run(&self, shutdown: &CancellationToken, once: bool) -> Result<RunSummary, Error> {
        let mut summary = RunSummary::default();

        while !shutdown.is_cancelled() {
            let outcome = self.run_iteration(shutdown).await?;
            summary.record(&outcome);

            if once {
                break;
            }

            let delay = self.next_delay(&outcome);
            info!(sleep_secs = delay.as_secs(), cadence = %self.cadence, "Waiting for next cycle");

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, stopping scheduler");
                    break;
                },
                _ = tokio::time::sleep(delay) => {},
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn kst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    #[test]
    fn test_weekends_are_not_trading_days() {
        // 2025-04-05 is a Saturday
        let saturday = NaiveDate::from_ymd_opt(2025, 4, 5).unwrap();

        assert!(!is_trading_day(saturday));
        assert!(!is_trading_day(saturday.succ_opt().unwrap()));
        assert!(is_trading_day(NaiveDate::from_ymd_opt(2025, 4, 7).unwrap()));
        assert!(is_trading_day(NaiveDate::from_ymd_opt(2025, 4, 11).unwrap()));
    }

    #[test]
    fn test_today_follows_market_offset() {
        // Sunday 20:00 UTC is already Monday in Seoul
        let instant = Utc.with_ymd_and_hms(2025, 4, 6, 20, 0, 0).unwrap();
        let clock = FixedClock(instant.with_timezone(&kst()));

        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2025, 4, 7).unwrap());
        assert!(is_trading_day(clock.today()));
    }

    #[test]
    fn test_summary_counts() {
        let date = NaiveDate::from_ymd_opt(2025, 4, 7).unwrap();
        let mut summary = RunSummary::default();

        summary.record(&IterationOutcome::Skipped { date });
        summary.record(&IterationOutcome::Cycle(CycleReport {
            reference_date: date,
            requests: 3,
            fetched: 5,
            delivered: 4,
            failed: 1,
            unpublished: 0,
            truncated: true,
            elapsed: Duration::from_secs(2),
        }));

        assert_eq!(
            summary,
            RunSummary {
                iterations: 2,
                skipped: 1,
                cycles: 1,
                delivered: 4,
                failed: 1,
                unpublished: 0,
                truncated_cycles: 1,
            }
        );
    }
}
