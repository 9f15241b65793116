//! Paginated retrieval of one reference date's price records
//!
//! [`Fetcher::fetch_all`] walks pages 1, 2, 3, ... of a [`PageSource`] until a
//! page comes back empty. A failed page ends the walk early: the records
//! gathered so far are still returned, and the failure is reported through
//! [`FetchOutcome::Truncated`] rather than as an error.

pub mod http;

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument};

use crate::config::SourceConfig;
use crate::error::FetchError;
use stockfeed_common::types::{PageRequest, RawRecord};

pub use http::HttpPageSource;

/// A source of paginated price records
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch one page. An empty page means there is no more data.
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<RawRecord>, FetchError>;
}

#[async_trait]
impl<T: PageSource + ?Sized> PageSource for Arc<T> {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<RawRecord>, FetchError> {
        (**self).fetch_page(request).await
    }
}

/// How a fetch cycle ended
#[derive(Debug)]
pub enum FetchOutcome {
    /// An empty page was reached
    Complete,
    /// A request failed; records from earlier pages were kept
    Truncated { page: u32, error: FetchError },
}

/// Records gathered by one fetch cycle, in request order
#[derive(Debug)]
pub struct CollectionResult {
    pub records: Vec<RawRecord>,
    /// Number of page requests issued, including the last empty or failed one
    pub requests: u32,
    pub outcome: FetchOutcome,
}

impl CollectionResult {
    pub fn is_complete(&self) -> bool {
        matches!(self.outcome, FetchOutcome::Complete)
    }

    pub fn is_truncated(&self) -> bool {
        !self.is_complete()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Walks a [`PageSource`] one page at a time
pub struct Fetcher<S> {
    source: S,
    page_size: u32,
    page_delay: Duration,
}

impl<S: PageSource> Fetcher<S> {
    pub fn new(source: S, page_size: u32, page_delay: Duration) -> Self {
        Self {
            source,
            page_size,
            page_delay,
        }
    }

    pub fn from_config(source: S, config: &SourceConfig) -> Self {
        Self::new(source, config.page_size, config.page_delay())
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Retrieve every record for `reference_date`.
    ///
    /// Never fails: a request error stops pagination and is returned in the
    /// result's outcome together with whatever was collected before it.
    #[instrument(skip(self), fields(reference_date = %reference_date, page_size = self.page_size))]
    pub async fn fetch_all(&self, reference_date: NaiveDate) -> CollectionResult {
        let mut records = Vec::new();
        let mut requests = 0u32;

        let mut request = match PageRequest::first(reference_date, self.page_size) {
            Ok(request) => request,
            Err(e) => {
                error!(error = %e, "Cannot build page request");
                return CollectionResult {
                    records,
                    requests,
                    outcome: FetchOutcome::Truncated {
                        page: 1,
                        error: e.into(),
                    },
                };
            },
        };

        loop {
            if requests > 0 && !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }

            requests += 1;
            let page = request.page_number;
            info!(page, "Requesting page");

            match self.source.fetch_page(&request).await {
                Ok(items) if items.is_empty() => {
                    info!(page, total = records.len(), "No more data");
                    return CollectionResult {
                        records,
                        requests,
                        outcome: FetchOutcome::Complete,
                    };
                },
                Ok(items) => {
                    info!(page, count = items.len(), "Collected page");
                    records.extend(items);
                    request = request.next();
                },
                Err(error) => {
                    error!(
                        page,
                        collected = records.len(),
                        error = %error,
                        "Page request failed, keeping records collected so far"
                    );
                    return CollectionResult {
                        records,
                        requests,
                        outcome: FetchOutcome::Truncated { page, error },
                    };
                },
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a fixed list of page results and records what was asked for
    struct Scripted {
        pages: Mutex<VecDeque<Result<Vec<RawRecord>, FetchError>>>,
        seen: Mutex<Vec<PageRequest>>,
    }

    impl Scripted {
        fn new(pages: Vec<Result<Vec<RawRecord>, FetchError>>) -> Self {
            Self {
                pages: Mutex::new(pages.into()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PageSource for Scripted {
        async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<RawRecord>, FetchError> {
            self.seen.lock().unwrap().push(*request);
            self.pages.lock().unwrap().pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn page(start: usize, len: usize) -> Vec<RawRecord> {
        (start..start + len)
            .map(|i| RawRecord::from_value(json!({ "seq": i })).unwrap())
            .collect()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 7).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_only_between_requests() {
        let fetcher = Fetcher::new(
            Scripted::new(vec![Ok(page(0, 2)), Ok(page(2, 2)), Ok(vec![])]),
            2,
            Duration::from_millis(300),
        );

        let started = tokio::time::Instant::now();
        let result = fetcher.fetch_all(date()).await;

        assert!(result.is_complete());
        assert_eq!(result.requests, 3);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(600));
        assert!(elapsed < Duration::from_millis(900));
    }

    #[tokio::test]
    async fn test_page_numbers_increase_by_one() {
        let fetcher = Fetcher::new(
            Scripted::new(vec![Ok(page(0, 3)), Ok(page(3, 3)), Ok(page(6, 1)), Ok(vec![])]),
            3,
            Duration::ZERO,
        );

        let result = fetcher.fetch_all(date()).await;

        let seen = fetcher.source().seen.lock().unwrap().clone();
        let numbers: Vec<u32> = seen.iter().map(|r| r.page_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        assert!(seen.iter().all(|r| r.page_size == 3 && r.reference_date == date()));
        assert_eq!(result.len(), 7);
    }

    #[tokio::test]
    async fn test_first_page_failure_is_empty_and_truncated() {
        let fetcher = Fetcher::new(
            Scripted::new(vec![Err(FetchError::Malformed("not json".into()))]),
            100,
            Duration::ZERO,
        );

        let result = fetcher.fetch_all(date()).await;

        assert!(result.is_empty());
        assert_eq!(result.requests, 1);
        assert!(matches!(
            result.outcome,
            FetchOutcome::Truncated { page: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_zero_page_size_issues_no_requests() {
        let fetcher = Fetcher::new(Scripted::new(vec![]), 0, Duration::ZERO);

        let result = fetcher.fetch_all(date()).await;

        assert_eq!(result.requests, 0);
        assert!(result.is_truncated());
        assert!(fetcher.source().seen.lock().unwrap().is_empty());
    }
}
