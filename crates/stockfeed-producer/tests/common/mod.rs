//! Shared fakes for producer integration tests
//!
//! - [`ScriptedSource`]: replays page results in order and records every request
//! - [`RecordingPublisher`]: stores published envelopes as JSON and logs
//!   flush/close calls, optionally failing chosen publishes or cancelling a
//!   shutdown token once a chosen publish has been delivered

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use stockfeed_common::types::{Envelope, PageRequest, RawRecord};
use stockfeed_producer::error::{FetchError, LifecycleError, PublishError};
use stockfeed_producer::fetcher::PageSource;
use stockfeed_producer::publisher::{DeliveryReport, Publisher};

pub type PageResult = Result<Vec<RawRecord>, FetchError>;

pub struct ScriptedSource {
    pages: Mutex<VecDeque<PageResult>>,
    requests: Mutex<Vec<PageRequest>>,
}

impl ScriptedSource {
    pub fn new(pages: Vec<PageResult>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<PageRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageSource for ScriptedSource {
    async fn fetch_page(&self, request: &PageRequest) -> PageResult {
        self.requests.lock().unwrap().push(*request);
        self.pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<Value>>,
    calls: Mutex<Vec<&'static str>>,
    failures: Mutex<HashMap<usize, PublishError>>,
    cancel_after: Mutex<Option<(usize, CancellationToken)>>,
}

impl RecordingPublisher {
    /// Fail the publish call with the given zero-based index
    pub fn fail_on(self, index: usize, error: PublishError) -> Self {
        self.failures.lock().unwrap().insert(index, error);
        self
    }

    /// Cancel `shutdown` when the publish call with the given index returns
    pub fn cancel_after(self, index: usize, shutdown: CancellationToken) -> Self {
        *self.cancel_after.lock().unwrap() = Some((index, shutdown));
        self
    }

    pub fn published(&self) -> Vec<Value> {
        self.published.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn lifecycle_calls(&self) -> Vec<&'static str> {
        self.calls()
            .into_iter()
            .filter(|call| *call != "publish")
            .collect()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(
        &self,
        _topic: &str,
        envelope: &Envelope<'_>,
    ) -> Result<DeliveryReport, PublishError> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push("publish");
            calls.iter().filter(|call| **call == "publish").count() - 1
        };

        if let Some((at, shutdown)) = self.cancel_after.lock().unwrap().as_ref() {
            if *at == index {
                shutdown.cancel();
            }
        }

        if let Some(error) = self.failures.lock().unwrap().remove(&index) {
            return Err(error);
        }

        let mut published = self.published.lock().unwrap();
        published.push(serde_json::to_value(envelope).unwrap());
        Ok(DeliveryReport {
            partition: 0,
            offset: published.len() as i64 - 1,
        })
    }

    async fn flush(&self, _timeout: Duration) -> Result<(), LifecycleError> {
        self.calls.lock().unwrap().push("flush");
        Ok(())
    }

    async fn close(&self, _timeout: Duration) -> Result<(), LifecycleError> {
        self.calls.lock().unwrap().push("close");
        Ok(())
    }
}

/// `len` records numbered from `start`, shaped like price service items
pub fn page(start: usize, len: usize) -> Vec<RawRecord> {
    (start..start + len)
        .map(|i| {
            RawRecord::from_value(json!({
                "srtnCd": format!("{:06}", i),
                "itmsNm": format!("종목{}", i),
                "clpr": (1000 + i).to_string(),
            }))
            .unwrap()
        })
        .collect()
}

pub fn kst() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).unwrap()
}

/// 10:00 in Seoul on the given day
pub fn kst_morning(year: i32, month: u32, day: u32) -> DateTime<FixedOffset> {
    kst().with_ymd_and_hms(year, month, day, 10, 0, 0).unwrap()
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}
