//! Wire types shared between the producer and downstream consumers

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, StockfeedError};

/// Literal identifying this producer in every published envelope.
pub const ENVELOPE_SOURCE: &str = "stock_price_api";

/// Compact date form expected by the price source (`basDt`).
const BASIC_DATE_FORMAT: &str = "%Y%m%d";

/// Extended date form used in envelopes and configuration.
const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// Raw Records
// ============================================================================

/// One security's price record for one date, exactly as the source returned it.
///
/// The producer never interprets the fields; the record is passed through to
/// the broker as a nested JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(Map<String, Value>);

impl RawRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Wrap a JSON value, returning `None` unless it is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Render a scalar field as text, e.g. for use as a message key.
    ///
    /// Strings are returned verbatim, numbers and booleans in their JSON form.
    /// Missing fields, nulls, arrays and objects yield `None`.
    pub fn field_as_text(&self, field: &str) -> Option<String> {
        match self.0.get(field)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for RawRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// A raw record wrapped with its retrieval provenance.
///
/// Envelopes borrow the record they wrap and live only for the duration of a
/// single publish call.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<'a> {
    /// Always [`ENVELOPE_SOURCE`]
    pub source: &'static str,

    /// Source endpoint the record was retrieved from
    pub api_endpoint: &'a str,

    /// Reference date of the owning cycle, serialized as `YYYY-MM-DD`
    pub search_date: NaiveDate,

    /// Publish-time timestamp, serialized as RFC 3339
    pub retrieved_at: DateTime<FixedOffset>,

    /// The record itself
    pub data: &'a RawRecord,
}

impl<'a> Envelope<'a> {
    pub fn new(
        api_endpoint: &'a str,
        search_date: NaiveDate,
        retrieved_at: DateTime<FixedOffset>,
        data: &'a RawRecord,
    ) -> Self {
        Self {
            source: ENVELOPE_SOURCE,
            api_endpoint,
            search_date,
            retrieved_at,
            data,
        }
    }

    /// Message key derived from a field of the wrapped record
    pub fn key(&self, field: &str) -> Option<String> {
        self.data.field_as_text(field)
    }
}

// ============================================================================
// Page Requests
// ============================================================================

/// Parameters of one paginated request to the price source.
///
/// Created per HTTP call. Within a cycle the page number grows by exactly one
/// per request and the page size never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub reference_date: NaiveDate,
    pub page_number: u32,
    pub page_size: u32,
}

impl PageRequest {
    /// The first page of a cycle
    pub fn first(reference_date: NaiveDate, page_size: u32) -> Result<Self> {
        if page_size == 0 {
            return Err(StockfeedError::InvalidPage(
                "page size must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            reference_date,
            page_number: 1,
            page_size,
        })
    }

    /// The request that follows this one
    pub fn next(&self) -> Self {
        Self {
            page_number: self.page_number.saturating_add(1),
            ..*self
        }
    }

    /// Reference date in the source's `YYYYMMDD` form
    pub fn basic_date(&self) -> String {
        format_basic_date(self.reference_date)
    }
}

// ============================================================================
// Date Helpers
// ============================================================================

/// Format a date as `YYYYMMDD`
pub fn format_basic_date(date: NaiveDate) -> String {
    date.format(BASIC_DATE_FORMAT).to_string()
}

/// Parse a reference date given as `YYYYMMDD` or `YYYY-MM-DD`
pub fn parse_reference_date(value: &str) -> Result<NaiveDate> {
    let trimmed = value.trim();
    let format = if trimmed.contains('-') {
        ISO_DATE_FORMAT
    } else {
        BASIC_DATE_FORMAT
    };

    NaiveDate::parse_from_str(trimmed, format).map_err(|_| StockfeedError::InvalidDate {
        value: value.to_string(),
    })
}
