//! Stockfeed Common Library
//!
//! Wire types, error handling, and logging shared by the stockfeed crates.
//!
//! # Overview
//!
//! - **Types**: the raw record passed through from the price source, the
//!   envelope published to the broker, and page request parameters
//! - **Error Handling**: error and result types for the shared types
//! - **Logging**: tracing subscriber setup for every stockfeed binary
//!
//! # Example
//!
//! ```no_run
//! use stockfeed_common::types::{parse_reference_date, Envelope, RawRecord};
//! use chrono::Utc;
//!
//! fn wrap(record: &RawRecord) -> stockfeed_common::Result<String> {
//!     let date = parse_reference_date("20250407")?;
//!     let envelope = Envelope::new("getStockPriceInfo", date, Utc::now().fixed_offset(), record);
//!     Ok(serde_json::to_string(&envelope)?)
//! }
//! ```
#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{Result, StockfeedError};
