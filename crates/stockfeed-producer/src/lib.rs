//! Stockfeed Producer Library
//!
//! Collects daily securities price records from the public stock price
//! service and republishes each one, wrapped in a retrieval envelope, to a
//! Kafka topic.
//!
//! # Components
//!
//! - **Fetcher**: paginated retrieval of every record for one reference date
//! - **Publisher**: per-record delivery with broker confirmation
//! - **Scheduler**: daily cadence with weekend skips
//! - **Lifecycle**: startup validation, connection, and guaranteed teardown
//!
//! # Example
//!
//! ```no_run
//! use stockfeed_producer::config::Config;
//! use stockfeed_producer::lifecycle;
//! use stockfeed_producer::publisher::{JsonSerializer, KafkaPublisher};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let summary = lifecycle::run(
//!         &config,
//!         |broker, shutdown| async move {
//!             KafkaPublisher::connect(&broker, JsonSerializer, &shutdown).await
//!         },
//!         CancellationToken::new(),
//!         true,
//!     )
//!     .await?;
//!     println!("delivered {} records", summary.delivered);
//!     Ok(())
//! }
//! ```
#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod error;
pub mod fetcher;
pub mod lifecycle;
pub mod publisher;
pub mod scheduler;

pub use config::Config;
pub use error::{Error, Result};
