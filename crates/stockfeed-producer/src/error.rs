//! Error types for the producer
//!
//! Each stage of the pipeline has its own error kind so callers can tell a
//! fatal startup problem from a recoverable per-page or per-record failure
//! without looking at message text.

use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use std::time::Duration;
use thiserror::Error;

/// Result type alias for producer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level producer error
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl Error {
    /// Whether this error must stop the process
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Config(_) | Error::Lifecycle(_) => true,
            Error::Fetch(_) => false,
            Error::Publish(e) => !e.is_recoverable(),
        }
    }
}

/// Invalid or missing configuration, detected before the loop starts
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("STOCK_API_KEY is not set. The producer cannot start without a source credential.")]
    MissingCredential,

    #[error("{key} cannot be empty")]
    Empty { key: &'static str },

    #[error("Invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(key: &'static str, value: impl Into<String>, reason: impl ToString) -> Self {
        ConfigError::Invalid {
            key,
            value: value.into(),
            reason: reason.to_string(),
        }
    }
}

/// Failure retrieving one page from the price source
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Source returned HTTP {status}")]
    Status { status: reqwest::StatusCode },

    #[error("Source reported error {code}: {message}")]
    Api { code: String, message: String },

    #[error("Response is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Unexpected response shape: {0}")]
    Malformed(String),

    #[error(transparent)]
    Request(#[from] stockfeed_common::StockfeedError),
}

/// Failure delivering one envelope to the broker
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Failed to serialize envelope: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Broker rejected message: {0}")]
    Delivery(KafkaError),

    #[error("No delivery confirmation within {0:?}")]
    Timeout(Duration),

    #[error("Producer is in a fatal state: {0}")]
    Fatal(KafkaError),

    #[error("Publisher is closed")]
    Closed,
}

impl PublishError {
    /// Classify a broker error from a failed delivery
    pub fn from_kafka(error: KafkaError) -> Self {
        match error.rdkafka_error_code() {
            Some(RDKafkaErrorCode::Fatal) | Some(RDKafkaErrorCode::Fenced) => {
                PublishError::Fatal(error)
            },
            _ => PublishError::Delivery(error),
        }
    }

    /// Whether the caller may drop the record and move on
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, PublishError::Fatal(_) | PublishError::Closed)
    }
}

/// Failure managing the broker connection or the run itself
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Failed to create broker client: {0}")]
    Client(KafkaError),

    #[error("Could not reach brokers {brokers} after {attempts} attempts: {source}")]
    Connect {
        brokers: String,
        attempts: u32,
        #[source]
        source: KafkaError,
    },

    #[error("Flush failed: {0}")]
    Flush(KafkaError),

    #[error("{operation} did not finish within {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("Blocking broker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Collection loop aborted: {0}")]
    Aborted(String),

    #[error("Shutdown requested before the producer started")]
    Interrupted,
}
