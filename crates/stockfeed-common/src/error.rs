//! Error types for the shared stockfeed types

use thiserror::Error;

/// Result type alias for stockfeed-common operations
pub type Result<T> = std::result::Result<T, StockfeedError>;

/// Errors raised while handling shared wire types
#[derive(Error, Debug)]
pub enum StockfeedError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid reference date '{value}': expected YYYYMMDD or YYYY-MM-DD")]
    InvalidDate { value: String },

    #[error("Invalid page request: {0}")]
    InvalidPage(String),
}
