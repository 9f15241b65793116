//! Configuration management
//!
//! All settings are read once at startup into an immutable [`Config`] that is
//! handed to each component. Nothing else reads the environment.

use chrono::{FixedOffset, NaiveDate, Offset, Utc};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use stockfeed_common::types::parse_reference_date;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default broker list.
pub const DEFAULT_BOOTSTRAP_SERVERS: &str = "daa-kafka1:9092,daa-kafka2:9093";

/// Default destination topic.
pub const DEFAULT_TOPIC: &str = "stock-data";

/// Default broker client id.
pub const DEFAULT_CLIENT_ID: &str = "stock-price-producer-rs";

/// Default number of transport-level send retries.
pub const DEFAULT_KAFKA_RETRIES: u32 = 3;

/// Default wait for a delivery confirmation in seconds.
pub const DEFAULT_DELIVERY_TIMEOUT_SECS: u64 = 15;

/// Default number of attempts to reach the brokers at startup.
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 5;

/// Default metadata request timeout per connection attempt in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default bound for each of flush and close at shutdown, in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

/// Default base URL of the securities price service.
pub const DEFAULT_API_URL: &str =
    "https://apis.data.go.kr/1160100/service/GetStockSecuritiesInfoService";

/// Default endpoint name on the price service.
pub const DEFAULT_API_ENDPOINT: &str = "getStockPriceInfo";

/// Default number of records requested per page.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Default pause between consecutive page requests in milliseconds.
pub const DEFAULT_PAGE_DELAY_MS: u64 = 300;

/// Default HTTP timeout per page request in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 20;

/// Default collection interval in seconds (one day).
pub const DEFAULT_COLLECTION_INTERVAL_SECS: u64 = 86_400;

/// Default UTC offset of the source market (KST).
pub const DEFAULT_MARKET_UTC_OFFSET_HOURS: i32 = 9;

// ============================================================================
// Secret
// ============================================================================

/// A credential that never appears in `Debug` output or logs
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("Secret(<empty>)")
        } else {
            f.write_str("Secret(***)")
        }
    }
}

// ============================================================================
// Cadence
// ============================================================================

/// How the pause between cycles is computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cadence {
    /// Sleep the full interval after each cycle's work
    #[default]
    FixedDelay,
    /// Sleep whatever remains of the interval measured from the cycle start
    Anchored,
}

impl FromStr for Cadence {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fixed-delay" | "fixed_delay" | "fixed" => Ok(Cadence::FixedDelay),
            "anchored" => Ok(Cadence::Anchored),
            other => Err(format!("expected 'fixed-delay' or 'anchored', got '{}'", other)),
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cadence::FixedDelay => f.write_str("fixed-delay"),
            Cadence::Anchored => f.write_str("anchored"),
        }
    }
}

// ============================================================================
// Configuration Sections
// ============================================================================

/// Producer configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub source: SourceConfig,
    pub broker: BrokerConfig,
    pub schedule: ScheduleConfig,
}

/// Price source (HTTP) configuration
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub base_url: String,
    pub credential: Secret,
    pub endpoint: String,
    pub page_size: u32,
    pub page_delay_ms: u64,
    pub request_timeout_secs: u64,
}

/// Broker configuration
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub bootstrap_servers: Vec<String>,
    pub topic: String,
    pub client_id: String,
    pub retries: u32,
    pub delivery_timeout_secs: u64,
    pub connect_attempts: u32,
    pub connect_timeout_secs: u64,
    pub shutdown_timeout_secs: u64,
    /// Record field whose value becomes the message key
    pub message_key_field: Option<String>,
}

/// Collection cadence configuration
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub interval_secs: u64,
    pub cadence: Cadence,
    /// Zone in which "today" and its weekday are evaluated
    pub utc_offset: FixedOffset,
    /// Collect this date every cycle instead of today
    pub reference_date: Option<NaiveDate>,
}

impl Config {
    /// Load configuration from an optional `.env` file and the environment
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build and validate configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let source = SourceConfig {
            base_url: lookup("STOCK_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            credential: Secret::new(normalize_credential(
                &lookup("STOCK_API_KEY").unwrap_or_default(),
            )),
            endpoint: lookup("API_ENDPOINT").unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string()),
            page_size: parse_or(&lookup, "STOCK_PAGE_SIZE", DEFAULT_PAGE_SIZE)?,
            page_delay_ms: parse_or(&lookup, "STOCK_PAGE_DELAY_MS", DEFAULT_PAGE_DELAY_MS)?,
            request_timeout_secs: parse_or(
                &lookup,
                "STOCK_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?,
        };

        let broker = BrokerConfig {
            bootstrap_servers: split_servers(
                &lookup("KAFKA_BOOTSTRAP_SERVERS")
                    .unwrap_or_else(|| DEFAULT_BOOTSTRAP_SERVERS.to_string()),
            ),
            topic: lookup("KAFKA_TOPIC").unwrap_or_else(|| DEFAULT_TOPIC.to_string()),
            client_id: lookup("KAFKA_CLIENT_ID").unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
            retries: parse_or(&lookup, "KAFKA_RETRIES", DEFAULT_KAFKA_RETRIES)?,
            delivery_timeout_secs: parse_or(
                &lookup,
                "KAFKA_DELIVERY_TIMEOUT_SECS",
                DEFAULT_DELIVERY_TIMEOUT_SECS,
            )?,
            connect_attempts: parse_or(&lookup, "KAFKA_CONNECT_ATTEMPTS", DEFAULT_CONNECT_ATTEMPTS)?,
            connect_timeout_secs: parse_or(
                &lookup,
                "KAFKA_CONNECT_TIMEOUT_SECS",
                DEFAULT_CONNECT_TIMEOUT_SECS,
            )?,
            shutdown_timeout_secs: parse_or(
                &lookup,
                "KAFKA_SHUTDOWN_TIMEOUT_SECS",
                DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            )?,
            message_key_field: lookup("KAFKA_MESSAGE_KEY_FIELD")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        };

        let offset_hours: i32 = parse_or(
            &lookup,
            "MARKET_UTC_OFFSET_HOURS",
            DEFAULT_MARKET_UTC_OFFSET_HOURS,
        )?;
        let utc_offset = offset_from_hours(offset_hours).ok_or_else(|| {
            ConfigError::invalid(
                "MARKET_UTC_OFFSET_HOURS",
                offset_hours.to_string(),
                "must be between -23 and 23",
            )
        })?;

        let reference_date = match lookup("STOCK_REFERENCE_DATE").filter(|s| !s.trim().is_empty())
        {
            Some(raw) => Some(
                parse_reference_date(&raw)
                    .map_err(|e| ConfigError::invalid("STOCK_REFERENCE_DATE", raw.clone(), e))?,
            ),
            None => None,
        };

        let schedule = ScheduleConfig {
            interval_secs: parse_or(
                &lookup,
                "COLLECTION_INTERVAL",
                DEFAULT_COLLECTION_INTERVAL_SECS,
            )?,
            cadence: match lookup("COLLECTION_CADENCE") {
                Some(raw) => raw
                    .parse()
                    .map_err(|reason: String| ConfigError::invalid("COLLECTION_CADENCE", raw, reason))?,
                None => Cadence::default(),
            },
            utc_offset,
            reference_date,
        };

        let config = Config {
            source,
            broker,
            schedule,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.source.validate()?;
        self.broker.validate()?;
        self.schedule.validate()?;
        Ok(())
    }
}

impl SourceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.credential.is_empty() {
            return Err(ConfigError::MissingCredential);
        }
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Empty { key: "STOCK_API_URL" });
        }
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::Empty { key: "API_ENDPOINT" });
        }
        if self.page_size == 0 {
            return Err(ConfigError::invalid("STOCK_PAGE_SIZE", "0", "must be greater than 0"));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "STOCK_REQUEST_TIMEOUT_SECS",
                "0",
                "must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Full URL of the configured endpoint
    pub fn endpoint_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.endpoint.trim_start_matches('/')
        )
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl BrokerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bootstrap_servers.is_empty() {
            return Err(ConfigError::Empty {
                key: "KAFKA_BOOTSTRAP_SERVERS",
            });
        }
        if self.topic.trim().is_empty() {
            return Err(ConfigError::Empty { key: "KAFKA_TOPIC" });
        }
        if self.delivery_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "KAFKA_DELIVERY_TIMEOUT_SECS",
                "0",
                "must be greater than 0",
            ));
        }
        if self.connect_attempts == 0 {
            return Err(ConfigError::invalid(
                "KAFKA_CONNECT_ATTEMPTS",
                "0",
                "must be greater than 0",
            ));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "KAFKA_CONNECT_TIMEOUT_SECS",
                "0",
                "must be greater than 0",
            ));
        }
        if self.shutdown_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "KAFKA_SHUTDOWN_TIMEOUT_SECS",
                "0",
                "must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Broker list in the comma-separated form the client expects
    pub fn bootstrap_list(&self) -> String {
        self.bootstrap_servers.join(",")
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl ScheduleConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::invalid(
                "COLLECTION_INTERVAL",
                "0",
                "must be greater than 0",
            ));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            credential: Secret::default(),
            endpoint: DEFAULT_API_ENDPOINT.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            page_delay_ms: DEFAULT_PAGE_DELAY_MS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: split_servers(DEFAULT_BOOTSTRAP_SERVERS),
            topic: DEFAULT_TOPIC.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            retries: DEFAULT_KAFKA_RETRIES,
            delivery_timeout_secs: DEFAULT_DELIVERY_TIMEOUT_SECS,
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            message_key_field: None,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_COLLECTION_INTERVAL_SECS,
            cadence: Cadence::default(),
            utc_offset: market_offset(DEFAULT_MARKET_UTC_OFFSET_HOURS),
            reference_date: None,
        }
    }
}

/// Strip whitespace and any quotes left around the key by shell or compose files
fn normalize_credential(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '\'' || c == '"')
        .trim()
        .to_string()
}

fn split_servers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn market_offset(hours: i32) -> FixedOffset {
    offset_from_hours(hours).unwrap_or_else(|| Utc.fix())
}

fn offset_from_hours(hours: i32) -> Option<FixedOffset> {
    hours.checked_mul(3600).and_then(FixedOffset::east_opt)
}

fn parse_or<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(key, raw.clone(), e)),
        _ => Ok(default),
    }
}
