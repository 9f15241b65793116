//! Configuration loaded from the real process environment

use serial_test::serial;
use std::env;

use stockfeed_producer::config::{Cadence, Config};
use stockfeed_producer::error::ConfigError;

const VARS: &[&str] = &[
    "STOCK_API_KEY",
    "KAFKA_BOOTSTRAP_SERVERS",
    "KAFKA_TOPIC",
    "COLLECTION_INTERVAL",
    "COLLECTION_CADENCE",
    "STOCK_REFERENCE_DATE",
];

fn clear() {
    for var in VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_from_env_reads_process_environment() {
    clear();
    env::set_var("STOCK_API_KEY", "\"abc123\"");
    env::set_var("KAFKA_BOOTSTRAP_SERVERS", "broker-a:9092, broker-b:9092");
    env::set_var("KAFKA_TOPIC", "stock-data-test");
    env::set_var("COLLECTION_INTERVAL", "600");
    env::set_var("COLLECTION_CADENCE", "anchored");
    env::set_var("STOCK_REFERENCE_DATE", "2025-04-07");

    let config = Config::from_env();
    clear();

    let config = config.unwrap();
    assert_eq!(config.source.credential.expose(), "abc123");
    assert_eq!(config.broker.bootstrap_list(), "broker-a:9092,broker-b:9092");
    assert_eq!(config.broker.topic, "stock-data-test");
    assert_eq!(config.schedule.interval_secs, 600);
    assert_eq!(config.schedule.cadence, Cadence::Anchored);
    assert_eq!(
        config.schedule.reference_date.map(|d| d.to_string()).as_deref(),
        Some("2025-04-07")
    );
}

#[test]
#[serial]
fn test_from_env_without_credential_fails() {
    clear();

    let result = Config::from_env();

    assert!(matches!(result, Err(ConfigError::MissingCredential)));
}
