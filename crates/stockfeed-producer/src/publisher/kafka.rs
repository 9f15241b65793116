//! Kafka publisher built on a single rdkafka `FutureProducer`
//!
//! The producer is configured for full-ISR acknowledgement and one in-flight
//! request per connection, so confirmations arrive in submission order.
//! Metadata requests, flush and close are blocking librdkafka calls and run on
//! the blocking pool.

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::{DeliveryReport, EnvelopeSerializer, JsonSerializer, Publisher};
use crate::config::BrokerConfig;
use crate::error::{LifecycleError, PublishError};
use stockfeed_common::types::Envelope;

/// Pause before connection attempt `n + 1` is `n` times this step
pub const CONNECT_BACKOFF_STEP: Duration = Duration::from_secs(5);

/// Publisher over one Kafka producer connection
pub struct KafkaPublisher<Z = JsonSerializer> {
    producer: Mutex<Option<FutureProducer>>,
    serializer: Z,
    delivery_timeout: Duration,
    key_field: Option<String>,
}

/// Producer client settings for a broker configuration
pub fn client_config(config: &BrokerConfig) -> ClientConfig {
    let message_timeout_ms = config.delivery_timeout().as_millis().to_string();

    let mut client = ClientConfig::new();
    client
        .set("bootstrap.servers", config.bootstrap_list())
        .set("client.id", &config.client_id)
        .set("acks", "all")
        .set("retries", config.retries.to_string())
        .set("max.in.flight.requests.per.connection", "1")
        .set("message.timeout.ms", message_timeout_ms);
    client
}

impl<Z: EnvelopeSerializer> KafkaPublisher<Z> {
    /// Create the producer and prove the brokers are reachable.
    ///
    /// Each attempt is a metadata request bounded by the connect timeout.
    /// Attempts are separated by a linearly growing pause, which `shutdown`
    /// cuts short with [`LifecycleError::Interrupted`].
    #[instrument(skip_all, fields(brokers = %config.bootstrap_list()))]
    pub async fn connect(
        config: &BrokerConfig,
        serializer: Z,
        shutdown: &CancellationToken,
    ) -> Result<Self, LifecycleError> {
        let producer: FutureProducer = client_config(config)
            .create()
            .map_err(LifecycleError::Client)?;

        let attempts = config.connect_attempts.max(1);
        let metadata_timeout = config.connect_timeout();

        let mut attempt = 1;
        loop {
            let client = producer.clone();
            let result = tokio::task::spawn_blocking(move || {
                client
                    .client()
                    .fetch_metadata(None, metadata_timeout)
                    .map(|metadata| metadata.brokers().len())
            })
            .await?;

            match result {
                Ok(broker_count) => {
                    info!(attempt, broker_count, "Connected to Kafka");
                    return Ok(Self {
                        producer: Mutex::new(Some(producer)),
                        serializer,
                        delivery_timeout: config.delivery_timeout(),
                        key_field: config.message_key_field.clone(),
                    });
                },
                Err(e) if attempt < attempts => {
                    let backoff = CONNECT_BACKOFF_STEP * attempt;
                    warn!(
                        attempt,
                        attempts,
                        error = %e,
                        backoff_secs = backoff.as_secs(),
                        "Kafka not reachable, retrying"
                    );
                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            info!(attempt, "Shutdown requested while connecting");
                            return Err(LifecycleError::Interrupted);
                        },
                        _ = tokio::time::sleep(backoff) => {},
                    }
                    attempt += 1;
                },
                Err(e) => {
                    return Err(LifecycleError::Connect {
                        brokers: config.bootstrap_list(),
                        attempts,
                        source: e,
                    })
                },
            }
        }
    }

    async fn producer(&self) -> Option<FutureProducer> {
        self.producer.lock().await.clone()
    }
}

#[async_trait]
impl<Z: EnvelopeSerializer> Publisher for KafkaPublisher<Z> {
    async fn publish(
        &self,
        topic: &str,
        envelope: &Envelope<'_>,
    ) -> Result<DeliveryReport, PublishError> {
        let producer = self.producer().await.ok_or(PublishError::Closed)?;
        let payload = self.serializer.serialize(envelope)?;
        let key = self
            .key_field
            .as_deref()
            .and_then(|field| envelope.key(field));

        let mut record: FutureRecord<'_, str, [u8]> =
            FutureRecord::to(topic).payload(payload.as_slice());
        if let Some(key) = key.as_deref() {
            record = record.key(key);
        }

        let delivery = producer.send(record, Timeout::After(self.delivery_timeout));
        match tokio::time::timeout(self.delivery_timeout, delivery).await {
            Ok(Ok((partition, offset))) => {
                debug!(topic, partition, offset, key = ?key, "Delivered");
                Ok(DeliveryReport { partition, offset })
            },
            Ok(Err((error, _message))) => Err(PublishError::from_kafka(error)),
            Err(_) => Err(PublishError::Timeout(self.delivery_timeout)),
        }
    }

    async fn flush(&self, timeout: Duration) -> Result<(), LifecycleError> {
        let Some(producer) = self.producer().await else {
            return Ok(());
        };

        info!(timeout_secs = timeout.as_secs(), "Flushing Kafka producer");
        let flushed = tokio::time::timeout(
            timeout,
            tokio::task::spawn_blocking(move || producer.flush(timeout)),
        )
        .await
        .map_err(|_| LifecycleError::Timeout {
            operation: "flush",
            timeout,
        })??;

        flushed.map_err(LifecycleError::Flush)
    }

    async fn close(&self, timeout: Duration) -> Result<(), LifecycleError> {
        let Some(producer) = self.producer.lock().await.take() else {
            return Ok(());
        };

        info!("Closing Kafka producer");
        tokio::time::timeout(timeout, tokio::task::spawn_blocking(move || drop(producer)))
            .await
            .map_err(|_| LifecycleError::Timeout {
                operation: "close",
                timeout,
            })??;

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    /// Nothing listens on port 1, so every metadata request fails
    fn unreachable_broker(connect_attempts: u32) -> BrokerConfig {
        BrokerConfig {
            bootstrap_servers: vec!["127.0.0.1:1".into()],
            connect_attempts,
            connect_timeout_secs: 1,
            ..BrokerConfig::default()
        }
    }

    #[test]
    fn test_client_config_delivery_guarantees() {
        let config = BrokerConfig {
            bootstrap_servers: vec!["k1:9092".into(), "k2:9093".into()],
            retries: 7,
            delivery_timeout_secs: 12,
            ..BrokerConfig::default()
        };

        let client = client_config(&config);

        assert_eq!(client.get("bootstrap.servers"), Some("k1:9092,k2:9093"));
        assert_eq!(client.get("acks"), Some("all"));
        assert_eq!(client.get("retries"), Some("7"));
        assert_eq!(client.get("max.in.flight.requests.per.connection"), Some("1"));
        assert_eq!(client.get("message.timeout.ms"), Some("12000"));
        assert_eq!(client.get("client.id"), Some("stock-price-producer-rs"));
    }

    #[tokio::test]
    async fn test_connect_gives_up_after_configured_attempts() {
        let started = Instant::now();

        let result = KafkaPublisher::connect(
            &unreachable_broker(2),
            JsonSerializer,
            &CancellationToken::new(),
        )
        .await;

        match result {
            Err(LifecycleError::Connect {
                brokers, attempts, ..
            }) => {
                assert_eq!(brokers, "127.0.0.1:1");
                assert_eq!(attempts, 2);
            },
            Err(other) => panic!("expected Connect error, got {other}"),
            Ok(_) => panic!("connected to a closed port"),
        }
        assert!(started.elapsed() >= CONNECT_BACKOFF_STEP);
    }

    #[tokio::test]
    async fn test_connect_backoff_stops_on_shutdown() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let started = Instant::now();

        let result =
            KafkaPublisher::connect(&unreachable_broker(5), JsonSerializer, &shutdown).await;

        assert!(matches!(result, Err(LifecycleError::Interrupted)));
        assert!(started.elapsed() < CONNECT_BACKOFF_STEP);
    }
}
