//! Delivery of envelopes to the message broker

pub mod kafka;
pub mod serializer;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{LifecycleError, PublishError};
use stockfeed_common::types::Envelope;

pub use kafka::KafkaPublisher;
pub use serializer::{EnvelopeSerializer, JsonSerializer};

/// Position the broker assigned to a confirmed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub partition: i32,
    pub offset: i64,
}

/// A broker connection that publishes one envelope at a time
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Send one envelope and wait for its delivery confirmation
    async fn publish(
        &self,
        topic: &str,
        envelope: &Envelope<'_>,
    ) -> Result<DeliveryReport, PublishError>;

    /// Wait up to `timeout` for buffered messages to be delivered
    async fn flush(&self, timeout: Duration) -> Result<(), LifecycleError>;

    /// Release the connection. Later publishes fail with [`PublishError::Closed`].
    async fn close(&self, timeout: Duration) -> Result<(), LifecycleError>;
}

#[async_trait]
impl<T: Publisher + ?Sized> Publisher for Arc<T> {
    async fn publish(
        &self,
        topic: &str,
        envelope: &Envelope<'_>,
    ) -> Result<DeliveryReport, PublishError> {
        (**self).publish(topic, envelope).await
    }

    async fn flush(&self, timeout: Duration) -> Result<(), LifecycleError> {
        (**self).flush(timeout).await
    }

    async fn close(&self, timeout: Duration) -> Result<(), LifecycleError> {
        (**self).close(timeout).await
    }
}
