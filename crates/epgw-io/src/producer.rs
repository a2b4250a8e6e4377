//! The outbound publisher seam and its Kafka implementation.
//!
//! The pipeline and the DLQ funnel publish through the [`Publisher`] trait so
//! they can be exercised against in-memory fakes; the production
//! implementation wraps one shared, thread-safe `FutureProducer` configured
//! for idempotent delivery: `acks=all`, idempotence on, a single in-flight
//! request per connection, byte-array values and string keys.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use epgw_core::config::KafkaConfig;
use epgw_core::envelope::HeaderMap;
use epgw_core::error::GatewayError;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use tracing::debug;

/// Abstract outbound sink for pipeline and DLQ produces.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        key: Option<&str>,
        headers: &HeaderMap,
        payload: &[u8],
    ) -> Result<(), GatewayError>;
}

/// Kafka-backed publisher shared by all workers.
pub struct KafkaPublisher {
    inner: FutureProducer,
    queue_timeout: Duration,
}

impl KafkaPublisher {
    pub fn new(kafka: &KafkaConfig, timeout_ms: u64) -> anyhow::Result<Self> {
        let inner: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &kafka.brokers)
            .set("client.id", &kafka.client_id)
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .set("max.in.flight.requests.per.connection", "1")
            .set("message.timeout.ms", timeout_ms.to_string())
            .create()
            .context("failed to create Kafka producer")?;
        Ok(Self {
            inner,
            queue_timeout: Duration::from_millis(timeout_ms),
        })
    }
}

#[async_trait]
impl Publisher for KafkaPublisher {
    async fn publish(
        &self,
        topic: &str,
        key: Option<&str>,
        headers: &HeaderMap,
        payload: &[u8],
    ) -> Result<(), GatewayError> {
        let mut kafka_headers = OwnedHeaders::new();
        for (name, value) in headers.iter() {
            kafka_headers = kafka_headers.insert(Header {
                key: name,
                value: Some(value),
            });
        }

        let record: FutureRecord<'_, str, [u8]> = FutureRecord::to(topic)
            .payload(payload)
            .headers(kafka_headers);
        let record = match key {
            Some(key) => record.key(key),
            None => record,
        };

        match self.inner.send(record, self.queue_timeout).await {
            Ok((partition, offset)) => {
                debug!(topic, partition, offset, "produced message");
                Ok(())
            }
            Err((err, _)) => Err(GatewayError::Produce(err.to_string())),
        }
    }
}
