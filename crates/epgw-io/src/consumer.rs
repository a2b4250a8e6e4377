//! Manual-commit Kafka consumers.
//!
//! One consumer runs per consumer group, subscribed to the union of its
//! operations' input topics. Auto-commit is off; every accepted message
//! carries a per-envelope commit handle that the coordinator fires only after
//! a successful downstream or DLQ produce. Messages whose `messageSchema`
//! header is absent or unrecognized are dropped before they ever reach a
//! worker (their offset is committed immediately, otherwise the partition
//! would stall on restart).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use epgw_core::config::OperationConfig;
use epgw_core::envelope::{CommitHandle, Envelope, EnvelopeState, HeaderMap};
use epgw_core::error::CommitError;
use epgw_core::headers;
use futures::StreamExt;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Headers as KafkaHeaders, Message as KafkaMessage};
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Connection settings for one consumer group.
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub brokers: String,
    pub client_id: String,
    pub group_id: String,
    pub topics: Vec<String>,
}

/// Per-partition high-water marks of committed offsets, shared by all commit
/// handles of one consumer.
type CommitMarks = Arc<Mutex<HashMap<(String, i32), i64>>>;

/// Commit handle bound to one message of one partition.
///
/// Workers finish out of order, so the handle keeps offsets monotonic: a
/// commit for an offset at or below the partition's high-water mark is a
/// no-op, and a successful commit advances the mark. An offset is therefore
/// never moved backwards past an already-committed later offset.
pub struct KafkaCommitHandle {
    consumer: Arc<StreamConsumer>,
    topic: String,
    partition: i32,
    offset: i64,
    marks: CommitMarks,
}

impl CommitHandle for KafkaCommitHandle {
    fn commit(&self) -> Result<(), CommitError> {
        let mut marks = self.marks.lock().unwrap();
        let mark = marks
            .entry((self.topic.clone(), self.partition))
            .or_insert(-1);
        if self.offset <= *mark {
            // A later offset on this partition is already committed.
            return Ok(());
        }
        let mut list = TopicPartitionList::new();
        list.add_partition_offset(&self.topic, self.partition, Offset::Offset(self.offset + 1))
            .map_err(|e| CommitError(e.to_string()))?;
        self.consumer
            .commit(&list, CommitMode::Async)
            .map_err(|e| CommitError(e.to_string()))?;
        *mark = self.offset;
        Ok(())
    }
}

/// Pure acceptance filter: the message must carry a `messageSchema` header
/// matching some enabled operation's canonical name or binary-schema stem.
pub fn accept(header_map: &HeaderMap, operations: &[Arc<OperationConfig>]) -> bool {
    match header_map.get(headers::MESSAGE_SCHEMA) {
        Some(schema) if !schema.is_empty() => operations
            .iter()
            .any(|op| op.enabled && (op.name == schema || op.schema_stem() == schema)),
        _ => false,
    }
}

/// Consume `settings.topics` until cancelled, enqueueing accepted envelopes.
///
/// The queue send blocks while the worker queue is full, which is the
/// backpressure that keeps the consumer from outrunning the workers.
pub async fn run_consumer(
    settings: ConsumerSettings,
    operations: Vec<Arc<OperationConfig>>,
    queue: mpsc::Sender<Envelope>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &settings.brokers)
        .set("client.id", &settings.client_id)
        .set("group.id", &settings.group_id)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        .set("enable.partition.eof", "false")
        .set("session.timeout.ms", "6000")
        .create()
        .context("failed to create Kafka consumer")?;

    let topics: Vec<&str> = settings.topics.iter().map(String::as_str).collect();
    consumer
        .subscribe(&topics)
        .with_context(|| format!("failed to subscribe to {topics:?}"))?;
    info!(group = %settings.group_id, ?topics, "consumer started");

    let consumer = Arc::new(consumer);
    let marks: CommitMarks = Arc::new(Mutex::new(HashMap::new()));
    let mut stream = consumer.stream();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!(group = %settings.group_id, "consumer stopping");
                break;
            }
            next = stream.next() => match next {
                Some(Ok(message)) => {
                    let mut env = envelope_from(&message);
                    let handle = KafkaCommitHandle {
                        consumer: consumer.clone(),
                        topic: env.source_topic.clone(),
                        partition: env.partition,
                        offset: env.offset,
                        marks: marks.clone(),
                    };

                    if !accept(&env.headers, &operations) {
                        debug!(
                            topic = %env.source_topic,
                            offset = env.offset,
                            schema = env.message_schema().unwrap_or("<absent>"),
                            "dropping message with unrecognized schema"
                        );
                        if let Err(err) = handle.commit() {
                            warn!(error = %err, "failed to commit filtered message");
                        }
                        continue;
                    }

                    env.attach_commit(Box::new(handle));
                    env.state = EnvelopeState::Filtered;
                    if queue.send(env).await.is_err() {
                        // Workers are gone; nothing left to feed.
                        break;
                    }
                }
                Some(Err(err)) => {
                    warn!(group = %settings.group_id, error = %err, "kafka error while polling");
                }
                None => break,
            }
        }
    }
    Ok(())
}

/// Capture a borrowed Kafka message into an owned envelope.
fn envelope_from(message: &BorrowedMessage<'_>) -> Envelope {
    let mut header_map = HeaderMap::new();
    if let Some(kafka_headers) = message.headers() {
        for header in kafka_headers.iter() {
            if let Some(value) = header.value {
                if let Ok(value) = std::str::from_utf8(value) {
                    header_map.set(header.key, value);
                }
            }
        }
    }
    let key = message
        .key()
        .and_then(|k| std::str::from_utf8(k).ok())
        .map(str::to_string);

    Envelope::new(
        message.topic(),
        message.partition(),
        message.offset(),
        key,
        message.payload().unwrap_or_default().to_vec(),
        header_map,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operation(name: &str, schema_stem: &str, enabled: bool) -> Arc<OperationConfig> {
        let mut op: OperationConfig = serde_yaml::from_str(&format!("name: {name}")).unwrap();
        op.enabled = enabled;
        op.schema = format!("classpath:schemas/{schema_stem}.avsc");
        Arc::new(op)
    }

    fn header_map(entries: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in entries {
            map.set(k, v);
        }
        map
    }

    #[test]
    fn accepts_known_schema_names() {
        let ops = vec![operation("opA", "SchemaA", true)];
        assert!(accept(&header_map(&[("messageSchema", "opA")]), &ops));
        assert!(accept(&header_map(&[("messageSchema", "SchemaA")]), &ops));
    }

    #[test]
    fn rejects_absent_or_unknown_schema() {
        let ops = vec![operation("opA", "SchemaA", true)];
        assert!(!accept(&header_map(&[]), &ops));
        assert!(!accept(&header_map(&[("messageSchema", "")]), &ops));
        assert!(!accept(&header_map(&[("messageSchema", "Other")]), &ops));
    }

    #[test]
    fn rejects_schemas_of_disabled_operations() {
        let ops = vec![operation("opA", "SchemaA", false)];
        assert!(!accept(&header_map(&[("messageSchema", "opA")]), &ops));
    }

    #[test]
    fn filter_is_case_sensitive() {
        let ops = vec![operation("opA", "SchemaA", true)];
        assert!(!accept(&header_map(&[("messageSchema", "schemaa")]), &ops));
    }
}
