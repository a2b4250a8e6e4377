//! The per-message envelope: a typed record owned by exactly one worker.
//!
//! The envelope replaces the dynamic property bag some gateways thread between
//! pipeline stages with explicit typed fields. It is created by a consumer on
//! receipt, handed through a bounded queue to a worker, mutated only by that
//! worker, and destroyed once its commit handle has fired (either after a
//! successful downstream produce or after a successful DLQ produce).

use std::fmt;
use std::sync::Arc;

use crate::config::OperationConfig;
use crate::error::CommitError;
use crate::headers;

/// Case-preserving header map.
///
/// Kafka header names are case-sensitive on the wire and the gateway contract
/// requires inbound header case to be preserved onto outbound messages, so
/// entries keep their original spelling and insertion order. Lookups are exact.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact, case-sensitive lookup.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Replace the value of an existing entry or append a new one.
    pub fn set(&mut self, name: &str, value: &str) {
        match self.entries.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value.to_string(),
            None => self.entries.push((name.to_string(), value.to_string())),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, String)> for HeaderMap {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut map = HeaderMap::new();
        for (k, v) in iter {
            map.set(&k, &v);
        }
        map
    }
}

/// Opaque token from the broker client that, when invoked, advances the
/// consumer offset for the envelope's partition. Implementations must tolerate
/// out-of-order invocation across workers (an offset is never moved backwards).
/// Non-broker sources may leave the envelope without a handle.
pub trait CommitHandle: Send + Sync {
    fn commit(&self) -> Result<(), CommitError>;
}

/// Lifecycle of an envelope.
///
/// `Received -> Filtered -> Resolved -> Decoded -> Transformed -> Encoded ->
/// Produced -> Committed` on the success path; any stage between `Resolved`
/// and `Produced` may divert to `DlqProduced -> Committed`. `Committed` and
/// `CommitFailed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeState {
    Received,
    Filtered,
    Resolved,
    Decoded,
    Transformed,
    Encoded,
    Produced,
    DlqProduced,
    Committed,
    CommitFailed,
}

/// In-flight state of one message.
///
/// Receipt fields are immutable; the derived fields are populated as the
/// pipeline advances. Exclusively owned: the consumer builds it, the queue
/// transfers it, one worker drives it to a terminal state.
pub struct Envelope {
    // Set on receipt.
    pub source_topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub headers: HeaderMap,

    // Populated by the pipeline stages.
    pub state: EnvelopeState,
    pub operation: Option<Arc<OperationConfig>>,
    pub datacenter: Option<String>,
    pub header_snapshot: Option<HeaderMap>,
    pub payload_json: Option<String>,
    pub transformed_json: Option<String>,
    pub outbound_payload: Option<Vec<u8>>,
    pub outbound_schema: Option<String>,
    pub destination_topic: Option<String>,

    commit: Option<Box<dyn CommitHandle>>,
}

impl Envelope {
    pub fn new(
        source_topic: impl Into<String>,
        partition: i32,
        offset: i64,
        key: Option<String>,
        payload: Vec<u8>,
        headers: HeaderMap,
    ) -> Self {
        Self {
            source_topic: source_topic.into(),
            partition,
            offset,
            key,
            payload,
            headers,
            state: EnvelopeState::Received,
            operation: None,
            datacenter: None,
            header_snapshot: None,
            payload_json: None,
            transformed_json: None,
            outbound_payload: None,
            outbound_schema: None,
            destination_topic: None,
            commit: None,
        }
    }

    /// Attach the broker commit handle. Called once by the consumer.
    pub fn attach_commit(&mut self, handle: Box<dyn CommitHandle>) {
        self.commit = Some(handle);
    }

    /// Take the commit handle, leaving none behind. The coordinator relies on
    /// this to make a second commit impossible by construction.
    pub fn take_commit(&mut self) -> Option<Box<dyn CommitHandle>> {
        self.commit.take()
    }

    pub fn has_commit(&self) -> bool {
        self.commit.is_some()
    }

    /// Inbound `messageSchema` header, if present.
    pub fn message_schema(&self) -> Option<&str> {
        self.headers.get(headers::MESSAGE_SCHEMA)
    }

    /// Resolved operation, once the resolver has run.
    pub fn operation(&self) -> Option<&OperationConfig> {
        self.operation.as_deref()
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("source_topic", &self.source_topic)
            .field("partition", &self.partition)
            .field("offset", &self.offset)
            .field("state", &self.state)
            .field("payload_len", &self.payload.len())
            .field("headers", &self.headers.len())
            .field("has_commit", &self.commit.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandle(Arc<AtomicUsize>);

    impl CommitHandle for CountingHandle {
        fn commit(&self) -> Result<(), CommitError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn header_map_is_case_preserving_and_exact() {
        let mut headers = HeaderMap::new();
        headers.set("messageSchema", "RequestPayerCustomerOwnAccountRetrieve");
        headers.set("X-Correlation-Id", "abc-123");

        assert_eq!(
            headers.get("messageSchema"),
            Some("RequestPayerCustomerOwnAccountRetrieve")
        );
        assert_eq!(headers.get("messageschema"), None);

        let keys: Vec<&str> = headers.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["messageSchema", "X-Correlation-Id"]);
    }

    #[test]
    fn header_set_replaces_in_place() {
        let mut headers = HeaderMap::new();
        headers.set("messageSchema", "A");
        headers.set("messageSchema", "B");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("messageSchema"), Some("B"));
    }

    #[test]
    fn commit_handle_can_only_be_taken_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut env = Envelope::new("t", 0, 42, None, vec![], HeaderMap::new());
        env.attach_commit(Box::new(CountingHandle(count.clone())));

        let handle = env.take_commit().unwrap();
        handle.commit().unwrap();
        assert!(env.take_commit().is_none());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
