//! Pipeline driver and worker dispatcher.
//!
//! Consumers enqueue envelopes into a bounded queue drained by a fixed pool of
//! workers. Each worker drives one envelope at a time through the `epgw-tx`
//! stages under the channel's processing deadline; success commits, any
//! catalogued error funnels to the DLQ (which commits on its own success).
//! Panics are not caught: a programming error aborts its worker task, is
//! logged by the pool supervisor, and the message is re-delivered later rather
//! than dead-lettered as a bad message.

use std::sync::Arc;
use std::time::Duration;

use epgw_core::config::{ChannelConfig, OperationConfig};
use epgw_core::envelope::{Envelope, EnvelopeState};
use epgw_core::error::GatewayError;
use epgw_tx::registry::ResourceRegistry;
use epgw_tx::{codec, gate, resolve, route, transform};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::commit;
use crate::dlq;
use crate::producer::Publisher;

/// Capacity of the consumer-to-worker queue. Enqueueing blocks when full.
pub const QUEUE_CAPACITY: usize = 10;

/// Workers per pipeline.
pub const WORKERS_PER_PIPELINE: usize = 8;

/// Everything a worker needs to process envelopes: collaborators are handed in
/// explicitly, there is no ambient resolution.
pub struct PipelineDeps {
    pub channel_id: String,
    pub channel: Arc<ChannelConfig>,
    pub operations: Vec<Arc<OperationConfig>>,
    pub registry: Arc<ResourceRegistry>,
    pub publisher: Arc<dyn Publisher>,
}

impl PipelineDeps {
    pub fn new(
        channel_id: impl Into<String>,
        channel: Arc<ChannelConfig>,
        operations: Vec<Arc<OperationConfig>>,
        registry: Arc<ResourceRegistry>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            channel,
            operations,
            registry,
            publisher,
        }
    }
}

/// Drive one envelope through resolve, gate, decode, transform, encode, route,
/// and produce. Commit is the caller's job.
pub async fn process(env: &mut Envelope, deps: &PipelineDeps) -> Result<(), GatewayError> {
    let operation = resolve::resolve(env, &deps.channel, &deps.operations)?;
    gate::check(env, &operation)?;

    let sender_schema = deps.registry.avro_schema(&operation.schema)?;
    let decoded = codec::decode(&env.payload, &sender_schema)?;
    env.payload_json = Some(decoded);
    env.state = EnvelopeState::Decoded;
    debug!(
        channel = %deps.channel_id,
        operation = %operation.name,
        topic = %env.source_topic,
        offset = env.offset,
        "payload decoded"
    );

    transform::apply(env, &operation, &deps.registry)?;

    let receiver_schema = deps.registry.avro_schema(&operation.receiver_schema_ref())?;
    let transformed = env
        .transformed_json
        .clone()
        .ok_or_else(|| GatewayError::Transform("transform produced no output".to_string()))?;
    env.outbound_payload = Some(codec::encode(&transformed, &receiver_schema)?);

    route::select(env, &operation)?;

    let topic = env
        .destination_topic
        .clone()
        .ok_or_else(|| GatewayError::Produce("no destination topic selected".to_string()))?;
    let payload = env.outbound_payload.clone().unwrap_or_default();
    deps.publisher
        .publish(&topic, env.key.as_deref(), &env.headers, &payload)
        .await?;
    env.state = EnvelopeState::Produced;
    debug!(
        operation = %operation.name,
        destination = %topic,
        offset = env.offset,
        "message produced"
    );
    Ok(())
}

/// Run one envelope to a terminal state: process under the channel deadline,
/// then commit on success or funnel to the DLQ on any catalogued error.
pub async fn handle_envelope(env: &mut Envelope, deps: &PipelineDeps) {
    let deadline = Duration::from_millis(deps.channel.timeout_ms);
    let outcome = match tokio::time::timeout(deadline, process(env, deps)).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::ProcessingTimeout(deps.channel.timeout_ms)),
    };
    match outcome {
        Ok(()) => commit::commit(env),
        Err(err) => dlq::route_to_dlq(env, &err, &deps.channel, deps.publisher.as_ref()).await,
    }
}

/// A fixed pool of workers draining one queue.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` tasks over the shared receiver. Workers stop when the
    /// queue closes (all consumers gone) and the queue has drained.
    pub fn spawn(
        queue: mpsc::Receiver<Envelope>,
        deps: Arc<PipelineDeps>,
        workers: usize,
    ) -> Self {
        let queue = Arc::new(Mutex::new(queue));
        let handles = (0..workers)
            .map(|worker| {
                let queue = queue.clone();
                let deps = deps.clone();
                tokio::spawn(async move {
                    loop {
                        let env = {
                            let mut guard = queue.lock().await;
                            guard.recv().await
                        };
                        let Some(mut env) = env else { break };
                        handle_envelope(&mut env, &deps).await;
                    }
                    debug!(worker, "worker stopped");
                })
            })
            .collect();
        Self { handles }
    }

    /// Await every worker; a panicked worker is logged, not resurrected.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(err) = handle.await {
                error!(error = %err, "worker aborted");
            }
        }
    }
}
