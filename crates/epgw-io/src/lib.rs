//! # EPGW I/O - Broker Plumbing
//!
//! This crate owns everything that touches Kafka: the manual-commit consumers
//! with their `messageSchema` filter, the idempotent producer behind the
//! [`producer::Publisher`] seam, the commit coordinator, the DLQ funnel, and
//! the dispatcher that drives envelopes through the `epgw-tx` stages on a
//! bounded worker pool.

/// Manual-commit Kafka consumers and the message filter
pub mod consumer;

/// Idempotent producer and the publisher seam
pub mod producer;

/// Commit coordinator
pub mod commit;

/// Dead-letter queue funnel
pub mod dlq;

/// Pipeline driver, bounded queue, and worker pool
pub mod pipeline;
