//! Wire-contract constants shared by the pipeline stages.
//!
//! These are stable string literals, not behavior: inbound/outbound header names,
//! the diagnostic headers attached by the DLQ funnel, and the placeholder used in
//! dynamic topic templates. Keeping them in one module keeps the header contract
//! greppable.

/// Name of the header carrying the logical schema of the payload.
/// Required on every inbound message; rewritten on the outbound side.
pub const MESSAGE_SCHEMA: &str = "messageSchema";

/// Name of the header carrying the originating channel identifier.
pub const CHANNEL_ID: &str = "channelId";

/// DLQ diagnostic header: the topic the failed message was consumed from.
pub const DLQ_SOURCE_TOPIC: &str = "dlqSourceTopic";

/// DLQ diagnostic header: the catalogued error kind (e.g. `SchemaValidationError`).
pub const DLQ_ERROR_KIND: &str = "dlqErrorKind";

/// DLQ diagnostic header: the human-readable error message.
pub const DLQ_ERROR_MESSAGE: &str = "dlqErrorMessage";

/// DLQ diagnostic header: the Rust type that produced the error.
pub const DLQ_ERROR_CLASS: &str = "dlqErrorClass";

/// Placeholder substituted with the datacenter key in dynamic topic templates.
pub const DATACENTER_PLACEHOLDER: &str = "{datacenter}";
