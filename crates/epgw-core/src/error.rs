//! Error taxonomy for the per-message pipeline.
//!
//! Every failure a pipeline stage can produce is one variant of [`GatewayError`].
//! Downstream consumers (the DLQ funnel, log events, tests) discriminate on the
//! stable [`GatewayError::kind`] string, never on the Rust type, so the catalogue
//! doubles as the wire contract for DLQ diagnostic headers.

use crate::headers;

/// Errors raised by the pipeline stages and absorbed by the DLQ funnel.
///
/// No variant propagates to the upstream caller: the dispatcher routes every one
/// of them (except [`GatewayError::DlqProduce`], which leaves the offset
/// uncommitted) to the dead-letter queue.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The mandatory `messageSchema` header is absent or empty.
    #[error("required header '{}' is missing", headers::MESSAGE_SCHEMA)]
    MissingMessageSchema,

    /// A mandatory inbound header is absent or blank.
    #[error("required header '{0}' is missing or blank")]
    MissingHeader(String),

    /// The `messageSchema` header matches no enabled operation.
    #[error("no enabled operation recognizes message schema '{0}'")]
    UnknownOperation(String),

    /// A schema/transform resource could not be located by the registry.
    #[error("resource '{0}' not found")]
    SchemaNotFound(String),

    /// A schema/transform resource was located but failed to parse.
    #[error("resource '{name}' is invalid: {reason}")]
    SchemaInvalid { name: String, reason: String },

    /// The binary payload could not be read as a record datum.
    #[error("failed to decode payload: {0}")]
    Decode(String),

    /// The payload or JSON value does not conform to the record schema.
    #[error("payload does not conform to schema: {0}")]
    TypeMismatch(String),

    /// A JSON `null` was supplied for a union without a null branch.
    #[error("null is not allowed for union at {0}")]
    NullNotAllowedForUnion(String),

    /// No union branch matches the shape of the supplied JSON value.
    #[error("no suitable union branch at {0}")]
    NoSuitableUnionBranch(String),

    /// A map-typed field received something other than a JSON object.
    #[error("expected a JSON object for map at {0}")]
    ExpectedMap(String),

    /// An array-typed field received something other than a JSON array.
    #[error("expected a JSON array at {0}")]
    ExpectedList(String),

    /// A decimal-typed field received a value that is neither numeric text,
    /// base64 text, nor a raw byte sequence.
    #[error("value at {0} is not a valid decimal")]
    DecimalTypeMismatch(String),

    /// A bytes-typed field received a value that is neither base64 text nor a
    /// raw byte sequence.
    #[error("value at {0} is not a valid byte sequence")]
    BytesTypeMismatch(String),

    /// The record schema uses a form outside the gateway wire contract.
    #[error("unsupported record type at {path}: {form}")]
    UnsupportedRecordType { path: String, form: String },

    /// The decoded JSON violates the operation's JSON schema.
    #[error("payload failed schema validation at {path}: {reason}")]
    SchemaValidation { path: String, reason: String },

    /// The declarative transform expression failed at runtime.
    #[error("transform failed: {0}")]
    Transform(String),

    /// The transformed JSON could not be serialized under the outbound schema.
    #[error("failed to encode payload: {0}")]
    Encode(String),

    /// The downstream produce failed after the client-level retry.
    #[error("produce failed: {0}")]
    Produce(String),

    /// The worker exceeded the per-envelope processing deadline.
    #[error("processing exceeded {0} ms")]
    ProcessingTimeout(u64),

    /// The DLQ produce itself failed; the offset stays uncommitted.
    #[error("DLQ produce failed: {0}")]
    DlqProduce(String),
}

impl GatewayError {
    /// Stable kind string used in DLQ diagnostic headers and log events.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::MissingMessageSchema => "MissingMessageSchema",
            GatewayError::MissingHeader(_) => "MissingHeader",
            GatewayError::UnknownOperation(_) => "UnknownOperation",
            GatewayError::SchemaNotFound(_) => "SchemaNotFound",
            GatewayError::SchemaInvalid { .. } => "SchemaInvalid",
            GatewayError::Decode(_) => "DecodeError",
            GatewayError::TypeMismatch(_) => "TypeMismatch",
            GatewayError::NullNotAllowedForUnion(_) => "NullNotAllowedForUnion",
            GatewayError::NoSuitableUnionBranch(_) => "NoSuitableUnionBranch",
            GatewayError::ExpectedMap(_) => "ExpectedMap",
            GatewayError::ExpectedList(_) => "ExpectedList",
            GatewayError::DecimalTypeMismatch(_) => "DecimalTypeMismatch",
            GatewayError::BytesTypeMismatch(_) => "BytesTypeMismatch",
            GatewayError::UnsupportedRecordType { .. } => "UnsupportedRecordType",
            GatewayError::SchemaValidation { .. } => "SchemaValidationError",
            GatewayError::Transform(_) => "TransformError",
            GatewayError::Encode(_) => "EncodeError",
            GatewayError::Produce(_) => "ProduceError",
            GatewayError::ProcessingTimeout(_) => "ProcessingTimeout",
            GatewayError::DlqProduce(_) => "DlqProduceError",
        }
    }
}

/// Failure of an offset commit. Logged by the commit coordinator, never re-raised:
/// the broker will re-deliver the message and a later delivery will commit.
#[derive(Debug, thiserror::Error)]
#[error("offset commit failed: {0}")]
pub struct CommitError(pub String);
