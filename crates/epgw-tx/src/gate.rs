//! Header gate: rejects malformed envelopes before any payload work.
//!
//! Every operation requires `channelId` and `messageSchema`; an operation may
//! declare further mandatory headers. Blank values count as missing. The gate
//! never mutates headers.

use epgw_core::config::OperationConfig;
use epgw_core::envelope::Envelope;
use epgw_core::error::GatewayError;
use epgw_core::headers;

pub fn check(env: &Envelope, operation: &OperationConfig) -> Result<(), GatewayError> {
    require(env, headers::CHANNEL_ID)?;
    require(env, headers::MESSAGE_SCHEMA)?;
    for name in &operation.required_headers {
        require(env, name)?;
    }
    Ok(())
}

fn require(env: &Envelope, name: &str) -> Result<(), GatewayError> {
    match env.headers.get(name) {
        Some(value) if !value.trim().is_empty() => Ok(()),
        _ => Err(GatewayError::MissingHeader(name.to_string())),
    }
}
