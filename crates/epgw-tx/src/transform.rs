//! Transform stage: JSON-schema validation, the declarative transform, and
//! restoration of the snapshotted business headers.
//!
//! The snapshot/restore pair guarantees that a transform expression can never
//! silently drop or re-case propagated headers: whatever was on the envelope
//! before the transform is back on it afterwards, and later stages only add.

use bumpalo::Bump;
use epgw_core::config::OperationConfig;
use epgw_core::envelope::{Envelope, EnvelopeState};
use epgw_core::error::GatewayError;
use jsonata_rs::JsonAta;

use crate::registry::ResourceRegistry;

/// Run the transform stage on a decoded envelope.
pub fn apply(
    env: &mut Envelope,
    operation: &OperationConfig,
    registry: &ResourceRegistry,
) -> Result<(), GatewayError> {
    let snapshot = env.headers.clone();
    env.header_snapshot = Some(snapshot.clone());

    let payload = env
        .payload_json
        .clone()
        .ok_or_else(|| GatewayError::Transform("payload has not been decoded".to_string()))?;

    validate(&payload, operation, registry)?;

    let expression = registry.transform_expr(&operation.transform)?;
    let transformed = evaluate(&expression, &payload)?;
    env.transformed_json = Some(transformed);

    // Restore the pre-transform headers, original case included.
    for (name, value) in snapshot.iter() {
        env.headers.set(name, value);
    }
    env.state = EnvelopeState::Transformed;
    Ok(())
}

/// Validate the decoded JSON against the operation's JSON schema. The first
/// violation is reported with its instance path.
fn validate(
    payload: &str,
    operation: &OperationConfig,
    registry: &ResourceRegistry,
) -> Result<(), GatewayError> {
    let schema = registry.json_schema(&operation.json_schema)?;
    let instance: serde_json::Value =
        serde_json::from_str(payload).map_err(|e| GatewayError::SchemaValidation {
            path: "/".to_string(),
            reason: format!("payload is not valid JSON: {e}"),
        })?;
    if let Err(mut violations) = schema.validate(&instance) {
        if let Some(first) = violations.next() {
            return Err(GatewayError::SchemaValidation {
                path: first.instance_path.to_string(),
                reason: first.to_string(),
            });
        }
        return Err(GatewayError::SchemaValidation {
            path: "/".to_string(),
            reason: "schema violation".to_string(),
        });
    }
    Ok(())
}

/// Evaluate a declarative transform expression against a JSON document,
/// returning the transformed JSON text.
pub fn evaluate(expression: &str, input: &str) -> Result<String, GatewayError> {
    let arena = Bump::new();
    let jsonata =
        JsonAta::new(expression, &arena).map_err(|e| GatewayError::Transform(e.to_string()))?;
    let result = jsonata
        .evaluate(Some(input), None)
        .map_err(|e| GatewayError::Transform(e.to_string()))?;
    let output = result.serialize(false);
    if output.is_empty() {
        return Err(GatewayError::Transform(
            "expression produced no output".to_string(),
        ));
    }
    Ok(output)
}
