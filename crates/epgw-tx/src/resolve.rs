//! Operation resolver: maps an incoming envelope to a channel operation.
//!
//! The `messageSchema` header is matched, exactly and case-sensitively,
//! against each candidate operation's canonical name or the name stem of its
//! binary schema resource. The candidate set is the operation set attached to
//! the envelope's consumer, so request and response consumers resolve against
//! their own operations only. There is no fallback for unknown schemas.

use std::sync::Arc;

use epgw_core::config::{ChannelConfig, OperationConfig};
use epgw_core::envelope::{Envelope, EnvelopeState};
use epgw_core::error::GatewayError;
use epgw_core::headers;
use tracing::warn;

/// Resolve the envelope's operation and datacenter, storing both on the
/// envelope and returning the operation for the caller.
pub fn resolve(
    env: &mut Envelope,
    channel: &ChannelConfig,
    candidates: &[Arc<OperationConfig>],
) -> Result<Arc<OperationConfig>, GatewayError> {
    let message_schema = env
        .headers
        .get(headers::MESSAGE_SCHEMA)
        .filter(|value| !value.is_empty())
        .ok_or(GatewayError::MissingMessageSchema)?;

    let operation = candidates
        .iter()
        .filter(|op| op.enabled)
        .find(|op| op.name == message_schema || op.schema_stem() == message_schema)
        .cloned()
        .ok_or_else(|| GatewayError::UnknownOperation(message_schema.to_string()))?;

    let datacenter = match channel.datacenter_key_for_topic(&env.source_topic) {
        Some(key) => key.to_string(),
        None => {
            let fallback = channel.first_datacenter_key().unwrap_or_default().to_string();
            warn!(
                topic = %env.source_topic,
                fallback = %fallback,
                "no datacenter segment in topic name, using first configured key"
            );
            fallback
        }
    };

    env.operation = Some(operation.clone());
    env.datacenter = Some(datacenter);
    env.state = EnvelopeState::Resolved;
    Ok(operation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use epgw_core::envelope::HeaderMap;

    fn channel() -> ChannelConfig {
        serde_yaml_from(
            r#"
enabled: true
datacenter:
  jrd: JRD
  qro: QRO
dlq:
  topic: sendAccountInformationDlqCreate
"#,
        )
    }

    fn serde_yaml_from<T: serde::de::DeserializeOwned>(yaml: &str) -> T {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn operation(name: &str, schema_stem: &str) -> Arc<OperationConfig> {
        let yaml = format!(
            r#"
enabled: true
name: {name}
group_id: g
schema: classpath:schemas/{schema_stem}.avsc
json_schema: classpath:schemas/{schema_stem}.json
transform: classpath:schemas/{name}.jsonata
message_schema: Out{name}
input: [in.topic]
topics:
  names: [out.topic.jrd, out.topic.qro]
"#
        );
        Arc::new(serde_yaml_from(&yaml))
    }

    fn envelope(topic: &str, schema_header: Option<&str>) -> Envelope {
        let mut headers = HeaderMap::new();
        if let Some(value) = schema_header {
            headers.set(epgw_core::headers::MESSAGE_SCHEMA, value);
        }
        Envelope::new(topic, 0, 0, None, vec![1], headers)
    }

    #[test]
    fn resolves_by_canonical_name() {
        let ops = vec![operation("requestOwnAccountInformationPayerBeS016", "RequestPayerCustomerOwnAccountRetrieve")];
        let mut env = envelope(
            "mx.jrd.accountManagement.oab.payerQuery.input",
            Some("requestOwnAccountInformationPayerBeS016"),
        );
        let op = resolve(&mut env, &channel(), &ops).unwrap();
        assert_eq!(op.name, "requestOwnAccountInformationPayerBeS016");
        assert_eq!(env.datacenter.as_deref(), Some("jrd"));
        assert_eq!(env.state, EnvelopeState::Resolved);
    }

    #[test]
    fn resolves_by_binary_schema_stem() {
        let ops = vec![operation("requestOwnAccountInformationPayerBeS016", "RequestPayerCustomerOwnAccountRetrieve")];
        let mut env = envelope(
            "mx.qro.accountManagement.oab.payerQuery.input",
            Some("RequestPayerCustomerOwnAccountRetrieve"),
        );
        let op = resolve(&mut env, &channel(), &ops).unwrap();
        assert_eq!(op.name, "requestOwnAccountInformationPayerBeS016");
        assert_eq!(env.datacenter.as_deref(), Some("qro"));
    }

    #[test]
    fn match_is_case_sensitive() {
        let ops = vec![operation("opName", "SchemaName")];
        let mut env = envelope("mx.jrd.t", Some("schemaname"));
        let err = resolve(&mut env, &channel(), &ops).unwrap_err();
        assert_eq!(err.kind(), "UnknownOperation");
    }

    #[test]
    fn missing_header_fails() {
        let ops = vec![operation("opName", "SchemaName")];
        let mut env = envelope("mx.jrd.t", None);
        let err = resolve(&mut env, &channel(), &ops).unwrap_err();
        assert_eq!(err.kind(), "MissingMessageSchema");
    }

    #[test]
    fn disabled_operations_are_not_candidates() {
        let mut disabled = (*operation("opName", "SchemaName")).clone();
        disabled.enabled = false;
        let ops = vec![Arc::new(disabled)];
        let mut env = envelope("mx.jrd.t", Some("opName"));
        let err = resolve(&mut env, &channel(), &ops).unwrap_err();
        assert_eq!(err.kind(), "UnknownOperation");
    }

    #[test]
    fn topic_without_datacenter_segment_falls_back_deterministically() {
        let ops = vec![operation("opName", "SchemaName")];
        let mut env = envelope("mx.unknown.topic", Some("opName"));
        resolve(&mut env, &channel(), &ops).unwrap();
        assert_eq!(env.datacenter.as_deref(), Some("jrd"));
    }
}
