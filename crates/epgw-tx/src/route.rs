//! Output route selection.
//!
//! Picks the destination topic for a resolved `(operation, datacenter)` pair
//! and rewrites the outbound `messageSchema` header. Static topic lists are
//! matched on the `.<datacenter>` suffix segment; dynamic operations build the
//! destination from their template. The producing half lives in `epgw-io`.

use epgw_core::config::{ChannelConfig, OperationConfig, TopicsConfig};
use epgw_core::envelope::{Envelope, EnvelopeState};
use epgw_core::error::GatewayError;
use epgw_core::headers;

/// Stamp the destination topic and the outbound schema header on the envelope.
pub fn select(env: &mut Envelope, operation: &OperationConfig) -> Result<(), GatewayError> {
    let datacenter = env
        .datacenter
        .as_deref()
        .ok_or_else(|| GatewayError::Produce("no datacenter resolved for routing".to_string()))?;
    let topic = destination_topic(&operation.topics, datacenter)?;

    env.destination_topic = Some(topic);
    env.outbound_schema = Some(operation.message_schema.clone());
    env.headers.set(headers::MESSAGE_SCHEMA, &operation.message_schema);
    env.state = EnvelopeState::Encoded;
    Ok(())
}

/// Destination topic for a datacenter, from the operation's Topics block.
pub fn destination_topic(topics: &TopicsConfig, datacenter: &str) -> Result<String, GatewayError> {
    if topics.dynamic {
        let template = topics.topic_default.as_deref().ok_or_else(|| {
            GatewayError::Produce("dynamic topics without a topic_default template".to_string())
        })?;
        return Ok(template.replace(headers::DATACENTER_PLACEHOLDER, datacenter));
    }
    let suffix = format!(".{datacenter}");
    topics
        .names
        .iter()
        .find(|name| name.ends_with(&suffix))
        .cloned()
        .ok_or_else(|| {
            GatewayError::Produce(format!("no destination topic for datacenter '{datacenter}'"))
        })
}

/// DLQ topic for a datacenter, when the channel has dead-lettering enabled.
pub fn dlq_topic(channel: &ChannelConfig, datacenter: &str) -> Option<String> {
    channel
        .dlq_topic()
        .map(|stem| format!("{stem}.{datacenter}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn static_topics() -> TopicsConfig {
        TopicsConfig {
            dynamic: false,
            topic_default: None,
            names: vec![
                "mx.eportal.requestOwnAccountInformationPayerBeS016.jrd".to_string(),
                "mx.eportal.requestOwnAccountInformationPayerBeS016.qro".to_string(),
            ],
        }
    }

    #[test]
    fn static_selection_matches_the_datacenter_suffix() {
        let topics = static_topics();
        assert_eq!(
            destination_topic(&topics, "jrd").unwrap(),
            "mx.eportal.requestOwnAccountInformationPayerBeS016.jrd"
        );
        assert_eq!(
            destination_topic(&topics, "qro").unwrap(),
            "mx.eportal.requestOwnAccountInformationPayerBeS016.qro"
        );
    }

    #[test]
    fn unmatched_datacenter_is_a_produce_error() {
        let err = destination_topic(&static_topics(), "xyz").unwrap_err();
        assert_eq!(err.kind(), "ProduceError");
    }

    #[test]
    fn selection_is_deterministic() {
        let topics = static_topics();
        let first = destination_topic(&topics, "qro").unwrap();
        for _ in 0..10 {
            assert_eq!(destination_topic(&topics, "qro").unwrap(), first);
        }
    }

    #[test]
    fn dynamic_template_substitutes_the_datacenter() {
        let topics = TopicsConfig {
            dynamic: true,
            topic_default: Some("mx.eportal.payerQuery.{datacenter}".to_string()),
            names: vec![],
        };
        assert_eq!(
            destination_topic(&topics, "qro").unwrap(),
            "mx.eportal.payerQuery.qro"
        );
    }

    #[test]
    fn select_rewrites_the_schema_header() {
        use epgw_core::envelope::HeaderMap;

        let mut op: OperationConfig = serde_yaml::from_str("name: op").unwrap();
        op.message_schema = "RequestOwnAccountInformationPayerBeS016".to_string();
        op.topics = static_topics();

        let mut headers = HeaderMap::new();
        headers.set("messageSchema", "RequestPayerCustomerOwnAccountRetrieve");
        let mut env = Envelope::new("mx.jrd.in", 0, 0, None, vec![], headers);
        env.datacenter = Some("jrd".to_string());

        select(&mut env, &op).unwrap();

        assert_eq!(
            env.destination_topic.as_deref(),
            Some("mx.eportal.requestOwnAccountInformationPayerBeS016.jrd")
        );
        assert_eq!(
            env.headers.get("messageSchema"),
            Some("RequestOwnAccountInformationPayerBeS016")
        );
    }

    #[test]
    fn dlq_topic_appends_the_datacenter() {
        let channel: ChannelConfig = serde_yaml::from_str(
            r#"
datacenter: {jrd: JRD}
dlq:
  enabled: true
  topic: sendAccountInformationDlqCreate
"#,
        )
        .unwrap();
        assert_eq!(
            dlq_topic(&channel, "jrd").as_deref(),
            Some("sendAccountInformationDlqCreate.jrd")
        );

        let disabled: ChannelConfig = serde_yaml::from_str(
            r#"
datacenter: {jrd: JRD}
dlq:
  enabled: false
  topic: sendAccountInformationDlqCreate
"#,
        )
        .unwrap();
        assert_eq!(dlq_topic(&disabled, "jrd"), None);
    }
}
