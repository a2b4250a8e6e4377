//! Configuration model for the gateway.
//!
//! The whole tree lives under the `app` prefix and is loaded exactly once at
//! startup; after [`GatewayConfig::validate`] passes it is shared behind `Arc`
//! and never mutated. Unknown YAML fields are ignored for forward
//! compatibility. Invalid configuration is a startup-time fatal error, never a
//! per-message error.
//!
//! Maps use `BTreeMap` so that iteration over channels, operations, and
//! datacenter keys is deterministic across runs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root of the configuration tree (`app.*`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayConfig {
    pub app: AppConfig,
}

/// The `app` section: broker settings plus the channel map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub channel: BTreeMap<String, ChannelConfig>,
}

/// Broker connection settings shared by all consumers and the producer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KafkaConfig {
    /// Comma-separated list of bootstrap broker addresses.
    #[serde(default = "default_brokers")]
    pub brokers: String,
    /// Client id prefix; consumers append their group id.
    #[serde(default = "default_client_id")]
    pub client_id: String,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: default_brokers(),
            client_id: default_client_id(),
        }
    }
}

/// One gateway channel (`app.channel.<id>`): a set of operations sharing a
/// DLQ and a datacenter map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Per-envelope processing deadline in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Datacenter key -> datacenter code, e.g. `jrd -> JRD`. Keys are matched
    /// against dot-separated segments of topic names.
    #[serde(default)]
    pub datacenter: BTreeMap<String, String>,
    pub dlq: DlqConfig,
    /// Operations keyed by canonical name.
    #[serde(default)]
    pub operation: BTreeMap<String, OperationConfig>,
}

/// One operation: the unit of routing. Bundles the schema/transform resources,
/// the consumer group, the input topics, and the output Topics block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Canonical operation name; filled from the map key when omitted.
    #[serde(default)]
    pub name: String,
    /// Consumer group id. Operations sharing a group share one consumer.
    #[serde(default)]
    pub group_id: String,
    /// Sender-side binary record schema resource.
    #[serde(default)]
    pub schema: String,
    /// JSON schema resource applied to the decoded payload.
    #[serde(default)]
    pub json_schema: String,
    /// Declarative transform expression resource.
    #[serde(default)]
    pub transform: String,
    /// Outbound `messageSchema` header value; also the name stem of the
    /// receiver-side binary schema.
    #[serde(default)]
    pub message_schema: String,
    /// Topics this operation's consumer subscribes to.
    #[serde(default)]
    pub input: Vec<String>,
    /// Extra mandatory inbound headers beyond `channelId`/`messageSchema`.
    #[serde(default)]
    pub required_headers: Vec<String>,
    /// Destination topics, selected by datacenter.
    #[serde(default)]
    pub topics: TopicsConfig,
}

/// Destination topic block of an operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TopicsConfig {
    /// When true the destination is built from `topic_default` by substituting
    /// the datacenter placeholder instead of picking from `names`.
    #[serde(default)]
    pub dynamic: bool,
    #[serde(default)]
    pub topic_default: Option<String>,
    /// Static topic names, one per datacenter (`<topic>.<dc>` suffix).
    #[serde(default)]
    pub names: Vec<String>,
}

/// Dead-letter queue entry of a channel. The datacenter key is appended as a
/// suffix segment at routing time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DlqConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub topic: String,
}

fn default_true() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_brokers() -> String {
    "localhost:9092".to_string()
}

fn default_client_id() -> String {
    "epgw".to_string()
}

impl GatewayConfig {
    /// Parse a configuration document and fill the derived fields (operation
    /// names default to their map key).
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let mut config: GatewayConfig = serde_yaml::from_str(yaml)?;
        for channel in config.app.channel.values_mut() {
            for (name, op) in channel.operation.iter_mut() {
                if op.name.is_empty() {
                    op.name = name.clone();
                }
            }
        }
        Ok(config)
    }

    /// First enabled channel, if any. The gateway currently runs exactly one.
    pub fn active_channel(&self) -> Option<(&str, &ChannelConfig)> {
        self.app
            .channel
            .iter()
            .find(|(_, c)| c.enabled)
            .map(|(id, c)| (id.as_str(), c))
    }

    /// Whether the tree satisfies every startup invariant.
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Startup invariants: at least one enabled channel with at least one
    /// enabled operation, and every enabled operation fully specified.
    /// Violations abort the process; they are never per-message errors.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.app.channel.is_empty() {
            anyhow::bail!("configuration has no channels");
        }
        let Some((id, channel)) = self.active_channel() else {
            anyhow::bail!("configuration has no enabled channel");
        };
        if channel.datacenter.is_empty() {
            anyhow::bail!("channel '{id}' has no datacenter entries");
        }
        let enabled: Vec<&OperationConfig> =
            channel.operation.values().filter(|op| op.enabled).collect();
        if enabled.is_empty() {
            anyhow::bail!("channel '{id}' has no enabled operations");
        }
        for op in enabled {
            if op.schema.is_empty() || op.json_schema.is_empty() || op.transform.is_empty() {
                anyhow::bail!("operation '{}' has empty schema references", op.name);
            }
            if op.message_schema.is_empty() {
                anyhow::bail!("operation '{}' has no outbound message schema", op.name);
            }
            if op.group_id.is_empty() {
                anyhow::bail!("operation '{}' has no consumer group id", op.name);
            }
            if op.input.is_empty() {
                anyhow::bail!("operation '{}' has no input topics", op.name);
            }
            if op.topics.names.is_empty() && !(op.topics.dynamic && op.topics.topic_default.is_some())
            {
                anyhow::bail!("operation '{}' has no destination topics", op.name);
            }
        }
        Ok(())
    }
}

impl ChannelConfig {
    /// Look up an operation by canonical name.
    pub fn operation(&self, name: &str) -> Option<&OperationConfig> {
        self.operation.values().find(|op| op.name == name)
    }

    /// All operations, enabled or not, in deterministic order.
    pub fn all_operations(&self) -> impl Iterator<Item = &OperationConfig> {
        self.operation.values()
    }

    /// Enabled operations only.
    pub fn enabled_operations(&self) -> impl Iterator<Item = &OperationConfig> {
        self.operation.values().filter(|op| op.enabled)
    }

    /// Datacenter code for a key, e.g. `jrd -> JRD`.
    pub fn datacenter(&self, key: &str) -> Option<&str> {
        self.datacenter.get(key).map(String::as_str)
    }

    /// Derive the datacenter key from a topic name by matching configured keys
    /// against the topic's dot-separated segments.
    pub fn datacenter_key_for_topic(&self, topic: &str) -> Option<&str> {
        topic
            .split('.')
            .find_map(|segment| self.datacenter.keys().find(|key| key.as_str() == segment))
            .map(String::as_str)
    }

    /// First configured datacenter key; the deterministic fallback when a
    /// topic name carries no datacenter segment.
    pub fn first_datacenter_key(&self) -> Option<&str> {
        self.datacenter.keys().next().map(String::as_str)
    }

    /// The channel DLQ topic stem, when dead-lettering is enabled.
    pub fn dlq_topic(&self) -> Option<&str> {
        if self.dlq.enabled && !self.dlq.topic.is_empty() {
            Some(self.dlq.topic.as_str())
        } else {
            None
        }
    }

    /// Enabled operations grouped by consumer group id. Each entry maps to one
    /// consumer subscribed to the union of the member operations' input topics.
    pub fn consumer_groups(&self) -> BTreeMap<String, Vec<OperationConfig>> {
        let mut groups: BTreeMap<String, Vec<OperationConfig>> = BTreeMap::new();
        for op in self.enabled_operations() {
            groups.entry(op.group_id.clone()).or_default().push(op.clone());
        }
        groups
    }
}

impl OperationConfig {
    /// Name stem of the sender-side binary schema resource:
    /// `classpath:schemas/Foo.avsc -> Foo`. The resolver matches the
    /// `messageSchema` header against this stem or the canonical name.
    pub fn schema_stem(&self) -> &str {
        let tail = match self.schema.rfind('/') {
            Some(pos) => &self.schema[pos + 1..],
            None => match self.schema.rfind(':') {
                Some(pos) => &self.schema[pos + 1..],
                None => self.schema.as_str(),
            },
        };
        match tail.rfind('.') {
            Some(pos) => &tail[..pos],
            None => tail,
        }
    }

    /// Reference of the receiver-side binary schema: the sender-side reference
    /// with its file stem replaced by `message_schema`.
    pub fn receiver_schema_ref(&self) -> String {
        match self.schema.rfind('/') {
            Some(pos) => format!("{}{}.avsc", &self.schema[..pos + 1], self.message_schema),
            None => format!("{}.avsc", self.message_schema),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_yaml() -> &'static str {
        r#"
app:
  kafka:
    brokers: broker-1:9092,broker-2:9092
  channel:
    BNE:
      enabled: true
      timeout_ms: 30000
      datacenter:
        jrd: JRD
        qro: QRO
      dlq:
        enabled: true
        topic: sendAccountInformationDlqCreate
      operation:
        requestOwnAccountInformationPayerBeS016:
          enabled: true
          group_id: mx.oab.accountManagement.payerQuery
          schema: classpath:schemas/RequestPayerCustomerOwnAccountRetrieve.avsc
          json_schema: classpath:schemas/RequestPayerCustomerOwnAccountRetrieve.json
          transform: classpath:schemas/requestOwnAccountInformationPayerBeS016.jsonata
          message_schema: RequestOwnAccountInformationPayerBeS016
          input:
            - mx.jrd.accountManagement.oab.payerQuery.input
          topics:
            names:
              - mx.eportal.requestOwnAccountInformationPayerBeS016.jrd
              - mx.eportal.requestOwnAccountInformationPayerBeS016.qro
        responsePayerCustomerOwnAccountRetrieve:
          enabled: true
          group_id: mx.oab.payerQuery.responses
          schema: classpath:schemas/ResponseOwnAccountInformationPayerBeS016.avsc
          json_schema: classpath:schemas/ResponseOwnAccountInformationPayerBeS016.json
          transform: classpath:schemas/responsePayerCustomerOwnAccountRetrieve.jsonata
          message_schema: ResponsePayerCustomerOwnAccountRetrieve
          input:
            - mx.eportal.responseOwnAccountInformationPayerBeS016.jrd
            - mx.eportal.responseOwnAccountInformationPayerBeS016.qro
          topics:
            names:
              - mx.oab.responsePayerCustomerOwnAccountRetrieve.jrd
              - mx.oab.responsePayerCustomerOwnAccountRetrieve.qro
"#
    }

    #[test]
    fn parses_and_validates_sample() {
        let config = GatewayConfig::from_yaml(sample_yaml()).unwrap();
        config.validate().unwrap();
        assert!(config.is_valid());

        let (id, channel) = config.active_channel().unwrap();
        assert_eq!(id, "BNE");
        assert_eq!(channel.timeout_ms, 30_000);
        assert_eq!(channel.datacenter("jrd"), Some("JRD"));
        assert_eq!(channel.dlq_topic(), Some("sendAccountInformationDlqCreate"));
    }

    #[test]
    fn loading_twice_yields_equal_trees() {
        let a = GatewayConfig::from_yaml(sample_yaml()).unwrap();
        let b = GatewayConfig::from_yaml(sample_yaml()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let yaml = sample_yaml().replace(
            "  kafka:",
            "  retired_section:\n    something: true\n  kafka:",
        );
        let config = GatewayConfig::from_yaml(&yaml).unwrap();
        assert!(config.is_valid());
    }

    #[test]
    fn operation_name_defaults_to_map_key() {
        let config = GatewayConfig::from_yaml(sample_yaml()).unwrap();
        let (_, channel) = config.active_channel().unwrap();
        let op = channel.operation("requestOwnAccountInformationPayerBeS016").unwrap();
        assert_eq!(op.name, "requestOwnAccountInformationPayerBeS016");
    }

    #[test]
    fn schema_stem_and_receiver_ref() {
        let config = GatewayConfig::from_yaml(sample_yaml()).unwrap();
        let (_, channel) = config.active_channel().unwrap();
        let op = channel.operation("requestOwnAccountInformationPayerBeS016").unwrap();
        assert_eq!(op.schema_stem(), "RequestPayerCustomerOwnAccountRetrieve");
        assert_eq!(
            op.receiver_schema_ref(),
            "classpath:schemas/RequestOwnAccountInformationPayerBeS016.avsc"
        );
    }

    #[test]
    fn datacenter_key_from_topic_segments() {
        let config = GatewayConfig::from_yaml(sample_yaml()).unwrap();
        let (_, channel) = config.active_channel().unwrap();
        assert_eq!(
            channel.datacenter_key_for_topic("mx.jrd.accountManagement.oab.payerQuery.input"),
            Some("jrd")
        );
        assert_eq!(
            channel
                .datacenter_key_for_topic("mx.eportal.responseOwnAccountInformationPayerBeS016.qro"),
            Some("qro")
        );
        assert_eq!(channel.datacenter_key_for_topic("mx.other.topic"), None);
        assert_eq!(channel.first_datacenter_key(), Some("jrd"));
    }

    #[test]
    fn consumer_groups_merge_shared_group_ids() {
        let config = GatewayConfig::from_yaml(sample_yaml()).unwrap();
        let (_, channel) = config.active_channel().unwrap();
        let groups = channel.consumer_groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["mx.oab.payerQuery.responses"].len(), 1);
    }

    #[test]
    fn disabled_operations_fail_validation_when_alone() {
        let yaml = sample_yaml().replace("          enabled: true\n", "          enabled: false\n");
        let config = GatewayConfig::from_yaml(&yaml).unwrap();
        assert!(!config.is_valid());
    }

    #[test]
    fn missing_group_id_is_invalid() {
        let yaml = sample_yaml().replace("          group_id: mx.oab.accountManagement.payerQuery\n", "");
        let config = GatewayConfig::from_yaml(&yaml).unwrap();
        assert!(config.validate().unwrap_err().to_string().contains("group id"));
    }

    #[test]
    fn dynamic_topics_allow_empty_names() {
        let yaml = sample_yaml().replace(
            "          topics:\n            names:\n              - mx.eportal.requestOwnAccountInformationPayerBeS016.jrd\n              - mx.eportal.requestOwnAccountInformationPayerBeS016.qro\n",
            "          topics:\n            dynamic: true\n            topic_default: mx.eportal.requestOwnAccountInformationPayerBeS016.{datacenter}\n",
        );
        let config = GatewayConfig::from_yaml(&yaml).unwrap();
        config.validate().unwrap();
    }
}
