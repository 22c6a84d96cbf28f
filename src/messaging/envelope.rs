//! Message envelope types: typed payloads plus broker metadata

use crate::messaging::error::{MessagingError, MessagingResult};
use crate::messaging::routing::routing_key_for;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// Content type of every message body
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Author role of a conversation message.
///
/// Role-tagged messages are routed with a `{type}.{role}` key so that workers
/// can bind to a single role.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

impl MessageRole {
    /// Routing key / queue suffix for this role
    pub fn routing_suffix(&self) -> String {
        self.to_string().to_lowercase()
    }
}

/// A typed payload that can travel over the bus.
///
/// The message type name is used verbatim as the exchange name and as the
/// default queue and routing key.
pub trait PipelineMessage: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Type name; names the exchange
    const MESSAGE_TYPE: &'static str;

    /// Role used for role-aware routing, if any
    fn role(&self) -> Option<MessageRole> {
        None
    }
}

/// Broker-level message properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageProperties {
    /// Unique message id
    pub message_id: String,

    /// Body encoding
    pub content_type: String,

    /// Message type name
    pub message_type: String,

    /// Survives a broker restart
    pub persistent: bool,

    /// Publish timestamp
    pub timestamp: DateTime<Utc>,
}

impl MessageProperties {
    /// Fresh properties with a new message id
    pub fn new(message_type: &str) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            content_type: CONTENT_TYPE_JSON.to_string(),
            message_type: message_type.to_string(),
            persistent: true,
            timestamp: Utc::now(),
        }
    }
}

/// An encoded message ready to hand to a broker
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub exchange: String,
    pub routing_key: String,
    pub properties: MessageProperties,
    pub body: Vec<u8>,
}

impl OutboundMessage {
    /// Serialize a typed message and compute its routing key
    pub fn encode<M: PipelineMessage>(message: &M) -> MessagingResult<Self> {
        let body = serde_json::to_vec(message)?;

        Ok(Self {
            exchange: M::MESSAGE_TYPE.to_string(),
            routing_key: routing_key_for(M::MESSAGE_TYPE, message.role()),
            properties: MessageProperties::new(M::MESSAGE_TYPE),
            body,
        })
    }
}

/// Resolves a single delivery on the broker side
#[async_trait]
pub trait DeliveryAcker: Send + Sync {
    /// Positive acknowledgement
    async fn ack(&self) -> MessagingResult<()>;

    /// Negative acknowledgement; `requeue = false` discards the message
    async fn nack(&self, requeue: bool) -> MessagingResult<()>;
}

/// A delivery as received from the broker, before decoding
pub struct RawDelivery {
    pub delivery_tag: u64,
    pub exchange: String,
    pub routing_key: String,
    pub redelivered: bool,
    pub properties: MessageProperties,
    pub body: Vec<u8>,
    acker: Box<dyn DeliveryAcker>,
}

impl std::fmt::Debug for RawDelivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawDelivery")
            .field("delivery_tag", &self.delivery_tag)
            .field("exchange", &self.exchange)
            .field("routing_key", &self.routing_key)
            .field("redelivered", &self.redelivered)
            .field("message_id", &self.properties.message_id)
            .field("body_len", &self.body.len())
            .finish()
    }
}

impl RawDelivery {
    /// Create a delivery bound to its acker
    pub fn new(
        delivery_tag: u64,
        exchange: String,
        routing_key: String,
        redelivered: bool,
        properties: MessageProperties,
        body: Vec<u8>,
        acker: Box<dyn DeliveryAcker>,
    ) -> Self {
        Self {
            delivery_tag,
            exchange,
            routing_key,
            redelivered,
            properties,
            body,
            acker,
        }
    }

    /// Decode the body into a typed delivery
    pub fn decode<M: PipelineMessage>(&self) -> MessagingResult<Delivery<M>> {
        let message: M = serde_json::from_slice(&self.body)
            .map_err(|e| MessagingError::DeserializationError(e.to_string()))?;

        Ok(Delivery {
            message,
            delivery_tag: self.delivery_tag,
            message_id: self.properties.message_id.clone(),
            redelivered: self.redelivered,
            exchange: self.exchange.clone(),
            routing_key: self.routing_key.clone(),
        })
    }

    /// Acknowledge and consume the delivery
    pub async fn ack(self) -> MessagingResult<()> {
        self.acker.ack().await
    }

    /// Reject and consume the delivery
    pub async fn nack(self, requeue: bool) -> MessagingResult<()> {
        self.acker.nack(requeue).await
    }
}

/// A decoded delivery handed to message handlers
#[derive(Debug, Clone)]
pub struct Delivery<M> {
    pub message: M,
    pub delivery_tag: u64,
    pub message_id: String,
    pub redelivered: bool,
    pub exchange: String,
    pub routing_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct RulesetPublished {
        ruleset_id: String,
    }

    impl PipelineMessage for RulesetPublished {
        const MESSAGE_TYPE: &'static str = "RulesetPublished";
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct RoleTagged {
        role: MessageRole,
    }

    impl PipelineMessage for RoleTagged {
        const MESSAGE_TYPE: &'static str = "RoleTagged";

        fn role(&self) -> Option<MessageRole> {
            Some(self.role)
        }
    }

    #[test]
    fn test_role_suffix() {
        assert_eq!(MessageRole::Assistant.routing_suffix(), "assistant");
        assert_eq!(MessageRole::from_str("User").unwrap(), MessageRole::User);
    }

    #[test]
    fn test_encode_uses_type_as_exchange() {
        let outbound = OutboundMessage::encode(&RulesetPublished {
            ruleset_id: "rs-1".to_string(),
        })
        .unwrap();

        assert_eq!(outbound.exchange, "RulesetPublished");
        assert_eq!(outbound.routing_key, "RulesetPublished");
        assert_eq!(outbound.properties.content_type, CONTENT_TYPE_JSON);
        assert_eq!(outbound.properties.message_type, "RulesetPublished");
        assert!(outbound.properties.persistent);
        assert!(!outbound.properties.message_id.is_empty());

        let body: serde_json::Value = serde_json::from_slice(&outbound.body).unwrap();
        assert_eq!(body["rulesetId"], "rs-1");
    }

    #[test]
    fn test_encode_role_routing_key() {
        let outbound = OutboundMessage::encode(&RoleTagged {
            role: MessageRole::Assistant,
        })
        .unwrap();
        assert_eq!(outbound.routing_key, "RoleTagged.assistant");
    }

    #[test]
    fn test_message_ids_are_unique() {
        let a = MessageProperties::new("A");
        let b = MessageProperties::new("A");
        assert_ne!(a.message_id, b.message_id);
    }
}
