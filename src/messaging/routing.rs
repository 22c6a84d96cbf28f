//! Topic routing: routing keys, queue naming and binding-pattern matching

use crate::messaging::envelope::{MessageRole, PipelineMessage};
use serde::{Deserialize, Serialize};

/// Routing key for a message type and optional role.
///
/// Untagged messages route with the bare type name; role-tagged messages
/// route with `{type}.{role}` (role lowercased).
pub fn routing_key_for(message_type: &str, role: Option<MessageRole>) -> String {
    match role {
        Some(role) => format!("{}.{}", message_type, role.routing_suffix()),
        None => message_type.to_string(),
    }
}

/// Exchange, queue and binding a consumer declares
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueSpec {
    /// Topic exchange (the message type name)
    pub exchange: String,

    /// Durable queue name
    pub queue: String,

    /// Binding pattern between queue and exchange
    pub binding_key: String,
}

impl QueueSpec {
    /// Default queue for a message type
    pub fn for_type(message_type: &str) -> Self {
        Self {
            exchange: message_type.to_string(),
            queue: message_type.to_string(),
            binding_key: message_type.to_string(),
        }
    }

    /// Role-suffixed queue for a message type
    pub fn for_role(message_type: &str, role: MessageRole) -> Self {
        let key = routing_key_for(message_type, Some(role));
        Self {
            exchange: message_type.to_string(),
            queue: key.clone(),
            binding_key: key,
        }
    }

    /// Default queue for a typed message
    pub fn for_message<M: PipelineMessage>() -> Self {
        Self::for_type(M::MESSAGE_TYPE)
    }

    /// Role-suffixed queue for a typed message
    pub fn for_message_role<M: PipelineMessage>(role: MessageRole) -> Self {
        Self::for_role(M::MESSAGE_TYPE, role)
    }

    /// Whether a routing key reaches this queue
    pub fn accepts(&self, routing_key: &str) -> bool {
        topic_matches(&self.binding_key, routing_key)
    }
}

/// Topic-exchange pattern matching.
///
/// Words are separated by `.`; `*` matches exactly one word and `#` matches
/// zero or more words.
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    match_words(&pattern, &key)
}

fn match_words(pattern: &[&str], key: &[&str]) -> bool {
    match (pattern.split_first(), key.split_first()) {
        (None, None) => true,
        (Some((&"#", rest)), _) => {
            match_words(rest, key) || (!key.is_empty() && match_words(pattern, &key[1..]))
        }
        (Some((&"*", rest)), Some((_, key_rest))) => match_words(rest, key_rest),
        (Some((word, rest)), Some((part, key_rest))) => word == part && match_words(rest, key_rest),
        _ => false,
    }
}
