use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ConversationKey, DeliveryStatus, Message};

/// Server → client push events. One tagged union, decoded and validated at
/// the transport boundary; no untyped payloads reach the delivery engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsEvent {
    /// New message for the recipient's sessions (all of them, regardless of
    /// which thread UI is open).
    #[serde(rename = "message:new")]
    MessageNew { message: Message },

    /// Delivery progress for a previously submitted message. Also carries
    /// read receipts back to the sender.
    #[serde(rename = "message:status")]
    MessageStatus {
        message_id: Uuid,
        delivery_status: DeliveryStatus,
        read_at: Option<DateTime<Utc>>,
    },

    #[serde(rename = "typing:start")]
    TypingStart {
        user_id: Uuid,
        conversation: ConversationKey,
    },

    #[serde(rename = "typing:stop")]
    TypingStop {
        user_id: Uuid,
        conversation: ConversationKey,
    },

    #[serde(rename = "presence:online")]
    PresenceOnline { user_id: Uuid },

    #[serde(rename = "presence:offline")]
    PresenceOffline { user_id: Uuid },
}

impl WsEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::MessageNew { .. } => "message:new",
            Self::MessageStatus { .. } => "message:status",
            Self::TypingStart { .. } => "typing:start",
            Self::TypingStop { .. } => "typing:stop",
            Self::PresenceOnline { .. } => "presence:online",
            Self::PresenceOffline { .. } => "presence:offline",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn status_of(message: &Message) -> Self {
        Self::MessageStatus {
            message_id: message.id,
            delivery_status: message.delivery_status,
            read_at: message.read_at,
        }
    }
}

/// Client → server events over the live channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsClientEvent {
    #[serde(rename = "typing:start")]
    TypingStart { conversation: ConversationKey },

    #[serde(rename = "typing:stop")]
    TypingStop { conversation: ConversationKey },

    /// Scopes room events (typing) to the threads this session is viewing.
    #[serde(rename = "room:join")]
    RoomJoin { conversation: ConversationKey },

    #[serde(rename = "room:leave")]
    RoomLeave { conversation: ConversationKey },

    #[serde(rename = "heartbeat")]
    Heartbeat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let user = Uuid::new_v4();
        let event = WsEvent::PresenceOnline { user_id: user };
        let json = event.to_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["type"], "presence:online");
        assert_eq!(parsed["user_id"], user.to_string());
    }

    #[test]
    fn client_events_decode_from_tagged_json() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let raw = format!(
            r#"{{"type":"typing:start","conversation":{{"user_a":"{a}","user_b":"{b}","job_id":null}}}}"#
        );
        let evt: WsClientEvent = serde_json::from_str(&raw).unwrap();
        match evt {
            WsClientEvent::TypingStart { conversation } => {
                assert!(conversation.involves(a));
                assert!(conversation.involves(b));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_types_fail_to_decode() {
        let raw = r#"{"type":"call:initiate","conversation":null}"#;
        assert!(serde_json::from_str::<WsClientEvent>(raw).is_err());
    }
}
