use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hard cap on message content length, in characters.
pub const MAX_CONTENT_CHARS: usize = 4000;

/// Delivery progression for a persisted message.
///
/// Status only advances forward (sending → sent → delivered → read) except
/// for the `failed` side-state, which is reachable from sending/sent and
/// leaves only via an explicit manual resend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sending => "sending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Read => "read",
            DeliveryStatus::Failed => "failed",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "sending" => Some(DeliveryStatus::Sending),
            "sent" => Some(DeliveryStatus::Sent),
            "delivered" => Some(DeliveryStatus::Delivered),
            "read" => Some(DeliveryStatus::Read),
            "failed" => Some(DeliveryStatus::Failed),
            _ => None,
        }
    }

    /// Whether `next` is a legal transition from this state.
    /// `Failed → Sending` is the manual-resend edge.
    pub fn can_transition_to(self, next: Self) -> bool {
        use DeliveryStatus::*;
        matches!(
            (self, next),
            (Sending, Sent)
                | (Sending, Failed)
                | (Sent, Delivered)
                | (Sent, Read)
                | (Sent, Failed)
                | (Delivered, Read)
                | (Failed, Sending)
        )
    }

    /// Ranking used by the reconciliation layer: a status event may only
    /// advance a message, never move it backwards.
    pub fn rank(self) -> u8 {
        match self {
            DeliveryStatus::Sending => 0,
            DeliveryStatus::Sent => 1,
            DeliveryStatus::Failed => 2,
            DeliveryStatus::Delivered => 3,
            DeliveryStatus::Read => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    File,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::File => "file",
        }
    }

    pub fn from_str(value: &str) -> Self {
        match value {
            "file" => MessageType::File,
            _ => MessageType::Text,
        }
    }
}

/// Attachment metadata carried by `file` messages. The bytes themselves are
/// uploaded out of band; this service only stores the pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    pub name: String,
    pub size: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub job_id: Option<Uuid>,
    pub content: String,
    pub message_type: MessageType,
    pub attachment: Option<Attachment>,
    pub delivery_status: DeliveryStatus,
    pub retry_count: i32,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn conversation_key(&self) -> super::ConversationKey {
        super::ConversationKey::new(self.sender_id, self.recipient_id, self.job_id)
    }
}

/// Fields the client controls on submit; everything else (id, created_at,
/// status) is assigned at persistence time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub job_id: Option<Uuid>,
    pub content: String,
    pub message_type: MessageType,
    pub attachment: Option<Attachment>,
}

impl NewMessage {
    pub fn text(sender_id: Uuid, recipient_id: Uuid, job_id: Option<Uuid>, content: &str) -> Self {
        Self {
            sender_id,
            recipient_id,
            job_id,
            content: content.to_string(),
            message_type: MessageType::Text,
            attachment: None,
        }
    }

    /// Rejected synchronously; invalid submits are never persisted.
    pub fn validate(&self) -> Result<(), crate::error::AppError> {
        if self.sender_id == self.recipient_id {
            return Err(crate::error::AppError::Validation(
                "sender and recipient must differ".into(),
            ));
        }
        if self.content.trim().is_empty() {
            return Err(crate::error::AppError::Validation(
                "message content cannot be empty".into(),
            ));
        }
        if self.content.chars().count() > MAX_CONTENT_CHARS {
            return Err(crate::error::AppError::Validation(format!(
                "message content too long (max {MAX_CONTENT_CHARS})"
            )));
        }
        if self.message_type == MessageType::File && self.attachment.is_none() {
            return Err(crate::error::AppError::Validation(
                "file messages require attachment metadata".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_only_advances_forward() {
        use DeliveryStatus::*;
        assert!(Sending.can_transition_to(Sent));
        assert!(Sent.can_transition_to(Delivered));
        assert!(Delivered.can_transition_to(Read));
        assert!(Sent.can_transition_to(Read));

        assert!(!Sent.can_transition_to(Sending));
        assert!(!Delivered.can_transition_to(Sent));
        assert!(!Read.can_transition_to(Delivered));
        assert!(!Read.can_transition_to(Sending));
    }

    #[test]
    fn failed_is_reachable_from_sending_and_sent_only() {
        use DeliveryStatus::*;
        assert!(Sending.can_transition_to(Failed));
        assert!(Sent.can_transition_to(Failed));
        assert!(!Delivered.can_transition_to(Failed));
        assert!(!Read.can_transition_to(Failed));
    }

    #[test]
    fn failed_leaves_only_via_resend() {
        use DeliveryStatus::*;
        assert!(Failed.can_transition_to(Sending));
        assert!(!Failed.can_transition_to(Sent));
        assert!(!Failed.can_transition_to(Delivered));
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            DeliveryStatus::Sending,
            DeliveryStatus::Sent,
            DeliveryStatus::Delivered,
            DeliveryStatus::Read,
            DeliveryStatus::Failed,
        ] {
            assert_eq!(DeliveryStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(DeliveryStatus::from_str("bogus"), None);
    }

    #[test]
    fn validate_rejects_bad_submits() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert!(NewMessage::text(a, b, None, "hello").validate().is_ok());
        assert!(NewMessage::text(a, a, None, "hello").validate().is_err());
        assert!(NewMessage::text(a, b, None, "   ").validate().is_err());

        let long = "x".repeat(MAX_CONTENT_CHARS + 1);
        assert!(NewMessage::text(a, b, None, &long).validate().is_err());

        let mut file_msg = NewMessage::text(a, b, None, "report.pdf");
        file_msg.message_type = MessageType::File;
        assert!(file_msg.validate().is_err());
        file_msg.attachment = Some(Attachment {
            url: "https://cdn.taskline.dev/f/report.pdf".into(),
            name: "report.pdf".into(),
            size: 10_240,
        });
        assert!(file_msg.validate().is_ok());
    }
}
