use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Attachment, ConversationKey, DeliveryStatus, Message, MessageType, NewMessage};

/// Optional fields applied alongside a status transition.
#[derive(Debug, Clone, Default)]
pub struct StatusExtras {
    pub retry_count: Option<i32>,
}

#[derive(Debug, Clone, Copy)]
pub struct HistoryPage {
    pub limit: i64,
    pub offset: i64,
}

impl HistoryPage {
    /// History fetches are capped at 200 rows per page.
    pub fn clamped(self) -> Self {
        Self {
            limit: self.limit.clamp(1, 200),
            offset: self.offset.max(0),
        }
    }
}

impl Default for HistoryPage {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

/// Persistence collaborator for the delivery engine. The Postgres
/// implementation backs production; an in-memory implementation backs unit
/// and integration tests so the engine can be exercised without a database.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persists a new message with an assigned id, `created_at`, and status
    /// `sending`. Fails with `Validation` before any write on a bad submit.
    async fn create_message(&self, new: NewMessage) -> AppResult<Message>;

    /// Direct fetch by id, soft-deleted rows included.
    async fn get_message(&self, id: Uuid) -> AppResult<Message>;

    /// Advances delivery status. Fails with `NotFound` for unknown ids and
    /// `Validation` for transitions that would move a message backwards.
    async fn update_status(
        &self,
        id: Uuid,
        status: DeliveryStatus,
        extras: StatusExtras,
    ) -> AppResult<Message>;

    /// Sets `is_read`/`read_at` and advances status to `read`. Idempotent.
    async fn mark_read(&self, id: Uuid) -> AppResult<Message>;

    /// Soft delete; the row stays for history integrity. Idempotent.
    async fn soft_delete(&self, id: Uuid) -> AppResult<Message>;

    /// Conversation history ordered by `created_at` ascending with id as the
    /// tie-break, excluding soft-deleted rows.
    async fn conversation_history(
        &self,
        key: &ConversationKey,
        page: HistoryPage,
    ) -> AppResult<Vec<Message>>;

    /// Unread messages addressed to `recipient` within one conversation.
    async fn unread_count(&self, recipient: Uuid, key: &ConversationKey) -> AppResult<i64>;
}

/// Shared transition guard: equal status is an idempotent no-op, everything
/// else must follow the forward-only state machine.
pub(crate) fn apply_transition(
    message: &mut Message,
    status: DeliveryStatus,
    extras: &StatusExtras,
) -> AppResult<()> {
    if message.delivery_status != status && !message.delivery_status.can_transition_to(status) {
        return Err(AppError::Validation(format!(
            "illegal status transition {} -> {}",
            message.delivery_status.as_str(),
            status.as_str()
        )));
    }
    message.delivery_status = status;
    if let Some(retry_count) = extras.retry_count {
        message.retry_count = retry_count;
    }
    Ok(())
}

#[derive(Clone)]
pub struct PgMessageStore {
    db: Pool<Postgres>,
}

impl PgMessageStore {
    pub fn new(db: Pool<Postgres>) -> Self {
        Self { db }
    }

    async fn fetch(&self, id: Uuid) -> AppResult<Message> {
        let row = sqlx::query("SELECT * FROM messages WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(AppError::NotFound)?;
        Ok(row_to_message(&row))
    }

    async fn persist(&self, message: &Message) -> AppResult<()> {
        sqlx::query(
            "UPDATE messages SET delivery_status=$2, retry_count=$3, is_read=$4, read_at=$5, \
             is_deleted=$6, deleted_at=$7, edited_at=$8 WHERE id=$1",
        )
        .bind(message.id)
        .bind(message.delivery_status.as_str())
        .bind(message.retry_count)
        .bind(message.is_read)
        .bind(message.read_at)
        .bind(message.is_deleted)
        .bind(message.deleted_at)
        .bind(message.edited_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}

fn row_to_message(row: &PgRow) -> Message {
    let status: String = row.get("delivery_status");
    let message_type: String = row.get("message_type");
    let attachment_url: Option<String> = row.get("attachment_url");
    let attachment = attachment_url.map(|url| Attachment {
        url,
        name: row.get::<Option<String>, _>("attachment_name").unwrap_or_default(),
        size: row.get::<Option<i64>, _>("attachment_size").unwrap_or_default(),
    });

    Message {
        id: row.get("id"),
        sender_id: row.get("sender_id"),
        recipient_id: row.get("recipient_id"),
        job_id: row.get("job_id"),
        content: row.get("content"),
        message_type: MessageType::from_str(&message_type),
        attachment,
        delivery_status: DeliveryStatus::from_str(&status).unwrap_or(DeliveryStatus::Sent),
        retry_count: row.get("retry_count"),
        is_read: row.get("is_read"),
        read_at: row.get("read_at"),
        is_deleted: row.get("is_deleted"),
        deleted_at: row.get("deleted_at"),
        created_at: row.get("created_at"),
        edited_at: row.get("edited_at"),
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn create_message(&self, new: NewMessage) -> AppResult<Message> {
        new.validate()?;

        let message = Message {
            id: Uuid::new_v4(),
            sender_id: new.sender_id,
            recipient_id: new.recipient_id,
            job_id: new.job_id,
            content: new.content.trim().to_string(),
            message_type: new.message_type,
            attachment: new.attachment,
            delivery_status: DeliveryStatus::Sending,
            retry_count: 0,
            is_read: false,
            read_at: None,
            is_deleted: false,
            deleted_at: None,
            created_at: Utc::now(),
            edited_at: None,
        };

        sqlx::query(
            "INSERT INTO messages (id, sender_id, recipient_id, job_id, content, message_type, \
             attachment_url, attachment_name, attachment_size, delivery_status, retry_count, \
             is_read, is_deleted, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(message.id)
        .bind(message.sender_id)
        .bind(message.recipient_id)
        .bind(message.job_id)
        .bind(&message.content)
        .bind(message.message_type.as_str())
        .bind(message.attachment.as_ref().map(|a| a.url.clone()))
        .bind(message.attachment.as_ref().map(|a| a.name.clone()))
        .bind(message.attachment.as_ref().map(|a| a.size))
        .bind(message.delivery_status.as_str())
        .bind(message.retry_count)
        .bind(message.is_read)
        .bind(message.is_deleted)
        .bind(message.created_at)
        .execute(&self.db)
        .await?;

        Ok(message)
    }

    async fn get_message(&self, id: Uuid) -> AppResult<Message> {
        self.fetch(id).await
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: DeliveryStatus,
        extras: StatusExtras,
    ) -> AppResult<Message> {
        let mut message = self.fetch(id).await?;
        apply_transition(&mut message, status, &extras)?;
        self.persist(&message).await?;
        Ok(message)
    }

    async fn mark_read(&self, id: Uuid) -> AppResult<Message> {
        let mut message = self.fetch(id).await?;
        if message.is_read {
            return Ok(message);
        }
        apply_transition(&mut message, DeliveryStatus::Read, &StatusExtras::default())?;
        message.is_read = true;
        message.read_at = Some(Utc::now());
        self.persist(&message).await?;
        Ok(message)
    }

    async fn soft_delete(&self, id: Uuid) -> AppResult<Message> {
        let mut message = self.fetch(id).await?;
        if message.is_deleted {
            return Ok(message);
        }
        message.is_deleted = true;
        message.deleted_at = Some(Utc::now());
        self.persist(&message).await?;
        Ok(message)
    }

    async fn conversation_history(
        &self,
        key: &ConversationKey,
        page: HistoryPage,
    ) -> AppResult<Vec<Message>> {
        let page = page.clamped();
        let rows = sqlx::query(
            "SELECT * FROM messages \
             WHERE ((sender_id = $1 AND recipient_id = $2) OR (sender_id = $2 AND recipient_id = $1)) \
               AND job_id IS NOT DISTINCT FROM $3 \
               AND is_deleted = FALSE \
             ORDER BY created_at ASC, id ASC \
             LIMIT $4 OFFSET $5",
        )
        .bind(key.user_a)
        .bind(key.user_b)
        .bind(key.job_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.iter().map(row_to_message).collect())
    }

    async fn unread_count(&self, recipient: Uuid, key: &ConversationKey) -> AppResult<i64> {
        let sender = key
            .peer_of(recipient)
            .ok_or_else(|| AppError::Validation("recipient not in conversation".into()))?;
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*)::bigint FROM messages \
             WHERE recipient_id = $1 AND sender_id = $2 \
               AND job_id IS NOT DISTINCT FROM $3 \
               AND is_read = FALSE AND is_deleted = FALSE",
        )
        .bind(recipient)
        .bind(sender)
        .bind(key.job_id)
        .fetch_one(&self.db)
        .await?;
        Ok(count)
    }
}
