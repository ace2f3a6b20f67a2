use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{ConversationKey, DeliveryStatus, Message, NewMessage};
use crate::services::message_store::{apply_transition, HistoryPage, MessageStore, StatusExtras};

/// In-process store with the same contract as the Postgres implementation.
/// Used by tests and local development; nothing survives a restart.
#[derive(Clone, Default)]
pub struct MemoryMessageStore {
    messages: Arc<Mutex<HashMap<Uuid, Message>>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_message<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Message) -> AppResult<T>,
    ) -> AppResult<T> {
        let mut guard = self.messages.lock().unwrap_or_else(|e| e.into_inner());
        let message = guard.get_mut(&id).ok_or(AppError::NotFound)?;
        f(message)
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
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

        let mut guard = self.messages.lock().unwrap_or_else(|e| e.into_inner());
        guard.insert(message.id, message.clone());
        Ok(message)
    }

    async fn get_message(&self, id: Uuid) -> AppResult<Message> {
        let guard = self.messages.lock().unwrap_or_else(|e| e.into_inner());
        guard.get(&id).cloned().ok_or(AppError::NotFound)
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: DeliveryStatus,
        extras: StatusExtras,
    ) -> AppResult<Message> {
        self.with_message(id, |message| {
            apply_transition(message, status, &extras)?;
            Ok(message.clone())
        })
    }

    async fn mark_read(&self, id: Uuid) -> AppResult<Message> {
        self.with_message(id, |message| {
            if message.is_read {
                return Ok(message.clone());
            }
            apply_transition(message, DeliveryStatus::Read, &StatusExtras::default())?;
            message.is_read = true;
            message.read_at = Some(Utc::now());
            Ok(message.clone())
        })
    }

    async fn soft_delete(&self, id: Uuid) -> AppResult<Message> {
        self.with_message(id, |message| {
            if !message.is_deleted {
                message.is_deleted = true;
                message.deleted_at = Some(Utc::now());
            }
            Ok(message.clone())
        })
    }

    async fn conversation_history(
        &self,
        key: &ConversationKey,
        page: HistoryPage,
    ) -> AppResult<Vec<Message>> {
        let page = page.clamped();
        let guard = self.messages.lock().unwrap_or_else(|e| e.into_inner());
        let mut rows: Vec<Message> = guard
            .values()
            .filter(|m| !m.is_deleted && m.conversation_key() == *key)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(rows
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect())
    }

    async fn unread_count(&self, recipient: Uuid, key: &ConversationKey) -> AppResult<i64> {
        if key.peer_of(recipient).is_none() {
            return Err(AppError::Validation("recipient not in conversation".into()));
        }
        let guard = self.messages.lock().unwrap_or_else(|e| e.into_inner());
        Ok(guard
            .values()
            .filter(|m| {
                m.recipient_id == recipient
                    && !m.is_read
                    && !m.is_deleted
                    && m.conversation_key() == *key
            })
            .count() as i64)
    }
}
