use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::{DeliveryStatus, Message, NewMessage};
use crate::services::message_store::{MessageStore, StatusExtras};
use crate::websocket::{ConnectionRegistry, WsEvent};

/// The delivery state machine. Persistence is the durability boundary: once
/// a submit is written the message cannot be lost, whatever happens to the
/// live pushes afterwards.
#[derive(Clone)]
pub struct DeliveryEngine {
    store: Arc<dyn MessageStore>,
    registry: ConnectionRegistry,
    config: Arc<Config>,
}

impl DeliveryEngine {
    pub fn new(store: Arc<dyn MessageStore>, registry: ConnectionRegistry, config: Arc<Config>) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// Accepts an outbound message: validate, persist (`sending`), advance
    /// to `sent`, then hand off to the push path. Returns as soon as the
    /// message is durable; live delivery completes in the background.
    pub async fn submit(&self, new: NewMessage) -> AppResult<Message> {
        new.validate()?;
        let message = self.store.create_message(new).await?;
        metrics::MESSAGES_SENT_TOTAL.inc();
        self.finalize_send(message.id).await
    }

    /// Manual resend of a failed message: back to `sending`, retry count
    /// reset, then the normal send path.
    pub async fn resend(&self, message_id: Uuid, requester: Uuid) -> AppResult<Message> {
        let message = self.store.get_message(message_id).await?;
        if message.sender_id != requester {
            return Err(AppError::Forbidden);
        }
        if message.delivery_status != DeliveryStatus::Failed {
            return Err(AppError::Validation(
                "only failed messages can be resent".into(),
            ));
        }
        self.store
            .update_status(
                message_id,
                DeliveryStatus::Sending,
                StatusExtras {
                    retry_count: Some(0),
                },
            )
            .await?;
        self.finalize_send(message_id).await
    }

    /// Explicit read receipt from the recipient: advance to `read`, then
    /// push a status event to the sender's live sessions only. Not persisted
    /// as a separate message.
    pub async fn mark_read(&self, message_id: Uuid, reader: Uuid) -> AppResult<Message> {
        let message = self.store.get_message(message_id).await?;
        if message.is_deleted {
            return Err(AppError::NotFound);
        }
        if message.recipient_id != reader {
            return Err(AppError::Forbidden);
        }
        if message.is_read {
            return Ok(message);
        }
        let updated = self.store.mark_read(message_id).await?;
        self.notify_sender(&updated).await;
        Ok(updated)
    }

    /// Soft delete by the author. The row survives for history integrity.
    pub async fn delete(&self, message_id: Uuid, requester: Uuid) -> AppResult<Message> {
        let message = self.store.get_message(message_id).await?;
        if message.sender_id != requester {
            return Err(AppError::Forbidden);
        }
        self.store.soft_delete(message_id).await
    }

    /// Shared tail of submit/resend: `sent` marks the offline-queue state,
    /// then the push task runs if the recipient has live sessions.
    async fn finalize_send(&self, message_id: Uuid) -> AppResult<Message> {
        let message = self
            .store
            .update_status(message_id, DeliveryStatus::Sent, StatusExtras::default())
            .await?;

        if self.registry.sessions_for(message.recipient_id).await.is_empty() {
            // Offline queue: the message waits in the store until the
            // recipient's client re-fetches history on reconnect.
            tracing::debug!(message_id = %message.id, recipient_id = %message.recipient_id,
                "recipient offline, message queued at sent");
            return Ok(message);
        }

        let engine = self.clone();
        let pushed = message.clone();
        tokio::spawn(async move { engine.dispatch(pushed).await });
        Ok(message)
    }

    /// Push loop with bounded exponential backoff. Cancels (leaving the
    /// message at `sent`) if the recipient deregisters mid-retry; exhausting
    /// retries against live sessions marks the message `failed` and surfaces
    /// it to the sender for manual resend.
    async fn dispatch(&self, mut message: Message) {
        let max_attempts = self.config.max_push_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            let sessions = self.registry.sessions_for(message.recipient_id).await;
            if sessions.is_empty() {
                tracing::debug!(message_id = %message.id,
                    "recipient deregistered mid-retry, leaving message at sent");
                return;
            }

            attempt += 1;
            let event = WsEvent::MessageNew {
                message: message.clone(),
            };
            let delivered = sessions.iter().any(|s| s.push(event.clone()).is_ok());

            if delivered {
                match self
                    .store
                    .update_status(message.id, DeliveryStatus::Delivered, StatusExtras::default())
                    .await
                {
                    Ok(updated) => self.notify_sender(&updated).await,
                    Err(e) => {
                        tracing::error!(message_id = %message.id, error = %e,
                            "failed to record delivery")
                    }
                }
                return;
            }

            metrics::DELIVERY_RETRIES_TOTAL.inc();
            match self
                .store
                .update_status(
                    message.id,
                    DeliveryStatus::Sent,
                    StatusExtras {
                        retry_count: Some(attempt as i32),
                    },
                )
                .await
            {
                Ok(updated) => message = updated,
                Err(e) => tracing::warn!(message_id = %message.id, error = %e,
                    "failed to record retry"),
            }

            if attempt >= max_attempts {
                break;
            }
            let backoff = self.config.push_backoff_base * 2u32.pow(attempt - 1);
            tokio::time::sleep(backoff).await;
        }

        metrics::MESSAGES_FAILED_TOTAL.inc();
        tracing::warn!(message_id = %message.id, attempts = attempt,
            "push retries exhausted, marking message failed");
        match self
            .store
            .update_status(message.id, DeliveryStatus::Failed, StatusExtras::default())
            .await
        {
            Ok(updated) => self.notify_sender(&updated).await,
            Err(e) => {
                tracing::error!(message_id = %message.id, error = %e, "failed to record failure")
            }
        }
    }

    /// Status pushes go to the sender's live sessions; best-effort.
    async fn notify_sender(&self, message: &Message) {
        let event = WsEvent::status_of(message);
        for session in self.registry.sessions_for(message.sender_id).await {
            let _ = session.push(event.clone());
        }
    }
}
