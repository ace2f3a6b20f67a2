use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Attachment, Message, MessageType, NewMessage};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub recipient_id: Uuid,
    pub content: String,
    pub job_id: Option<Uuid>,
    #[serde(default)]
    pub message_type: Option<MessageType>,
    pub attachment: Option<Attachment>,
}

/// Submit a message. The response carries the persisted message (already at
/// `sent`); live delivery to the recipient continues in the background.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
    Json(body): Json<SendMessageRequest>,
) -> AppResult<(StatusCode, Json<Message>)> {
    let new = NewMessage {
        sender_id: user_id,
        recipient_id: body.recipient_id,
        job_id: body.job_id,
        content: body.content,
        message_type: body.message_type.unwrap_or(MessageType::Text),
        attachment: body.attachment,
    };
    let message = state.delivery.submit(new).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// Explicit read receipt from the recipient.
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
    Path(message_id): Path<Uuid>,
) -> AppResult<Json<Message>> {
    let message = state.delivery.mark_read(message_id, user_id).await?;
    Ok(Json(message))
}

/// Manual resend of a failed message.
pub async fn resend_message(
    State(state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
    Path(message_id): Path<Uuid>,
) -> AppResult<Json<Message>> {
    let message = state.delivery.resend(message_id, user_id).await?;
    Ok(Json(message))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
    Path(message_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.delivery.delete(message_id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
