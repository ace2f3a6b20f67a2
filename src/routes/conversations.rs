use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{ConversationKey, Message};
use crate::services::message_store::HistoryPage;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub job_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Conversation history between the caller and `recipient_id`, ordered by
/// `created_at` ascending. Clients merge this with live pushes through the
/// reconciliation layer on every reconnect.
pub async fn get_history(
    State(state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
    Path(recipient_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<Vec<Message>>> {
    let key = ConversationKey::new(user_id, recipient_id, query.job_id);
    let mut page = HistoryPage::default();
    if let Some(limit) = query.limit {
        page.limit = limit;
    }
    if let Some(offset) = query.offset {
        page.offset = offset;
    }
    let history = state.store.conversation_history(&key, page).await?;
    Ok(Json(history))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnreadCountResponse {
    pub count: i64,
}

/// Unread badge for one thread: messages addressed to the caller that have
/// not been marked read.
pub async fn get_unread_count(
    State(state): State<AppState>,
    Extension(user_id): Extension<Uuid>,
    Path(recipient_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<UnreadCountResponse>> {
    let key = ConversationKey::new(user_id, recipient_id, query.job_id);
    let count = state.store.unread_count(user_id, &key).await?;
    Ok(Json(UnreadCountResponse { count }))
}
