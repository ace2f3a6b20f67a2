use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::ConversationKey;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct PresenceResponse {
    pub user_id: Uuid,
    pub online: bool,
    pub typing_in: Option<ConversationKey>,
}

/// Derived presence snapshot. Online accounts for the disconnect grace
/// period; typing reflects the auto-expiring indicator state.
pub async fn get_presence(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<PresenceResponse>> {
    let online = state.registry.is_online(user_id).await;
    let typing_in = state.presence.typing_in(user_id).await;
    Ok(Json(PresenceResponse {
        user_id,
        online,
        typing_in,
    }))
}
