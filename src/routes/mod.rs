use crate::state::AppState;
use axum::middleware;
use axum::{
    routing::{delete, get, post},
    Json, Router,
};

pub mod conversations;
pub mod messages;
pub mod presence;

use conversations::{get_history, get_unread_count};
use messages::{delete_message, mark_read, resend_message, send_message};
use presence::get_presence;

use crate::websocket::handlers::ws_handler;

// OpenAPI endpoint handler
async fn openapi_json() -> Json<serde_json::Value> {
    use utoipa::OpenApi;
    Json(serde_json::to_value(crate::openapi::ApiDoc::openapi()).unwrap_or_default())
}

pub fn build_router(state: AppState) -> Router {
    // Service introspection endpoints (no API version prefix, no auth)
    let introspection = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/metrics", get(crate::metrics::metrics_handler))
        .route("/openapi.json", get(openapi_json));

    // API v1 endpoints (all business logic routes with /api/v1 prefix)
    let api_v1 = Router::new()
        .route("/messages", post(send_message))
        .route("/messages/:id", delete(delete_message))
        .route("/messages/:id/read", post(mark_read))
        .route("/messages/:id/resend", post(resend_message))
        .route("/conversations/:recipient_id/messages", get(get_history))
        .route("/conversations/:recipient_id/unread", get(get_unread_count))
        .route("/presence/:user_id", get(get_presence))
        // WebSocket endpoint (with API version prefix for consistency)
        .route("/ws", get(ws_handler));

    // Auth applies to API v1 only; introspection stays public for
    // healthchecks and scrapes.
    let secured_api_v1 = api_v1.layer(middleware::from_fn_with_state(
        state.clone(),
        crate::middleware::auth::auth_middleware,
    ));

    let router = introspection
        .merge(Router::new().nest("/api/v1", secured_api_v1))
        .layer(middleware::from_fn(crate::metrics::track_http_metrics));

    crate::middleware::with_defaults(router).with_state(state)
}
