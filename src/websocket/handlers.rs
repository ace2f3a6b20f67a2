use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::middleware::auth::verify_jwt;
use crate::state::AppState;
use crate::websocket::{WsClientEvent, WsEvent};

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// Resolves the connecting user from the query token or the Authorization
/// header. Browsers cannot set headers on WebSocket upgrades, hence the
/// query-parameter path.
fn authenticate(params: &WsParams, headers: &HeaderMap, secret: &str) -> Option<Uuid> {
    let token = params.token.clone().or_else(|| {
        headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "))
            .map(|s| s.to_string())
    })?;

    let claims = verify_jwt(&token, secret).ok()?;
    Uuid::parse_str(&claims.sub).ok()
}

pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let Some(user_id) = authenticate(&params, &headers, &state.config.jwt_secret) else {
        warn!("websocket connection rejected: invalid or missing token");
        return axum::http::StatusCode::UNAUTHORIZED.into_response();
    };

    ws.on_upgrade(move |socket| handle_socket(state, user_id, socket))
}

async fn handle_socket(state: AppState, user_id: Uuid, socket: WebSocket) {
    let session_id = Uuid::new_v4();
    let (mut rx, came_online) = state.registry.register(user_id, session_id).await;
    debug!(%user_id, %session_id, "websocket session registered");

    if came_online {
        state
            .registry
            .broadcast_all_except(user_id, WsEvent::PresenceOnline { user_id })
            .await;
    }

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            // pushes from the delivery engine, rooms, and presence fan-out
            maybe = rx.recv() => {
                match maybe {
                    Some(event) => {
                        let Ok(txt) = event.to_json() else {
                            tracing::error!(event_type = event.event_type(),
                                "failed to serialize outbound event");
                            continue;
                        };
                        if sender.send(Message::Text(txt)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            // inbound client events
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(txt))) => {
                        match serde_json::from_str::<WsClientEvent>(&txt) {
                            Ok(event) => handle_client_event(&state, user_id, session_id, event).await,
                            Err(e) => debug!(%user_id, error = %e, "ignoring malformed client event"),
                        }
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        state.registry.touch(session_id).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(%user_id, %session_id, error = %e, "websocket receive error");
                        break;
                    }
                }
            }
        }
    }

    state.rooms.leave_all(session_id).await;
    state.registry.deregister(session_id).await;
    debug!(%user_id, %session_id, "websocket session closed");
    // offline presence is finalized by the sweeper after the grace period
}

async fn handle_client_event(
    state: &AppState,
    user_id: Uuid,
    session_id: Uuid,
    event: WsClientEvent,
) {
    state.registry.touch(session_id).await;

    match event {
        WsClientEvent::TypingStart { conversation } => {
            let key = conversation.normalized();
            if !key.involves(user_id) {
                warn!(%user_id, %key, "ignoring typing event for foreign conversation");
                return;
            }
            state.presence.start_typing(user_id, key).await;
            state
                .rooms
                .broadcast(
                    &state.registry,
                    &key,
                    WsEvent::TypingStart {
                        user_id,
                        conversation: key,
                    },
                )
                .await;
        }
        WsClientEvent::TypingStop { conversation } => {
            let key = conversation.normalized();
            if !key.involves(user_id) {
                return;
            }
            // skip the broadcast when expiry already cleared the state
            if state.presence.stop_typing(user_id, key).await {
                state
                    .rooms
                    .broadcast(
                        &state.registry,
                        &key,
                        WsEvent::TypingStop {
                            user_id,
                            conversation: key,
                        },
                    )
                    .await;
            }
        }
        WsClientEvent::RoomJoin { conversation } => {
            let key = conversation.normalized();
            if !key.involves(user_id) {
                warn!(%user_id, %key, "ignoring join for foreign conversation");
                return;
            }
            state.rooms.join(session_id, key).await;
        }
        WsClientEvent::RoomLeave { conversation } => {
            state.rooms.leave(session_id, conversation.normalized()).await;
        }
        WsClientEvent::Heartbeat => {}
    }
}
