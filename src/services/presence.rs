use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::models::ConversationKey;
use crate::state::AppState;
use crate::websocket::WsEvent;

/// Derived typing state. Online state lives in the connection registry; this
/// tracker only owns the short-lived typing timers.
#[derive(Clone)]
pub struct PresenceTracker {
    typing: Arc<RwLock<HashMap<(Uuid, ConversationKey), Instant>>>,
    ttl: Duration,
}

impl PresenceTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            typing: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Records typing with a fresh expiry. Repeated calls reset the single
    /// timer rather than stacking new ones.
    pub async fn start_typing(&self, user_id: Uuid, key: ConversationKey) {
        let mut guard = self.typing.write().await;
        guard.insert((user_id, key), Instant::now() + self.ttl);
    }

    /// Clears typing state. Returns whether an entry existed, so callers can
    /// skip the stop broadcast for signals that arrive after expiry.
    pub async fn stop_typing(&self, user_id: Uuid, key: ConversationKey) -> bool {
        let mut guard = self.typing.write().await;
        guard.remove(&(user_id, key)).is_some()
    }

    pub async fn is_typing(&self, user_id: Uuid, key: ConversationKey) -> bool {
        let guard = self.typing.read().await;
        guard
            .get(&(user_id, key))
            .map(|expires| *expires > Instant::now())
            .unwrap_or(false)
    }

    /// The conversation the user is currently typing in, if any.
    pub async fn typing_in(&self, user_id: Uuid) -> Option<ConversationKey> {
        let now = Instant::now();
        let guard = self.typing.read().await;
        guard
            .iter()
            .find(|((uid, _), expires)| *uid == user_id && **expires > now)
            .map(|((_, key), _)| *key)
    }

    /// Removes entries past their expiry and returns them so the sweeper can
    /// broadcast the implicit stop. This is the correctness backstop for
    /// lost `typing:stop` signals.
    pub async fn expire_typing(&self) -> Vec<(Uuid, ConversationKey)> {
        let now = Instant::now();
        let mut guard = self.typing.write().await;
        let expired: Vec<(Uuid, ConversationKey)> = guard
            .iter()
            .filter(|(_, expires)| **expires <= now)
            .map(|(entry, _)| *entry)
            .collect();
        for entry in &expired {
            guard.remove(entry);
        }
        expired
    }
}

/// Background maintenance loop: expires typing indicators, purges dead
/// sessions, and finalizes offline presence after the disconnect grace
/// period. All of its broadcasts are best-effort.
pub fn spawn_presence_sweeper(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(state.config.sweep_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;

            for (user_id, key) in state.presence.expire_typing().await {
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

            for (session_id, user_id) in state
                .registry
                .purge_stale(state.config.heartbeat_timeout)
                .await
            {
                tracing::debug!(%session_id, %user_id, "purged stale session");
                state.rooms.leave_all(session_id).await;
            }

            for user_id in state
                .registry
                .collect_offline(state.config.offline_grace)
                .await
            {
                state
                    .registry
                    .broadcast_all(WsEvent::PresenceOffline { user_id })
                    .await;
            }
        }
    })
}
