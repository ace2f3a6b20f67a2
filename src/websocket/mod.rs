use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::RwLock;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::ConversationKey;

pub mod events;
pub mod handlers;

pub use events::{WsClientEvent, WsEvent};

/// A live, authenticated transport session capable of receiving pushed
/// events. The sender side feeds the socket task's outbound loop.
#[derive(Clone)]
pub struct SessionHandle {
    pub session_id: Uuid,
    pub user_id: Uuid,
    sender: UnboundedSender<WsEvent>,
}

impl SessionHandle {
    /// Push acknowledgment is a successful write into the session channel;
    /// a closed channel is a socket write failure.
    pub fn push(&self, event: WsEvent) -> AppResult<()> {
        self.sender
            .send(event)
            .map_err(|_| AppError::Delivery(format!("session {} channel closed", self.session_id)))
    }
}

struct SessionEntry {
    user_id: Uuid,
    sender: UnboundedSender<WsEvent>,
    last_heartbeat: Instant,
}

#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<Uuid, SessionEntry>,
    by_user: HashMap<Uuid, HashSet<Uuid>>,
    /// Users whose last session just dropped; they stay "online" until the
    /// grace period elapses so a page refresh does not flap presence.
    pending_offline: HashMap<Uuid, Instant>,
}

/// Maps authenticated users to their live sessions. Process-wide, in-memory
/// only; rebuilt from scratch (all clients re-register) after a restart.
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the session's push channel and registers it. Idempotent per
    /// session id. Returns `(receiver, came_online)`; `came_online` is true
    /// only when this is the user's first session and no grace window was
    /// pending (a reconnect inside the grace window is not a fresh online).
    pub async fn register(
        &self,
        user_id: Uuid,
        session_id: Uuid,
    ) -> (UnboundedReceiver<WsEvent>, bool) {
        let (tx, rx) = unbounded_channel();
        let mut guard = self.inner.write().await;
        let was_pending = guard.pending_offline.remove(&user_id).is_some();
        let had_sessions = guard
            .by_user
            .get(&user_id)
            .map(|s| !s.is_empty())
            .unwrap_or(false);

        guard.sessions.insert(
            session_id,
            SessionEntry {
                user_id,
                sender: tx,
                last_heartbeat: Instant::now(),
            },
        );
        guard.by_user.entry(user_id).or_default().insert(session_id);
        crate::metrics::ACTIVE_SESSIONS.set(guard.sessions.len() as i64);

        (rx, !had_sessions && !was_pending)
    }

    /// Refreshes the session's liveness timestamp.
    pub async fn touch(&self, session_id: Uuid) {
        let mut guard = self.inner.write().await;
        if let Some(entry) = guard.sessions.get_mut(&session_id) {
            entry.last_heartbeat = Instant::now();
        }
    }

    /// Removes a session. Unknown session ids are a no-op (idempotent
    /// cleanup). The user's offline grace window starts when their last
    /// session is gone; the sweeper finalizes it.
    pub async fn deregister(&self, session_id: Uuid) -> Option<Uuid> {
        let mut guard = self.inner.write().await;
        let entry = guard.sessions.remove(&session_id)?;
        let user_id = entry.user_id;
        let now_empty = match guard.by_user.get_mut(&user_id) {
            Some(set) => {
                set.remove(&session_id);
                set.is_empty()
            }
            None => false,
        };
        if now_empty {
            guard.by_user.remove(&user_id);
            guard.pending_offline.insert(user_id, Instant::now());
        }
        crate::metrics::ACTIVE_SESSIONS.set(guard.sessions.len() as i64);
        Some(user_id)
    }

    pub async fn session(&self, session_id: Uuid) -> Option<SessionHandle> {
        let guard = self.inner.read().await;
        guard.sessions.get(&session_id).map(|entry| SessionHandle {
            session_id,
            user_id: entry.user_id,
            sender: entry.sender.clone(),
        })
    }

    /// Current live sessions for a user, possibly empty.
    pub async fn sessions_for(&self, user_id: Uuid) -> Vec<SessionHandle> {
        let guard = self.inner.read().await;
        let Some(ids) = guard.by_user.get(&user_id) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| {
                guard.sessions.get(id).map(|entry| SessionHandle {
                    session_id: *id,
                    user_id: entry.user_id,
                    sender: entry.sender.clone(),
                })
            })
            .collect()
    }

    /// Online means at least one live session, or a dropped session still
    /// inside the disconnect grace window.
    pub async fn is_online(&self, user_id: Uuid) -> bool {
        let guard = self.inner.read().await;
        guard
            .by_user
            .get(&user_id)
            .map(|s| !s.is_empty())
            .unwrap_or(false)
            || guard.pending_offline.contains_key(&user_id)
    }

    /// Sessions with no heartbeat for longer than `timeout` are presumed
    /// dead and purged. Returns the removed `(session_id, user_id)` pairs.
    pub async fn purge_stale(&self, timeout: Duration) -> Vec<(Uuid, Uuid)> {
        let stale: Vec<Uuid> = {
            let guard = self.inner.read().await;
            guard
                .sessions
                .iter()
                .filter(|(_, entry)| entry.last_heartbeat.elapsed() > timeout)
                .map(|(id, _)| *id)
                .collect()
        };
        let mut removed = Vec::with_capacity(stale.len());
        for session_id in stale {
            if let Some(user_id) = self.deregister(session_id).await {
                removed.push((session_id, user_id));
            }
        }
        removed
    }

    /// Users whose grace window has elapsed without a reconnect. They are
    /// now offline; the caller broadcasts the presence change.
    pub async fn collect_offline(&self, grace: Duration) -> Vec<Uuid> {
        let mut guard = self.inner.write().await;
        let expired: Vec<Uuid> = guard
            .pending_offline
            .iter()
            .filter(|(user_id, since)| {
                since.elapsed() >= grace
                    && guard
                        .by_user
                        .get(*user_id)
                        .map(|s| s.is_empty())
                        .unwrap_or(true)
            })
            .map(|(user_id, _)| *user_id)
            .collect();
        for user_id in &expired {
            guard.pending_offline.remove(user_id);
        }
        expired
    }

    /// Best-effort push to every live session (presence fan-out).
    pub async fn broadcast_all(&self, event: WsEvent) {
        let guard = self.inner.read().await;
        for entry in guard.sessions.values() {
            let _ = entry.sender.send(event.clone());
        }
    }

    /// Presence fan-out variant that skips the subject's own sessions; a
    /// user does not need to hear about their own state changes.
    pub async fn broadcast_all_except(&self, user_id: Uuid, event: WsEvent) {
        let guard = self.inner.read().await;
        for entry in guard.sessions.values() {
            if entry.user_id != user_id {
                let _ = entry.sender.send(event.clone());
            }
        }
    }
}

#[derive(Default)]
struct RouterInner {
    rooms: HashMap<ConversationKey, HashSet<Uuid>>,
    by_session: HashMap<Uuid, HashSet<ConversationKey>>,
}

/// Groups sessions by conversation key so room-scoped events (typing) only
/// reach sessions that joined the thread. Message delivery goes through the
/// registry's per-user path instead and does not depend on membership.
#[derive(Default, Clone)]
pub struct RoomRouter {
    inner: Arc<RwLock<RouterInner>>,
}

impl RoomRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn join(&self, session_id: Uuid, key: ConversationKey) {
        let mut guard = self.inner.write().await;
        guard.rooms.entry(key).or_default().insert(session_id);
        guard.by_session.entry(session_id).or_default().insert(key);
    }

    pub async fn leave(&self, session_id: Uuid, key: ConversationKey) {
        let mut guard = self.inner.write().await;
        if let Some(members) = guard.rooms.get_mut(&key) {
            members.remove(&session_id);
            if members.is_empty() {
                guard.rooms.remove(&key);
            }
        }
        if let Some(keys) = guard.by_session.get_mut(&session_id) {
            keys.remove(&key);
            if keys.is_empty() {
                guard.by_session.remove(&session_id);
            }
        }
    }

    pub async fn leave_all(&self, session_id: Uuid) {
        let keys: Vec<ConversationKey> = {
            let guard = self.inner.read().await;
            guard
                .by_session
                .get(&session_id)
                .map(|keys| keys.iter().copied().collect())
                .unwrap_or_default()
        };
        for key in keys {
            self.leave(session_id, key).await;
        }
    }

    pub async fn members(&self, key: &ConversationKey) -> Vec<Uuid> {
        let guard = self.inner.read().await;
        guard
            .rooms
            .get(key)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Best-effort fan-out to every session joined to the room. Dead
    /// sessions are skipped; the registry sweeper owns their cleanup.
    pub async fn broadcast(
        &self,
        registry: &ConnectionRegistry,
        key: &ConversationKey,
        event: WsEvent,
    ) {
        for session_id in self.members(key).await {
            if let Some(handle) = registry.session(session_id).await {
                let _ = handle.push(event.clone());
            }
        }
    }
}
