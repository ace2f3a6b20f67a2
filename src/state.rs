use crate::{
    config::Config,
    services::{delivery::DeliveryEngine, message_store::MessageStore, presence::PresenceTracker},
    websocket::{ConnectionRegistry, RoomRouter},
};
use std::sync::Arc;

/// The single injected service object handed to every handler. Presence and
/// connection state is reachable from any request without per-request setup,
/// and tests swap in an in-memory store and fake sessions.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MessageStore>,
    pub registry: ConnectionRegistry,
    pub rooms: RoomRouter,
    pub presence: PresenceTracker,
    pub delivery: DeliveryEngine,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Arc<dyn MessageStore>, config: Arc<Config>) -> Self {
        let registry = ConnectionRegistry::new();
        let rooms = RoomRouter::new();
        let presence = PresenceTracker::new(config.typing_ttl);
        let delivery = DeliveryEngine::new(store.clone(), registry.clone(), config.clone());
        Self {
            store,
            registry,
            rooms,
            presence,
            delivery,
            config,
        }
    }
}
