use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{encode, EncodingKey, Header};
use taskline_messaging::{
    config::Config, middleware::auth::Claims, routes, services::memory_store::MemoryMessageStore,
    state::AppState,
};
use uuid::Uuid;

pub const TEST_SECRET: &str = "test-secret";

pub fn test_config() -> Config {
    Config {
        jwt_secret: TEST_SECRET.into(),
        // tight timing knobs so retry/backoff tests finish quickly
        max_push_attempts: 3,
        push_backoff_base: Duration::from_millis(10),
        offline_grace: Duration::from_millis(100),
        heartbeat_timeout: Duration::from_secs(30),
        typing_ttl: Duration::from_millis(200),
        sweep_interval: Duration::from_millis(20),
        ..Config::default()
    }
}

pub fn test_state() -> AppState {
    AppState::new(Arc::new(MemoryMessageStore::new()), Arc::new(test_config()))
}

pub fn token_for(user_id: Uuid) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: chrono::Utc::now().timestamp() + 600,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .expect("failed to sign test token")
}

/// Serves the full router on an ephemeral port and returns the base URL.
/// The presence sweeper runs like it does in production, so typing expiry
/// and offline grace behave end to end.
pub async fn spawn_app(state: AppState) -> String {
    taskline_messaging::services::presence::spawn_presence_sweeper(state.clone());
    let app = routes::build_router(state);
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
        .await
        .expect("failed to bind test listener");
    let addr = listener.local_addr().expect("listener has no local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server died");
    });
    format!("http://{}:{}", addr.ip(), addr.port())
}
