use std::sync::Arc;

use taskline_messaging::{
    config, db, error, logging, routes,
    services::{message_store::PgMessageStore, presence::spawn_presence_sweeper},
    state::AppState,
};

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    logging::init_tracing();
    let cfg = Arc::new(config::Config::from_env()?);

    let pool = db::init_pool(&cfg.database_url, cfg.db_max_connections)
        .await
        .map_err(|e| error::AppError::StartServer(format!("db: {e}")))?;

    // Run embedded migrations (idempotent). Migration failures are fatal -
    // the schema must be in sync before the delivery engine touches it.
    db::MIGRATOR
        .run(&pool)
        .await
        .map_err(|e| error::AppError::StartServer(format!("database migrations failed: {e}")))?;

    let store = Arc::new(PgMessageStore::new(pool));
    let state = AppState::new(store, cfg.clone());

    // Background maintenance: typing expiry, dead-session purge, offline
    // grace finalization. Dies with the process, like the registries it
    // sweeps; clients re-register on restart.
    let _sweeper = spawn_presence_sweeper(state.clone());

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, "starting taskline-messaging");

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| error::AppError::StartServer(e.to_string()))?;

    axum::serve(listener, routes::build_router(state))
        .await
        .map_err(|e| error::AppError::StartServer(e.to_string()))?;

    Ok(())
}
