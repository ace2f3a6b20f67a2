use dotenvy::dotenv;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub jwt_secret: String,
    /// Sessions with no heartbeat for this long are presumed dead and purged.
    pub heartbeat_timeout: Duration,
    /// A user's last session must stay gone this long before the user is
    /// marked offline (absorbs page-refresh reconnects).
    pub offline_grace: Duration,
    /// Typing state auto-expires after this idle window even if the explicit
    /// stop signal is lost.
    pub typing_ttl: Duration,
    /// Bounded push attempts before a message is marked `failed`.
    pub max_push_attempts: u32,
    pub push_backoff_base: Duration,
    pub sweep_interval: Duration,
    pub db_max_connections: u32,
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, crate::error::AppError> {
        dotenv().ok();
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| crate::error::AppError::Config("DATABASE_URL missing".into()))?;
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| crate::error::AppError::Config("JWT_SECRET missing".into()))?;
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8080);

        Ok(Self {
            database_url,
            port,
            jwt_secret,
            heartbeat_timeout: Duration::from_secs(env_u64("HEARTBEAT_TIMEOUT_SECS", 30)),
            offline_grace: Duration::from_secs(env_u64("OFFLINE_GRACE_SECS", 5)),
            typing_ttl: Duration::from_millis(env_u64("TYPING_TTL_MS", 2000)),
            max_push_attempts: env_u64("MAX_PUSH_ATTEMPTS", 3) as u32,
            push_backoff_base: Duration::from_millis(env_u64("PUSH_BACKOFF_BASE_MS", 250)),
            sweep_interval: Duration::from_millis(env_u64("SWEEP_INTERVAL_MS", 500)),
            db_max_connections: env_u64("DB_MAX_CONNECTIONS", 10) as u32,
        })
    }
}

impl Default for Config {
    /// Local-development defaults; integration tests tighten the timing
    /// knobs instead of waiting on production-scale backoffs.
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/taskline".into(),
            port: 8080,
            jwt_secret: "dev-secret".into(),
            heartbeat_timeout: Duration::from_secs(30),
            offline_grace: Duration::from_secs(5),
            typing_ttl: Duration::from_millis(2000),
            max_push_attempts: 3,
            push_backoff_base: Duration::from_millis(250),
            sweep_interval: Duration::from_millis(500),
            db_max_connections: 10,
        }
    }
}
