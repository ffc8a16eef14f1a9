use std::env;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
    pub request_timeout: Duration,
    /// Attempts for a first-join write that races another join of the same member
    pub upsert_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://bookroles.db?mode=rwc".to_string(),
            port: 8000,
            cors_allowed_origins: Vec::new(),
            request_timeout: Duration::from_secs(30),
            upsert_attempts: 3,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .ok()
                .map(|s| {
                    s.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            request_timeout: env::var("REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            upsert_attempts: env::var("UPSERT_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse::<u32>().ok())
                .map(|n| n.max(1))
                .unwrap_or(defaults.upsert_attempts),
        }
    }
}
