use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub stripe_secret_key: String,
    pub stripe_price_id: String,
    pub openai_api_key: String,
    /// Public origin of the web app, used for Stripe success/cancel/return URLs.
    pub app_base_url: String,
    /// Guards debug/admin routes. `None` disables them entirely.
    pub admin_api_key: Option<String>,
    pub port: u16,
    pub rust_log: String,
    pub sync: SyncSettings,
}

/// Tunables for subscription reconciliation.
#[derive(Debug, Clone, Copy)]
pub struct SyncSettings {
    /// A sync that started within this window suppresses new ones.
    pub debounce: Duration,
    /// Cache rows older than this force a full sync on non-critical triggers.
    pub cache_ttl: chrono::Duration,
    /// Period of the scheduled `DailyCheck` sweep.
    pub daily_interval: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(30),
            cache_ttl: chrono::Duration::hours(24),
            daily_interval: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = SyncSettings::default();
        let sync = SyncSettings {
            debounce: Duration::from_secs(parse_env_or(
                "SYNC_DEBOUNCE_SECS",
                defaults.debounce.as_secs(),
            )?),
            cache_ttl: chrono::Duration::hours(parse_env_or(
                "SUBSCRIPTION_CACHE_TTL_HOURS",
                defaults.cache_ttl.num_hours(),
            )?),
            daily_interval: Duration::from_secs(
                parse_env_or::<u64>("DAILY_SYNC_INTERVAL_HOURS", 24)? * 60 * 60,
            ),
        };

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            stripe_secret_key: require_env("STRIPE_SECRET_KEY")?,
            stripe_price_id: require_env("STRIPE_PRICE_ID")?,
            openai_api_key: require_env("OPENAI_API_KEY")?,
            app_base_url: require_env("APP_BASE_URL")?,
            admin_api_key: std::env::var("ADMIN_API_KEY").ok().filter(|k| !k.is_empty()),
            port: parse_env_or("PORT", 8080u16)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            sync,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_env_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        Err(_) => Ok(default),
    }
}
