use std::str::FromStr;

use serde::Deserialize;

/// Default cap on delivery attempts per notification.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default dispatcher poll cadence in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
/// Default number of deliveries allowed in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 10;
/// Default per-send timeout in seconds.
pub const DEFAULT_SEND_TIMEOUT_SECS: u64 = 30;
/// Default upper bound on one queue call (list or complete) in seconds.
pub const DEFAULT_QUEUE_TIMEOUT_SECS: u64 = 10;

/// API server configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Socket address the HTTP server binds to (default: 0.0.0.0:3000)
    pub bind_addr: String,

    /// JWT secret for API authentication
    pub jwt_secret: String,

    /// Shared secret for the internal notification queue routes.
    /// When unset the internal routes reject every request.
    pub internal_api_token: Option<String>,

    /// Delivery attempts before a notification is marked failed (default: 3)
    pub max_attempts: u32,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            db_max_connections: env_or("DB_MAX_CONNECTIONS", 20)?,
            bind_addr: std::env::var("API_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            jwt_secret: std::env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?,
            internal_api_token: non_empty_var("INTERNAL_API_TOKEN"),
            max_attempts: env_or("NOTIFICATION_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?,
        };

        if config.max_attempts == 0 {
            anyhow::bail!("NOTIFICATION_MAX_ATTEMPTS must be at least 1");
        }

        Ok(config)
    }
}

/// Notification dispatcher configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    /// PostgreSQL connection string, used when the queue is read in-process
    pub database_url: Option<String>,

    /// Base URL of the API's internal queue routes. Takes precedence over
    /// `database_url` when set.
    pub queue_api_url: Option<String>,

    /// Shared secret sent as `X-Internal-Token` to the remote queue
    pub internal_api_token: Option<String>,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Seconds between queue polls (default: 30)
    pub poll_interval_secs: u64,

    /// Deliveries allowed in flight at once (default: 10)
    pub concurrency: usize,

    /// Delivery attempts before a notification is marked failed (default: 3)
    pub max_attempts: u32,

    /// Upper bound on a single send, in seconds (default: 30)
    pub send_timeout_secs: u64,

    /// Upper bound on a single queue call, in seconds (default: 10)
    pub queue_timeout_secs: u64,

    /// Resend API key for email delivery
    pub resend_api_key: Option<String>,

    /// Resend endpoint (default: https://api.resend.com/emails)
    pub resend_api_url: String,

    /// Email sender address
    pub email_from: Option<String>,

    /// Subject line for order notifications
    pub email_subject: String,
}

impl NotifierConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: non_empty_var("DATABASE_URL"),
            queue_api_url: non_empty_var("QUEUE_API_URL"),
            internal_api_token: non_empty_var("INTERNAL_API_TOKEN"),
            db_max_connections: env_or("DB_MAX_CONNECTIONS", 20)?,
            poll_interval_secs: env_or("NOTIFIER_POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?,
            concurrency: env_or("NOTIFIER_CONCURRENCY", DEFAULT_CONCURRENCY)?,
            max_attempts: env_or("NOTIFICATION_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?,
            send_timeout_secs: env_or("NOTIFIER_SEND_TIMEOUT_SECS", DEFAULT_SEND_TIMEOUT_SECS)?,
            queue_timeout_secs: env_or("NOTIFIER_QUEUE_TIMEOUT_SECS", DEFAULT_QUEUE_TIMEOUT_SECS)?,
            resend_api_key: non_empty_var("RESEND_API_KEY"),
            resend_api_url: std::env::var("RESEND_API_URL")
                .unwrap_or_else(|_| "https://api.resend.com/emails".to_string()),
            email_from: non_empty_var("EMAIL_FROM"),
            email_subject: std::env::var("EMAIL_SUBJECT")
                .unwrap_or_else(|_| "email from ecomm".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the dispatcher cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database_url.is_none() && self.queue_api_url.is_none() {
            anyhow::bail!("either DATABASE_URL or QUEUE_API_URL must be set");
        }
        if self.max_attempts == 0 {
            anyhow::bail!("NOTIFICATION_MAX_ATTEMPTS must be at least 1");
        }
        if self.concurrency == 0 {
            anyhow::bail!("NOTIFIER_CONCURRENCY must be at least 1");
        }
        if self.poll_interval_secs == 0 {
            anyhow::bail!("NOTIFIER_POLL_INTERVAL_SECS must be at least 1");
        }
        if self.queue_timeout_secs == 0 {
            anyhow::bail!("NOTIFIER_QUEUE_TIMEOUT_SECS must be at least 1");
        }
        Ok(())
    }
}

/// Read `key` from the environment, falling back to `default` when unset.
fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
{
    parse_or(key, std::env::var(key).ok(), default)
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> anyhow::Result<T>
where
    T: FromStr,
{
    match raw {
        Some(value) => value.trim().parse().map_err(|_| {
            anyhow::anyhow!(
                "{} must be a valid {}",
                key,
                std::any::type_name::<T>()
            )
        }),
        None => Ok(default),
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
