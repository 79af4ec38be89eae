//! Shared application state for the Axum API server.

use ecomm_common::config::AppConfig;
use ecomm_engine::notification::NotificationStore;
use sqlx::PgPool;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: AppConfig,
    pub notifications: NotificationStore,
}

impl AppState {
    pub fn new(pool: PgPool, config: AppConfig) -> Self {
        let notifications = NotificationStore::new(pool.clone(), config.max_attempts);
        Self {
            pool,
            config,
            notifications,
        }
    }
}
