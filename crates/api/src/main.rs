//! ecomm API server binary entrypoint.

use std::net::SocketAddr;

use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use ecomm_common::config::AppConfig;
use ecomm_common::db::{create_pool, run_migrations};

use ecomm_api::routes::create_router;
use ecomm_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("ecomm_api=debug,ecomm_engine=debug,tower_http=debug")
        }))
        .init();

    tracing::info!("Starting ecomm API server...");

    // Load configuration
    let config = AppConfig::from_env()?;
    if config.internal_api_token.is_none() {
        tracing::warn!("INTERNAL_API_TOKEN not set, internal notification routes are disabled");
    }

    // Create database connection pool
    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    run_migrations(&pool).await?;

    let addr: SocketAddr = config.bind_addr.parse()?;

    // Build application state
    let state = AppState::new(pool, config);

    // Build router
    let app = create_router(state)
        .layer(RequestBodyLimitLayer::new(64 * 1024))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
