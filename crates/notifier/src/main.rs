use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use ecomm_common::config::NotifierConfig;
use ecomm_common::db;
use ecomm_engine::notification::NotificationStore;
use ecomm_notifier::channel::{DeliveryChannel, LogChannel, ResendChannel};
use ecomm_notifier::dispatcher::{Dispatcher, DispatcherConfig};
use ecomm_notifier::queue::{NotificationQueue, RemoteQueue};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ecomm_notifier=info,ecomm_engine=info".into()),
        )
        .json()
        .init();

    tracing::info!("ecomm notifier starting...");

    let config = NotifierConfig::from_env()?;

    let queue: Arc<dyn NotificationQueue> = match (&config.queue_api_url, &config.database_url) {
        (Some(url), _) => {
            let token = config.internal_api_token.clone().ok_or_else(|| {
                anyhow::anyhow!("INTERNAL_API_TOKEN is required when QUEUE_API_URL is set")
            })?;
            tracing::info!(queue_api_url = %url, "Using remote notification queue");
            let timeout = Duration::from_secs(config.queue_timeout_secs);
            Arc::new(RemoteQueue::new(url, token, timeout)?)
        }
        (None, Some(database_url)) => {
            let pool = db::create_pool(database_url, config.db_max_connections).await?;
            let store = NotificationStore::new(pool, config.max_attempts);
            tracing::info!(
                max_attempts = store.max_attempts(),
                "Using in-process notification queue"
            );
            Arc::new(store)
        }
        (None, None) => anyhow::bail!("either DATABASE_URL or QUEUE_API_URL must be set"),
    };

    let channel: Arc<dyn DeliveryChannel> = match (&config.resend_api_key, &config.email_from) {
        (Some(api_key), Some(from)) => Arc::new(ResendChannel::new(
            config.resend_api_url.clone(),
            api_key.clone(),
            from.clone(),
        )),
        _ => {
            tracing::warn!("RESEND_API_KEY or EMAIL_FROM not set, notifications will only be logged");
            Arc::new(LogChannel)
        }
    };

    let dispatcher = Dispatcher::new(queue, channel, DispatcherConfig::from(&config));

    // Graceful shutdown on Ctrl+C: stop polling, let in-flight sends finish
    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Received shutdown signal, stopping gracefully...");
                    shutdown.cancel();
                }
                Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
            }
        }
    });

    dispatcher.run(shutdown).await;

    tracing::info!("ecomm notifier stopped.");
    Ok(())
}
