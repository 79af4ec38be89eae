//! Queue access for the dispatcher.
//!
//! The dispatcher only needs two operations, so it talks to the queue
//! through [`NotificationQueue`]: either the store directly or the API's
//! internal routes over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use ecomm_common::error::AppError;
use ecomm_common::types::{
    Completion, CompletionReport, INTERNAL_TOKEN_HEADER, NotificationEvent,
    UpdateNotificationEventRequest, UpdateNotificationEventResponse,
};
use ecomm_engine::notification::NotificationStore;

#[async_trait]
pub trait NotificationQueue: Send + Sync {
    /// Events still eligible for delivery, oldest first.
    async fn list_pending(&self) -> Result<Vec<NotificationEvent>, AppError>;

    /// Record the outcome of one delivery attempt.
    async fn complete(&self, report: &CompletionReport) -> Result<Completion, AppError>;
}

#[async_trait]
impl NotificationQueue for NotificationStore {
    async fn list_pending(&self) -> Result<Vec<NotificationEvent>, AppError> {
        NotificationStore::list_pending(self).await
    }

    async fn complete(&self, report: &CompletionReport) -> Result<Completion, AppError> {
        NotificationStore::complete(self, report).await
    }
}

/// Queue reached through the API's `/internal/notifications` routes.
pub struct RemoteQueue {
    client: Client,
    base_url: String,
    token: String,
}

impl RemoteQueue {
    /// `timeout` bounds every request, connect through body.
    pub fn new(base_url: &str, token: String, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build queue client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn events_url(&self) -> String {
        format!("{}/internal/notifications/events", self.base_url)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, AppError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body: serde_json::Value = response.json().await.unwrap_or_default();
        let message = body["error"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| status.to_string());

        Err(match status {
            StatusCode::NOT_FOUND => AppError::NotFound(message),
            StatusCode::BAD_REQUEST => AppError::Validation(message),
            _ => AppError::Upstream(format!("queue API returned {}: {}", status, message)),
        })
    }
}

fn upstream(e: reqwest::Error) -> AppError {
    AppError::Upstream(e.to_string())
}

#[async_trait]
impl NotificationQueue for RemoteQueue {
    async fn list_pending(&self) -> Result<Vec<NotificationEvent>, AppError> {
        let response = self
            .client
            .get(self.events_url())
            .header(INTERNAL_TOKEN_HEADER, &self.token)
            .send()
            .await
            .map_err(upstream)?;

        Self::check(response).await?.json().await.map_err(upstream)
    }

    async fn complete(&self, report: &CompletionReport) -> Result<Completion, AppError> {
        let body = UpdateNotificationEventRequest {
            state_id: report.state_id,
            response_type: report.outcome.to_string(),
            message: report.message.clone(),
        };

        let response = self
            .client
            .post(format!("{}/{}", self.events_url(), report.event_id))
            .header(INTERNAL_TOKEN_HEADER, &self.token)
            .json(&body)
            .send()
            .await
            .map_err(upstream)?;

        let parsed: UpdateNotificationEventResponse =
            Self::check(response).await?.json().await.map_err(upstream)?;
        Ok(parsed.completion)
    }
}
