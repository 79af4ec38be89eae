use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Shipped,
    Delivered,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "pending"),
            OrderStatus::Shipped => write!(f, "shipped"),
            OrderStatus::Delivered => write!(f, "delivered"),
        }
    }
}

impl FromStr for OrderStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            other => Err(AppError::Validation(format!(
                "Invalid order status '{}'. Valid statuses: pending, shipped, delivered",
                other
            ))),
        }
    }
}

/// Delivery state of a single notification lifecycle.
///
/// `Sent` and `Failed` are terminal: once a state row reaches either, it is
/// never written again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    NotSent,
    Sent,
    Failed,
}

impl std::fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryState::NotSent => write!(f, "not_sent"),
            DeliveryState::Sent => write!(f, "sent"),
            DeliveryState::Failed => write!(f, "failed"),
        }
    }
}

/// Classification of a delivery attempt, as reported to the completion handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryOutcome {
    Success,
    Failure,
}

impl std::fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryOutcome::Success => write!(f, "SUCCESS"),
            DeliveryOutcome::Failure => write!(f, "FAILURE"),
        }
    }
}

impl FromStr for DeliveryOutcome {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SUCCESS" => Ok(DeliveryOutcome::Success),
            "FAILURE" => Ok(DeliveryOutcome::Failure),
            _ => Err(AppError::InvalidResponseType(s.to_string())),
        }
    }
}

/// An order placed by a user.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub payment_method: String,
    pub tax_price: f64,
    pub shipping_price: f64,
    pub total_price: f64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A line item belonging to an order.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub name: String,
    pub quantity: i64,
    pub image: String,
    pub price: f64,
}

/// An order together with its line items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// The authenticated identity acting on an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: i64,
    pub email: String,
}

/// Durable lifecycle record for one order-status notification.
///
/// Outlives the queued [`NotificationEvent`] it was created with.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationState {
    pub id: i64,
    pub order_id: i64,
    pub state: DeliveryState,
    pub message: String,
    pub requested_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A queued unit of notification work. Exists only while delivery is pending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationEvent {
    pub id: i64,
    /// Recipient, snapshotted at enqueue time
    pub user_email: String,
    /// Status being reported, snapshotted at enqueue time
    pub order_status: OrderStatus,
    pub order_id: i64,
    pub state_id: i64,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A delivery outcome to be recorded against a queued event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionReport {
    pub event_id: i64,
    pub state_id: i64,
    pub outcome: DeliveryOutcome,
    pub message: String,
}

/// What recording a delivery outcome did to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Completion {
    /// State moved to `Sent`, event dequeued.
    Sent,
    /// Attempt counted, event stays queued for the next poll.
    Requeued { attempts: i32 },
    /// Attempts exhausted: state moved to `Failed`, event dequeued.
    Failed,
}

impl Completion {
    pub fn succeeded(&self) -> bool {
        matches!(self, Completion::Sent)
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Completion::Requeued { .. })
    }
}

/// Header carrying the shared secret for the `/internal` queue routes.
pub const INTERNAL_TOKEN_HEADER: &str = "x-internal-token";

/// Wire body of `POST /internal/notifications/events/{id}`.
///
/// `response_type` stays a string so unknown classifications reach the
/// handler and are rejected as `InvalidResponseType`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateNotificationEventRequest {
    pub state_id: i64,
    pub response_type: String,
    #[serde(default)]
    pub message: String,
}

/// Wire response of `POST /internal/notifications/events/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateNotificationEventResponse {
    pub succeeded: bool,
    pub completion: Completion,
}

impl From<Completion> for UpdateNotificationEventResponse {
    fn from(completion: Completion) -> Self {
        Self {
            succeeded: completion.succeeded(),
            completion,
        }
    }
}
