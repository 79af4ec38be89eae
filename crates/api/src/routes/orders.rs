//! Order routes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;

use ecomm_common::error::AppError;
use ecomm_common::types::{NotificationState, Order, OrderDetails, OrderStatus};
use ecomm_engine::order::{CreateOrderParams, OrderService};

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/orders", post(create_order))
        .route("/api/orders", get(list_orders))
        .route("/api/orders/{id}", get(get_order))
        .route("/api/orders/{id}/status", patch(update_order_status))
        .route("/api/orders/{id}/notifications", get(list_order_notifications))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusBody {
    pub status: String,
}

/// POST /api/orders: Place an order for the authenticated user.
async fn create_order(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(params): Json<CreateOrderParams>,
) -> Result<(StatusCode, Json<OrderDetails>), AppError> {
    let details = OrderService::create(&state.pool, &auth.actor(), &params).await?;
    Ok((StatusCode::CREATED, Json(details)))
}

/// GET /api/orders: List the authenticated user's orders.
async fn list_orders(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<Order>>, AppError> {
    let orders = OrderService::list_by_user(&state.pool, auth.user_id).await?;
    Ok(Json(orders))
}

/// GET /api/orders/:id: Order details with items.
async fn get_order(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<OrderDetails>, AppError> {
    let details = OrderService::get(&state.pool, id).await?;
    ensure_can_view(&auth, &details.order)?;
    Ok(Json(details))
}

/// PATCH /api/orders/:id/status: Transition the order and queue a notification.
async fn update_order_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateStatusBody>,
) -> Result<Json<Order>, AppError> {
    let status: OrderStatus = body.status.parse()?;
    let order = OrderService::transition_status(&state.pool, id, status, &auth.actor()).await?;
    Ok(Json(order))
}

/// GET /api/orders/:id/notifications: Notification history for the order.
async fn list_order_notifications(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<NotificationState>>, AppError> {
    let details = OrderService::get(&state.pool, id).await?;
    ensure_can_view(&auth, &details.order)?;
    let states = state.notifications.list_states_for_order(id).await?;
    Ok(Json(states))
}

fn ensure_can_view(auth: &AuthUser, order: &Order) -> Result<(), AppError> {
    if auth.can_view(order.user_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "Order {} does not belong to user {}",
            order.id, auth.user_id
        )))
    }
}
