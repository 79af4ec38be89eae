//! Internal notification queue routes, used by the dispatcher process.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};

use ecomm_common::error::AppError;
use ecomm_common::types::{
    CompletionReport, DeliveryOutcome, NotificationEvent, UpdateNotificationEventRequest,
    UpdateNotificationEventResponse,
};

use crate::middleware::auth::InternalCaller;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/internal/notifications/events", get(list_events))
        .route("/internal/notifications/events/{id}", post(update_event))
}

/// GET /internal/notifications/events: Pending events, oldest first.
async fn list_events(
    State(state): State<AppState>,
    _caller: InternalCaller,
) -> Result<Json<Vec<NotificationEvent>>, AppError> {
    let events = state.notifications.list_pending().await?;
    Ok(Json(events))
}

/// POST /internal/notifications/events/:id: Record a delivery outcome.
async fn update_event(
    State(state): State<AppState>,
    _caller: InternalCaller,
    Path(id): Path<i64>,
    Json(body): Json<UpdateNotificationEventRequest>,
) -> Result<Json<UpdateNotificationEventResponse>, AppError> {
    let outcome: DeliveryOutcome = body.response_type.parse()?;
    let completion = state
        .notifications
        .complete(&CompletionReport {
            event_id: id,
            state_id: body.state_id,
            outcome,
            message: body.message,
        })
        .await?;
    Ok(Json(completion.into()))
}
