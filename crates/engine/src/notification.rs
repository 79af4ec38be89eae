//! Durable queue of order-status notifications.
//!
//! Every queued `NotificationEvent` is paired 1:1 with a `NotificationState`
//! created in the same transaction. The event row exists only while delivery
//! is pending; the state row is the permanent record of the outcome.
//!
//! All mutations run in a transaction scoped to a single event, so concurrent
//! completions of different events only contend on their own rows.

use sqlx::{PgConnection, PgPool};

use ecomm_common::error::AppError;
use ecomm_common::types::{
    Completion, CompletionReport, DeliveryOutcome, DeliveryState, NotificationEvent,
    NotificationState, OrderStatus,
};

/// Postgres-backed notification queue with an attempt-capped retry policy.
#[derive(Debug, Clone)]
pub struct NotificationStore {
    pool: PgPool,
    max_attempts: u32,
}

impl NotificationStore {
    pub fn new(pool: PgPool, max_attempts: u32) -> Self {
        Self {
            pool,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn attempt_cap(&self) -> i32 {
        i32::try_from(self.max_attempts).unwrap_or(i32::MAX)
    }

    /// Enqueue a notification in its own transaction.
    pub async fn enqueue(
        &self,
        user_email: &str,
        order_status: OrderStatus,
        order_id: i64,
    ) -> Result<NotificationEvent, AppError> {
        let mut tx = self.pool.begin().await?;
        let event = Self::enqueue_with(&mut *tx, user_email, order_status, order_id).await?;
        tx.commit().await?;
        Ok(event)
    }

    /// Enqueue a notification on a caller-owned connection.
    ///
    /// Pass a transaction (`&mut *tx`) so the state and event rows commit or
    /// roll back together with the caller's own writes.
    pub async fn enqueue_with(
        conn: &mut PgConnection,
        user_email: &str,
        order_status: OrderStatus,
        order_id: i64,
    ) -> Result<NotificationEvent, AppError> {
        let state: NotificationState = sqlx::query_as(
            r#"
            INSERT INTO notification_states (order_id, state, message)
            VALUES ($1, $2, '')
            RETURNING *
            "#,
        )
        .bind(order_id)
        .bind(DeliveryState::NotSent.to_string())
        .fetch_one(&mut *conn)
        .await?;

        let event: NotificationEvent = sqlx::query_as(
            r#"
            INSERT INTO notification_events_queue (user_email, order_status, order_id, state_id, attempts)
            VALUES ($1, $2, $3, $4, 0)
            RETURNING *
            "#,
        )
        .bind(user_email)
        .bind(order_status.to_string())
        .bind(order_id)
        .bind(state.id)
        .fetch_one(&mut *conn)
        .await?;

        tracing::info!(
            event_id = event.id,
            state_id = state.id,
            order_id,
            order_status = %order_status,
            "Notification enqueued"
        );

        Ok(event)
    }

    /// List events still eligible for delivery, oldest first.
    pub async fn list_pending(&self) -> Result<Vec<NotificationEvent>, AppError> {
        let events: Vec<NotificationEvent> = sqlx::query_as(
            r#"
            SELECT *
            FROM notification_events_queue
            WHERE attempts < $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(self.attempt_cap())
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    /// Record a delivery outcome for one queued event.
    ///
    /// - Success: state → `Sent`, event dequeued.
    /// - Failure with attempts left: `attempts` incremented, event kept.
    /// - Failure on the last attempt: state → `Failed`, event dequeued.
    ///
    /// The attempt count is re-read under a row lock, so stale in-memory
    /// copies of the event cannot skip or repeat an increment.
    pub async fn complete(&self, report: &CompletionReport) -> Result<Completion, AppError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(i64, i32)> = sqlx::query_as(
            "SELECT state_id, attempts FROM notification_events_queue WHERE id = $1 FOR UPDATE",
        )
        .bind(report.event_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (state_id, attempts) = row.ok_or_else(|| {
            AppError::NotFound(format!(
                "Notification event {} is not queued",
                report.event_id
            ))
        })?;

        if state_id != report.state_id {
            return Err(AppError::Validation(format!(
                "Notification event {} belongs to state {}, not {}",
                report.event_id, state_id, report.state_id
            )));
        }

        let completion = match report.outcome {
            DeliveryOutcome::Success => {
                Self::finish(
                    &mut *tx,
                    report.event_id,
                    state_id,
                    DeliveryState::Sent,
                    &report.message,
                )
                .await?;
                Completion::Sent
            }
            DeliveryOutcome::Failure if attempts + 1 < self.attempt_cap() => {
                let attempts: i32 = sqlx::query_scalar(
                    r#"
                    UPDATE notification_events_queue
                    SET attempts = attempts + 1, updated_at = NOW()
                    WHERE id = $1
                    RETURNING attempts
                    "#,
                )
                .bind(report.event_id)
                .fetch_one(&mut *tx)
                .await?;

                sqlx::query("UPDATE notification_states SET message = $1 WHERE id = $2")
                    .bind(&report.message)
                    .bind(state_id)
                    .execute(&mut *tx)
                    .await?;

                Completion::Requeued { attempts }
            }
            DeliveryOutcome::Failure => {
                Self::finish(
                    &mut *tx,
                    report.event_id,
                    state_id,
                    DeliveryState::Failed,
                    &report.message,
                )
                .await?;
                Completion::Failed
            }
        };

        tx.commit().await?;

        match completion {
            Completion::Sent => tracing::info!(
                event_id = report.event_id,
                state_id,
                "Notification delivered"
            ),
            Completion::Requeued { attempts } => tracing::warn!(
                event_id = report.event_id,
                state_id,
                attempts,
                max_attempts = self.max_attempts,
                message = %report.message,
                "Notification delivery failed, will retry"
            ),
            Completion::Failed => tracing::error!(
                event_id = report.event_id,
                state_id,
                max_attempts = self.max_attempts,
                message = %report.message,
                "Notification delivery failed permanently"
            ),
        }

        Ok(completion)
    }

    /// Move the state row to a terminal state and dequeue its event.
    async fn finish(
        conn: &mut PgConnection,
        event_id: i64,
        state_id: i64,
        state: DeliveryState,
        message: &str,
    ) -> Result<(), AppError> {
        let updated = sqlx::query(
            r#"
            UPDATE notification_states
            SET state = $1, message = $2, completed_at = NOW()
            WHERE id = $3 AND state = $4
            "#,
        )
        .bind(state.to_string())
        .bind(message)
        .bind(state_id)
        .bind(DeliveryState::NotSent.to_string())
        .execute(&mut *conn)
        .await?;

        if updated.rows_affected() != 1 {
            return Err(AppError::Internal(format!(
                "Notification state {} is missing or already terminal",
                state_id
            )));
        }

        sqlx::query("DELETE FROM notification_events_queue WHERE id = $1")
            .bind(event_id)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    /// Get a single notification state by ID.
    pub async fn get_state(&self, state_id: i64) -> Result<NotificationState, AppError> {
        let state: NotificationState =
            sqlx::query_as("SELECT * FROM notification_states WHERE id = $1")
                .bind(state_id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(format!("Notification state {} not found", state_id))
                })?;

        Ok(state)
    }

    /// Full notification history for an order, oldest first.
    ///
    /// This is where terminally failed notifications surface, since no
    /// synchronous caller ever sees them.
    pub async fn list_states_for_order(
        &self,
        order_id: i64,
    ) -> Result<Vec<NotificationState>, AppError> {
        let states: Vec<NotificationState> = sqlx::query_as(
            "SELECT * FROM notification_states WHERE order_id = $1 ORDER BY requested_at ASC, id ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(states)
    }
}
