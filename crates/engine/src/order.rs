//! Order creation, reads and the status state machine.
//!
//! Every accepted status change (including the initial `Pending` on creation)
//! enqueues a notification inside the same transaction as the order write, so
//! either both persist or neither does.

use sqlx::{PgConnection, PgPool};

use ecomm_common::error::AppError;
use ecomm_common::types::{Actor, Order, OrderDetails, OrderItem, OrderStatus};

use crate::notification::NotificationStore;

/// Service layer for orders.
pub struct OrderService;

/// A line item in a new order.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct OrderItemParams {
    pub product_id: i64,
    pub name: String,
    pub quantity: i64,
    #[serde(default)]
    pub image: String,
    pub price: f64,
}

/// Parameters for placing a new order.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CreateOrderParams {
    pub payment_method: String,
    pub tax_price: f64,
    pub shipping_price: f64,
    pub total_price: f64,
    pub items: Vec<OrderItemParams>,
}

impl CreateOrderParams {
    fn validate(&self) -> Result<(), AppError> {
        if self.payment_method.trim().is_empty() {
            return Err(AppError::Validation(
                "payment_method must not be empty".to_string(),
            ));
        }
        if self.items.is_empty() {
            return Err(AppError::Validation(
                "An order needs at least one item".to_string(),
            ));
        }

        let prices = [
            ("tax_price", self.tax_price),
            ("shipping_price", self.shipping_price),
            ("total_price", self.total_price),
        ];
        for (field, value) in prices {
            if !value.is_finite() || value < 0.0 {
                return Err(AppError::Validation(format!(
                    "{} must be a non-negative number",
                    field
                )));
            }
        }

        for item in &self.items {
            if item.quantity <= 0 {
                return Err(AppError::Validation(format!(
                    "Item '{}' must have a positive quantity",
                    item.name
                )));
            }
            if !item.price.is_finite() || item.price < 0.0 {
                return Err(AppError::Validation(format!(
                    "Item '{}' must have a non-negative price",
                    item.name
                )));
            }
        }

        Ok(())
    }
}

impl OrderService {
    /// Place an order and queue its `Pending` notification atomically.
    pub async fn create(
        pool: &PgPool,
        actor: &Actor,
        params: &CreateOrderParams,
    ) -> Result<OrderDetails, AppError> {
        params.validate()?;

        let mut tx = pool.begin().await?;

        let order: Order = sqlx::query_as(
            r#"
            INSERT INTO orders (user_id, payment_method, tax_price, shipping_price, total_price, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(actor.user_id)
        .bind(&params.payment_method)
        .bind(params.tax_price)
        .bind(params.shipping_price)
        .bind(params.total_price)
        .bind(OrderStatus::Pending.to_string())
        .fetch_one(&mut *tx)
        .await?;

        let mut items = Vec::with_capacity(params.items.len());
        for item in &params.items {
            let inserted: OrderItem = sqlx::query_as(
                r#"
                INSERT INTO order_items (order_id, product_id, name, quantity, image, price)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING *
                "#,
            )
            .bind(order.id)
            .bind(item.product_id)
            .bind(&item.name)
            .bind(item.quantity)
            .bind(&item.image)
            .bind(item.price)
            .fetch_one(&mut *tx)
            .await?;
            items.push(inserted);
        }

        NotificationStore::enqueue_with(&mut *tx, &actor.email, order.status, order.id).await?;

        tx.commit().await?;

        tracing::info!(
            order_id = order.id,
            user_id = actor.user_id,
            items = items.len(),
            "Order created"
        );

        Ok(OrderDetails { order, items })
    }

    /// Get a single order and its items by ID.
    pub async fn get(pool: &PgPool, order_id: i64) -> Result<OrderDetails, AppError> {
        let order: Order = sqlx::query_as("SELECT * FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_id)))?;

        let items: Vec<OrderItem> =
            sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id")
                .bind(order_id)
                .fetch_all(pool)
                .await?;

        Ok(OrderDetails { order, items })
    }

    /// List all orders placed by a user, newest first.
    pub async fn list_by_user(pool: &PgPool, user_id: i64) -> Result<Vec<Order>, AppError> {
        let orders: Vec<Order> = sqlx::query_as(
            "SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        Ok(orders)
    }

    /// Move an order to `new_status` and queue a notification for the change.
    ///
    /// Rejected with `NotFound` for unknown orders, `Forbidden` when the actor
    /// does not own the order, and `NoOpTransition` when the status would not
    /// change. Rejections write nothing.
    pub async fn transition_status(
        pool: &PgPool,
        order_id: i64,
        new_status: OrderStatus,
        actor: &Actor,
    ) -> Result<Order, AppError> {
        let mut tx = pool.begin().await?;

        let updated = Self::transition_with(&mut *tx, order_id, new_status, actor).await?;
        NotificationStore::enqueue_with(&mut *tx, &actor.email, updated.status, updated.id)
            .await?;

        tx.commit().await?;

        tracing::info!(
            order_id,
            user_id = actor.user_id,
            status = %updated.status,
            "Order status updated"
        );

        Ok(updated)
    }

    async fn transition_with(
        conn: &mut PgConnection,
        order_id: i64,
        new_status: OrderStatus,
        actor: &Actor,
    ) -> Result<Order, AppError> {
        // Row lock serializes concurrent transitions of the same order.
        let current: Order = sqlx::query_as("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_id)))?;

        if current.user_id != actor.user_id {
            return Err(AppError::Forbidden(format!(
                "Order {} does not belong to user {}",
                order_id, actor.user_id
            )));
        }

        if current.status == new_status {
            return Err(AppError::NoOpTransition(current.status));
        }

        let updated: Order = sqlx::query_as(
            r#"
            UPDATE orders
            SET status = $1, updated_at = NOW()
            WHERE id = $2
            RETURNING *
            "#,
        )
        .bind(new_status.to_string())
        .bind(order_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(updated)
    }
}
