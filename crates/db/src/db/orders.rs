//! Order repository.
//!
//! Orders are created only by [`crate::services::CheckoutService`]; this
//! repository reads them and moves them through fulfilment.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use ecomm_core::{AddressId, CartId, Money, OrderId, OrderItemId, OrderStatus, ProductId, UserId};

use super::{RepositoryError, to_u32};
use crate::models::order::{Order, OrderItem};

macro_rules! order_columns {
    () => {
        "order_id, user_id, cart_id, status, total_amount, tax_amount, shipping_amount, \
         discount_amount, payment_method, delivery_method, billing_address_id, \
         shipping_address_id, created_at, updated_at"
    };
}

macro_rules! order_item_columns {
    () => {
        "order_item_id, order_id, product_id, quantity, unit_price, discount_amount, created_at"
    };
}

pub(crate) use {order_columns, order_item_columns};

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct OrderRow {
    order_id: Uuid,
    user_id: Uuid,
    cart_id: Uuid,
    status: String,
    total_amount: Money,
    tax_amount: Money,
    shipping_amount: Money,
    discount_amount: Money,
    payment_method: String,
    delivery_method: String,
    billing_address_id: Uuid,
    shipping_address_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: OrderId::new(row.order_id),
            user_id: UserId::new(row.user_id),
            cart_id: CartId::new(row.cart_id),
            status: parse_status(&row.status)?,
            total_amount: row.total_amount,
            tax_amount: row.tax_amount,
            shipping_amount: row.shipping_amount,
            discount_amount: row.discount_amount,
            payment_method: row.payment_method,
            delivery_method: row.delivery_method,
            billing_address_id: AddressId::new(row.billing_address_id),
            shipping_address_id: AddressId::new(row.shipping_address_id),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct OrderItemRow {
    order_item_id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    quantity: i32,
    unit_price: Money,
    discount_amount: Money,
    created_at: DateTime<Utc>,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = RepositoryError;

    fn try_from(row: OrderItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: OrderItemId::new(row.order_item_id),
            order_id: OrderId::new(row.order_id),
            product_id: ProductId::new(row.product_id),
            quantity: to_u32("quantity", row.quantity)?,
            unit_price: row.unit_price,
            discount_amount: row.discount_amount,
            created_at: row.created_at,
        })
    }
}

fn parse_status(raw: &str) -> Result<OrderStatus, RepositoryError> {
    raw.parse().map_err(|e| RepositoryError::corrupt("order status", e))
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for placed orders.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        sqlx::query_as::<_, OrderRow>(concat!(
            "SELECT ",
            order_columns!(),
            " FROM orders WHERE order_id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(self.pool)
        .await?
        .map(Order::try_from)
        .transpose()
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_items(&self, id: OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderItemRow>(concat!(
            "SELECT ",
            order_item_columns!(),
            " FROM order_items WHERE order_id = $1 ORDER BY created_at, order_item_id"
        ))
        .bind(id.as_uuid())
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(OrderItem::try_from).collect()
    }

    /// A user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(concat!(
            "SELECT ",
            order_columns!(),
            " FROM orders WHERE user_id = $1 ORDER BY created_at DESC, order_id"
        ))
        .bind(user_id.as_uuid())
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    /// Move an order one step along `pending -> processing -> shipped -> delivered`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order doesn't exist and
    /// `RepositoryError::InvalidTransition` if it is delivered or cancelled.
    pub async fn advance_status(&self, id: OrderId) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let current = lock_status(&mut tx, id).await?;

        let next = current.next().ok_or_else(|| {
            RepositoryError::InvalidTransition(format!("order {id} is {current}"))
        })?;

        let order = write_status(&mut tx, id, next).await?;
        tx.commit().await?;

        tracing::info!(order_id = %id, from = %current, to = %next, "Order advanced");
        Ok(order)
    }

    /// Cancel an order that hasn't shipped.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order doesn't exist and
    /// `RepositoryError::InvalidTransition` if it has shipped or is already
    /// cancelled.
    pub async fn cancel(&self, id: OrderId) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let current = lock_status(&mut tx, id).await?;

        if !current.can_cancel() {
            return Err(RepositoryError::InvalidTransition(format!(
                "order {id} is {current} and can no longer be cancelled"
            )));
        }

        let order = write_status(&mut tx, id, OrderStatus::Cancelled).await?;
        tx.commit().await?;

        tracing::info!(order_id = %id, from = %current, "Order cancelled");
        Ok(order)
    }
}

async fn lock_status(conn: &mut PgConnection, id: OrderId) -> Result<OrderStatus, RepositoryError> {
    let status: String =
        sqlx::query_scalar("SELECT status FROM orders WHERE order_id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(conn)
            .await?
            .ok_or(RepositoryError::NotFound)?;

    parse_status(&status)
}

async fn write_status(
    conn: &mut PgConnection,
    id: OrderId,
    status: OrderStatus,
) -> Result<Order, RepositoryError> {
    let row = sqlx::query_as::<_, OrderRow>(concat!(
        "UPDATE orders SET status = $2 WHERE order_id = $1 RETURNING ",
        order_columns!()
    ))
    .bind(id.as_uuid())
    .bind(status.as_str())
    .fetch_one(conn)
    .await?;

    Order::try_from(row)
}
