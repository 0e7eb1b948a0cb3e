//! Checkout: cart to order.
//!
//! The whole conversion runs in one transaction. The cart row is locked
//! first, so two checkouts of the same cart serialize and the second sees a
//! `converted` cart. Order lines copy `unit_price` from the cart items, never
//! from the product, so later catalog price changes leave orders untouched.

use sqlx::{PgConnection, PgPool};
use thiserror::Error;
use uuid::Uuid;

use ecomm_core::{AddressId, AddressType, CartId, LineItem, OrderTotals, PricingPolicy, UserId};

use crate::db::RepositoryError;
use crate::db::carts;
use crate::db::orders::{OrderItemRow, OrderRow, order_columns, order_item_columns};
use crate::models::cart::CartItem;
use crate::models::order::{Order, OrderItem};

/// Errors that can occur while placing an order.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The cart doesn't exist.
    #[error("cart {0} not found")]
    CartNotFound(CartId),

    /// The cart was already converted or abandoned.
    #[error("cart is not active: {0}")]
    CartNotActive(String),

    /// Anonymous carts have no addresses to ship to.
    #[error("cart {0} has no owner")]
    AnonymousCart(CartId),

    /// Nothing to order.
    #[error("cart {0} has no active items")]
    EmptyCart(CartId),

    /// The owner has no default address of the given type.
    #[error("user {user_id} has no default {address_type} address")]
    MissingDefaultAddress {
        user_id: UserId,
        address_type: AddressType,
    },

    /// Payment or delivery method was blank.
    #[error("{0} must not be empty")]
    MissingMethod(&'static str),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<sqlx::Error> for CheckoutError {
    fn from(err: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(err))
    }
}

/// An order together with its lines.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Places orders from carts.
pub struct CheckoutService<'a> {
    pool: &'a PgPool,
    policy: PricingPolicy,
}

impl<'a> CheckoutService<'a> {
    /// Create a checkout service with the default pricing policy.
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self::with_policy(pool, PricingPolicy::default())
    }

    #[must_use]
    pub const fn with_policy(pool: &'a PgPool, policy: PricingPolicy) -> Self {
        Self { pool, policy }
    }

    /// Convert an active cart into an order.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::CartNotFound` or `CheckoutError::CartNotActive`
    /// if the cart can't be checked out, `CheckoutError::AnonymousCart` or
    /// `CheckoutError::MissingDefaultAddress` if there is nowhere to bill or
    /// ship, `CheckoutError::EmptyCart` if it holds no active items, and
    /// `CheckoutError::Repository` if a write fails.
    pub async fn place_order(
        &self,
        cart_id: CartId,
        payment_method: &str,
        delivery_method: &str,
    ) -> Result<PlacedOrder, CheckoutError> {
        let payment_method = payment_method.trim();
        let delivery_method = delivery_method.trim();
        if payment_method.is_empty() {
            return Err(CheckoutError::MissingMethod("payment method"));
        }
        if delivery_method.is_empty() {
            return Err(CheckoutError::MissingMethod("delivery method"));
        }

        let mut tx = self.pool.begin().await?;

        let cart = carts::lock_open_cart(&mut tx, cart_id)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => CheckoutError::CartNotFound(cart_id),
                RepositoryError::InvalidTransition(msg) => CheckoutError::CartNotActive(msg),
                other => CheckoutError::Repository(other),
            })?;
        let user_id = cart.user_id.ok_or(CheckoutError::AnonymousCart(cart_id))?;

        let cart_items = carts::active_items(&mut tx, cart_id).await?;
        if cart_items.is_empty() {
            return Err(CheckoutError::EmptyCart(cart_id));
        }

        let (billing, shipping) = default_address_ids(&mut tx, user_id).await?;

        let lines: Vec<LineItem> = cart_items.iter().map(CartItem::line_item).collect();
        let totals = OrderTotals::compute(&lines, &self.policy);

        let order_row = sqlx::query_as::<_, OrderRow>(concat!(
            "INSERT INTO orders \
                 (user_id, cart_id, total_amount, tax_amount, shipping_amount, discount_amount, \
                  payment_method, delivery_method, billing_address_id, shipping_address_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING ",
            order_columns!()
        ))
        .bind(user_id.as_uuid())
        .bind(cart_id.as_uuid())
        .bind(totals.total)
        .bind(totals.tax)
        .bind(totals.shipping)
        .bind(totals.discount)
        .bind(payment_method)
        .bind(delivery_method)
        .bind(billing.as_uuid())
        .bind(shipping.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::from_write(e, "order"))?;
        let order = Order::try_from(order_row)?;

        let mut items = Vec::with_capacity(cart_items.len());
        for (cart_item, line) in cart_items.iter().zip(&lines) {
            let row = sqlx::query_as::<_, OrderItemRow>(concat!(
                "INSERT INTO order_items (order_id, product_id, quantity, unit_price, discount_amount) \
                 VALUES ($1, $2, $3, $4, $5) \
                 RETURNING ",
                order_item_columns!()
            ))
            .bind(order.id.as_uuid())
            .bind(cart_item.product_id.as_uuid())
            .bind(crate::db::to_i32("quantity", line.quantity)?)
            .bind(line.unit_price)
            .bind(totals.line_discount(line))
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| RepositoryError::from_write(e, "order item"))?;
            items.push(OrderItem::try_from(row)?);
        }

        carts::mark_converted(&mut tx, cart_id).await?;
        tx.commit().await?;

        tracing::info!(
            order_id = %order.id,
            cart_id = %cart_id,
            user_id = %user_id,
            items = items.len(),
            total = %order.total_amount,
            "Order placed"
        );

        Ok(PlacedOrder { order, items })
    }
}

/// The owner's default billing and shipping address ids.
async fn default_address_ids(
    conn: &mut PgConnection,
    user_id: UserId,
) -> Result<(AddressId, AddressId), CheckoutError> {
    let rows: Vec<(Uuid, String)> = sqlx::query_as(
        "SELECT address_id, address_type FROM user_addresses \
         WHERE user_id = $1 AND is_default \
         FOR SHARE",
    )
    .bind(user_id.as_uuid())
    .fetch_all(conn)
    .await?;

    let mut billing = None;
    let mut shipping = None;
    for (id, address_type) in rows {
        let address_type = address_type
            .parse::<AddressType>()
            .map_err(|e| RepositoryError::corrupt("address_type", e))?;
        match address_type {
            AddressType::Billing => billing = Some(AddressId::new(id)),
            AddressType::Shipping => shipping = Some(AddressId::new(id)),
        }
    }

    let missing = |address_type| CheckoutError::MissingDefaultAddress {
        user_id,
        address_type,
    };
    Ok((
        billing.ok_or_else(|| missing(AddressType::Billing))?,
        shipping.ok_or_else(|| missing(AddressType::Shipping))?,
    ))
}
