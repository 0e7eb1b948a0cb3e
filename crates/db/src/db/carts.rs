//! Cart repository.
//!
//! Items capture the product's price at the moment they are added; later
//! price changes never touch existing lines. Removal is soft. Only `active`
//! carts accept item changes.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use ecomm_core::{CartId, CartItemId, CartStatus, Money, ProductId, SessionId, UserId};

use super::{RepositoryError, to_i32, to_u32};
use crate::models::cart::{Cart, CartItem, NewCart};

macro_rules! cart_columns {
    () => {
        "cart_id, user_id, session_id, status, created_at, updated_at"
    };
}

macro_rules! item_columns {
    () => {
        "cart_item_id, cart_id, product_id, quantity, unit_price, added_timestamp, \
         removed_timestamp"
    };
}

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct CartRow {
    cart_id: Uuid,
    user_id: Option<Uuid>,
    session_id: Option<Uuid>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CartRow> for Cart {
    type Error = RepositoryError;

    fn try_from(row: CartRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: CartId::new(row.cart_id),
            user_id: row.user_id.map(UserId::new),
            session_id: row.session_id.map(SessionId::new),
            status: parse_status(&row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CartItemRow {
    cart_item_id: Uuid,
    cart_id: Uuid,
    product_id: Uuid,
    quantity: i32,
    unit_price: Money,
    added_timestamp: DateTime<Utc>,
    removed_timestamp: Option<DateTime<Utc>>,
}

impl TryFrom<CartItemRow> for CartItem {
    type Error = RepositoryError;

    fn try_from(row: CartItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: CartItemId::new(row.cart_item_id),
            cart_id: CartId::new(row.cart_id),
            product_id: ProductId::new(row.product_id),
            quantity: to_u32("quantity", row.quantity)?,
            unit_price: row.unit_price,
            added_timestamp: row.added_timestamp,
            removed_timestamp: row.removed_timestamp,
        })
    }
}

fn parse_status(raw: &str) -> Result<CartStatus, RepositoryError> {
    raw.parse().map_err(|e| RepositoryError::corrupt("cart status", e))
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for carts and their items.
pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Open an active cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::MissingReference` if the user or session
    /// doesn't exist.
    pub async fn create(&self, new: &NewCart) -> Result<Cart, RepositoryError> {
        let row = sqlx::query_as::<_, CartRow>(concat!(
            "INSERT INTO carts (user_id, session_id) VALUES ($1, $2) RETURNING ",
            cart_columns!()
        ))
        .bind(new.user_id.map(|id| id.as_uuid()))
        .bind(new.session_id.map(|id| id.as_uuid()))
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_write(e, "cart owner"))?;

        Cart::try_from(row)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: CartId) -> Result<Option<Cart>, RepositoryError> {
        sqlx::query_as::<_, CartRow>(concat!(
            "SELECT ",
            cart_columns!(),
            " FROM carts WHERE cart_id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(self.pool)
        .await?
        .map(Cart::try_from)
        .transpose()
    }

    /// Add a product to an active cart at the product's current price.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the cart doesn't exist,
    /// `RepositoryError::InvalidTransition` if the cart is not active,
    /// `RepositoryError::MissingReference` if the product doesn't exist and
    /// `RepositoryError::Invalid` if the product is inactive or the quantity is zero.
    pub async fn add_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartItem, RepositoryError> {
        if quantity == 0 {
            return Err(RepositoryError::Invalid("quantity must be positive".to_string()));
        }

        let mut tx = self.pool.begin().await?;
        lock_open_cart(&mut tx, cart_id).await?;

        // FOR SHARE keeps the price stable until the line is written.
        let product: Option<(Money, bool)> = sqlx::query_as(
            "SELECT price, is_active FROM products WHERE product_id = $1 FOR SHARE",
        )
        .bind(product_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;

        let (price, is_active) = product
            .ok_or_else(|| RepositoryError::MissingReference(format!("product {product_id}")))?;
        if !is_active {
            return Err(RepositoryError::Invalid(format!(
                "product {product_id} is not active"
            )));
        }

        let row = sqlx::query_as::<_, CartItemRow>(concat!(
            "INSERT INTO cart_items (cart_id, product_id, quantity, unit_price) \
             VALUES ($1, $2, $3, $4) \
             RETURNING ",
            item_columns!()
        ))
        .bind(cart_id.as_uuid())
        .bind(product_id.as_uuid())
        .bind(to_i32("quantity", quantity)?)
        .bind(price)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::from_write(e, "cart item"))?;

        tx.commit().await?;
        CartItem::try_from(row)
    }

    /// Soft-remove an item from an active cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the item doesn't exist and
    /// `RepositoryError::InvalidTransition` if it was already removed or its
    /// cart is no longer active.
    pub async fn remove_item(&self, item_id: CartItemId) -> Result<CartItem, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let cart_id: Uuid =
            sqlx::query_scalar("SELECT cart_id FROM cart_items WHERE cart_item_id = $1")
                .bind(item_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(RepositoryError::NotFound)?;
        lock_open_cart(&mut tx, CartId::new(cart_id)).await?;

        let row = sqlx::query_as::<_, CartItemRow>(concat!(
            "UPDATE cart_items SET removed_timestamp = GREATEST(now(), added_timestamp) \
             WHERE cart_item_id = $1 AND removed_timestamp IS NULL \
             RETURNING ",
            item_columns!()
        ))
        .bind(item_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            RepositoryError::InvalidTransition(format!("cart item {item_id} was already removed"))
        })?;

        tx.commit().await?;
        CartItem::try_from(row)
    }

    /// Items of a cart in the order they were added.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_items(
        &self,
        cart_id: CartId,
        include_removed: bool,
    ) -> Result<Vec<CartItem>, RepositoryError> {
        let rows = sqlx::query_as::<_, CartItemRow>(concat!(
            "SELECT ",
            item_columns!(),
            " FROM cart_items \
              WHERE cart_id = $1 AND ($2 OR removed_timestamp IS NULL) \
              ORDER BY added_timestamp, cart_item_id"
        ))
        .bind(cart_id.as_uuid())
        .bind(include_removed)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(CartItem::try_from).collect()
    }

    /// Move a cart along its lifecycle.
    ///
    /// Only checkout converts a cart, since `converted` means an order exists.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the cart doesn't exist and
    /// `RepositoryError::InvalidTransition` if the move isn't allowed.
    pub async fn set_status(&self, id: CartId, to: CartStatus) -> Result<Cart, RepositoryError> {
        if to == CartStatus::Converted {
            return Err(RepositoryError::InvalidTransition(format!(
                "cart {id}: converted only by placing an order"
            )));
        }

        let mut tx = self.pool.begin().await?;

        let current: String =
            sqlx::query_scalar("SELECT status FROM carts WHERE cart_id = $1 FOR UPDATE")
                .bind(id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(RepositoryError::NotFound)?;
        let current = parse_status(&current)?;

        if !current.can_transition_to(to) {
            return Err(RepositoryError::InvalidTransition(format!(
                "cart {id}: {current} -> {to}"
            )));
        }

        let row = sqlx::query_as::<_, CartRow>(concat!(
            "UPDATE carts SET status = $2 WHERE cart_id = $1 RETURNING ",
            cart_columns!()
        ))
        .bind(id.as_uuid())
        .bind(to.as_str())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(cart_id = %id, from = %current, to = %to, "Cart status changed");
        Cart::try_from(row)
    }
}

/// Lock a cart row and require it to be `active`.
pub(crate) async fn lock_open_cart(
    conn: &mut PgConnection,
    cart_id: CartId,
) -> Result<Cart, RepositoryError> {
    let row = sqlx::query_as::<_, CartRow>(concat!(
        "SELECT ",
        cart_columns!(),
        " FROM carts WHERE cart_id = $1 FOR UPDATE"
    ))
    .bind(cart_id.as_uuid())
    .fetch_optional(conn)
    .await?
    .ok_or(RepositoryError::NotFound)?;

    let cart = Cart::try_from(row)?;
    if cart.status.is_open() {
        Ok(cart)
    } else {
        Err(RepositoryError::InvalidTransition(format!(
            "cart {cart_id} is {}",
            cart.status
        )))
    }
}

/// Active items of a cart, read on the caller's connection.
pub(crate) async fn active_items(
    conn: &mut PgConnection,
    cart_id: CartId,
) -> Result<Vec<CartItem>, RepositoryError> {
    let rows = sqlx::query_as::<_, CartItemRow>(concat!(
        "SELECT ",
        item_columns!(),
        " FROM cart_items \
          WHERE cart_id = $1 AND removed_timestamp IS NULL \
          ORDER BY added_timestamp, cart_item_id"
    ))
    .bind(cart_id.as_uuid())
    .fetch_all(conn)
    .await?;

    rows.into_iter().map(CartItem::try_from).collect()
}

/// Flip a locked cart to `converted`.
pub(crate) async fn mark_converted(
    conn: &mut PgConnection,
    cart_id: CartId,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE carts SET status = $2 WHERE cart_id = $1")
        .bind(cart_id.as_uuid())
        .bind(CartStatus::Converted.as_str())
        .execute(conn)
        .await?;
    Ok(())
}
