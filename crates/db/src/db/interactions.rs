//! Product views and wishlists.
//!
//! Wishlist removal is soft: the row gets a `removed_timestamp` and stays
//! available to history queries. Only one active entry may exist per user
//! and product.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use ecomm_core::{ProductId, ProductViewId, SessionId, UserId, WishlistId};

use super::{RepositoryError, to_i32, to_u32};
use crate::models::interaction::{NewProductView, ProductView, WishlistEntry};

macro_rules! wishlist_columns {
    () => {
        "wishlist_id, user_id, product_id, added_timestamp, removed_timestamp, notes"
    };
}

#[derive(Debug, sqlx::FromRow)]
struct ProductViewRow {
    view_id: Uuid,
    session_id: Uuid,
    product_id: Uuid,
    view_timestamp: DateTime<Utc>,
    view_duration_seconds: Option<i32>,
    source_page: Option<String>,
}

impl TryFrom<ProductViewRow> for ProductView {
    type Error = RepositoryError;

    fn try_from(row: ProductViewRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ProductViewId::new(row.view_id),
            session_id: SessionId::new(row.session_id),
            product_id: ProductId::new(row.product_id),
            view_timestamp: row.view_timestamp,
            view_duration_seconds: row
                .view_duration_seconds
                .map(|s| to_u32("view_duration_seconds", s))
                .transpose()?,
            source_page: row.source_page,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WishlistRow {
    wishlist_id: Uuid,
    user_id: Uuid,
    product_id: Uuid,
    added_timestamp: DateTime<Utc>,
    removed_timestamp: Option<DateTime<Utc>>,
    notes: Option<String>,
}

impl From<WishlistRow> for WishlistEntry {
    fn from(row: WishlistRow) -> Self {
        Self {
            id: WishlistId::new(row.wishlist_id),
            user_id: UserId::new(row.user_id),
            product_id: ProductId::new(row.product_id),
            added_timestamp: row.added_timestamp,
            removed_timestamp: row.removed_timestamp,
            notes: row.notes,
        }
    }
}

/// Repository for shopper interactions.
pub struct InteractionRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> InteractionRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Record a product view.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::MissingReference` if the session or product
    /// doesn't exist.
    pub async fn record_view(&self, new: &NewProductView) -> Result<ProductView, RepositoryError> {
        let duration = new
            .view_duration_seconds
            .map(|s| to_i32("view_duration_seconds", s))
            .transpose()?;

        let row = sqlx::query_as::<_, ProductViewRow>(
            r"
            INSERT INTO product_views (session_id, product_id, view_duration_seconds, source_page)
            VALUES ($1, $2, $3, $4)
            RETURNING view_id, session_id, product_id, view_timestamp, view_duration_seconds,
                      source_page
            ",
        )
        .bind(new.session_id.as_uuid())
        .bind(new.product_id.as_uuid())
        .bind(duration)
        .bind(new.source_page.as_deref())
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_write(e, "product view"))?;

        ProductView::try_from(row)
    }

    /// Add a product to a user's wishlist.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the product is already on the
    /// list and `RepositoryError::MissingReference` if the user or product
    /// doesn't exist.
    pub async fn add_to_wishlist(
        &self,
        user_id: UserId,
        product_id: ProductId,
        notes: Option<&str>,
    ) -> Result<WishlistEntry, RepositoryError> {
        let row = sqlx::query_as::<_, WishlistRow>(concat!(
            "INSERT INTO wishlists (user_id, product_id, notes) VALUES ($1, $2, $3) RETURNING ",
            wishlist_columns!()
        ))
        .bind(user_id.as_uuid())
        .bind(product_id.as_uuid())
        .bind(notes)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_write(e, "wishlist entry"))?;

        Ok(row.into())
    }

    /// Soft-remove the active wishlist entry for a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if there is no active entry.
    pub async fn remove_from_wishlist(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<WishlistEntry, RepositoryError> {
        let row = sqlx::query_as::<_, WishlistRow>(concat!(
            "UPDATE wishlists SET removed_timestamp = GREATEST(now(), added_timestamp) \
             WHERE user_id = $1 AND product_id = $2 AND removed_timestamp IS NULL \
             RETURNING ",
            wishlist_columns!()
        ))
        .bind(user_id.as_uuid())
        .bind(product_id.as_uuid())
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        Ok(row.into())
    }

    /// A user's wishlist, newest first. Removed entries are included on request.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_wishlist(
        &self,
        user_id: UserId,
        include_removed: bool,
    ) -> Result<Vec<WishlistEntry>, RepositoryError> {
        let rows = sqlx::query_as::<_, WishlistRow>(concat!(
            "SELECT ",
            wishlist_columns!(),
            " FROM wishlists \
              WHERE user_id = $1 AND ($2 OR removed_timestamp IS NULL) \
              ORDER BY added_timestamp DESC, wishlist_id"
        ))
        .bind(user_id.as_uuid())
        .bind(include_removed)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(WishlistEntry::from).collect())
    }
}
