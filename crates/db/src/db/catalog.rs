//! Catalog repository: categories and products.
//!
//! The category tree is a forest. The schema rejects a category naming
//! itself as parent; longer cycles are rejected here by walking the proposed
//! parent's ancestors under an advisory lock, so two concurrent moves cannot
//! each pass the check and together form a loop.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use ecomm_core::{CategoryForest, CategoryId, CategoryTreeError, Money, ProductId};

use super::{RepositoryError, to_i32, to_u32};
use crate::models::catalog::{Category, NewCategory, NewProduct, Product};

/// Advisory lock key held while re-parenting categories ("ecomcats" in ASCII).
const CATEGORY_LOCK_KEY: i64 = 0x6563_6f6d_6361_7473;

macro_rules! category_columns {
    () => {
        "category_id, parent_category_id, name, description, created_at, updated_at"
    };
}

macro_rules! product_columns {
    () => {
        "product_id, sku, name, description, category_id, price, cost, stock_quantity, \
         is_active, created_at, updated_at"
    };
}

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct CategoryRow {
    category_id: Uuid,
    parent_category_id: Option<Uuid>,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: CategoryId::new(row.category_id),
            parent_id: row.parent_category_id.map(CategoryId::new),
            name: row.name,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    product_id: Uuid,
    sku: String,
    name: String,
    description: Option<String>,
    category_id: Uuid,
    price: Money,
    cost: Money,
    stock_quantity: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ProductId::new(row.product_id),
            sku: row.sku,
            name: row.name,
            description: row.description,
            category_id: CategoryId::new(row.category_id),
            price: row.price,
            cost: row.cost,
            stock_quantity: to_u32("stock_quantity", row.stock_quantity)?,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for categories and products.
pub struct CatalogRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CatalogRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    // -------------------------------------------------------------------------
    // Categories
    // -------------------------------------------------------------------------

    /// Create a category, optionally under an existing parent.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::MissingReference` if the parent doesn't exist.
    pub async fn create_category(&self, new: &NewCategory) -> Result<Category, RepositoryError> {
        let row = sqlx::query_as::<_, CategoryRow>(concat!(
            "INSERT INTO product_categories (parent_category_id, name, description) \
             VALUES ($1, $2, $3) \
             RETURNING ",
            category_columns!()
        ))
        .bind(new.parent_id.map(|id| id.as_uuid()))
        .bind(&new.name)
        .bind(new.description.as_deref())
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_write(e, "parent category"))?;

        Ok(row.into())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_category(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError> {
        let row = sqlx::query_as::<_, CategoryRow>(concat!(
            "SELECT ",
            category_columns!(),
            " FROM product_categories WHERE category_id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Category::from))
    }

    /// All categories, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError> {
        let rows = sqlx::query_as::<_, CategoryRow>(concat!(
            "SELECT ",
            category_columns!(),
            " FROM product_categories ORDER BY name, category_id"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Category::from).collect())
    }

    /// Snapshot of every parent link, for depth and integrity checks.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn load_forest(&self) -> Result<CategoryForest, RepositoryError> {
        let links: Vec<(Uuid, Option<Uuid>)> =
            sqlx::query_as("SELECT category_id, parent_category_id FROM product_categories")
                .fetch_all(self.pool)
                .await?;

        Ok(CategoryForest::from_links(links.into_iter().map(
            |(id, parent)| (CategoryId::new(id), parent.map(CategoryId::new)),
        )))
    }

    /// Move a category under `new_parent`, or to the top level with `None`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the category doesn't exist,
    /// `RepositoryError::MissingReference` if the parent doesn't exist, and
    /// `RepositoryError::Invalid` if the move would make the category its own
    /// ancestor.
    pub async fn set_category_parent(
        &self,
        id: CategoryId,
        new_parent: Option<CategoryId>,
    ) -> Result<Category, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        lock_category_tree(&mut tx).await?;

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM product_categories WHERE category_id = $1)")
                .bind(id.as_uuid())
                .fetch_one(&mut *tx)
                .await?;
        if !exists {
            return Err(RepositoryError::NotFound);
        }

        if let Some(parent) = new_parent {
            check_parent(&mut tx, id, parent).await?;
        }

        let row = sqlx::query_as::<_, CategoryRow>(concat!(
            "UPDATE product_categories SET parent_category_id = $2 WHERE category_id = $1 RETURNING ",
            category_columns!()
        ))
        .bind(id.as_uuid())
        .bind(new_parent.map(|p| p.as_uuid()))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::from_write(e, "parent category"))?;

        tx.commit().await?;
        Ok(row.into())
    }

    // -------------------------------------------------------------------------
    // Products
    // -------------------------------------------------------------------------

    /// Create a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the SKU is taken and
    /// `RepositoryError::MissingReference` if the category doesn't exist.
    pub async fn create_product(&self, new: &NewProduct) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(concat!(
            "INSERT INTO products (sku, name, description, category_id, price, cost, stock_quantity) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING ",
            product_columns!()
        ))
        .bind(&new.sku)
        .bind(&new.name)
        .bind(new.description.as_deref())
        .bind(new.category_id.as_uuid())
        .bind(new.price)
        .bind(new.cost)
        .bind(to_i32("stock_quantity", new.stock_quantity)?)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_write(e, "product"))?;

        let product = Product::try_from(row)?;
        tracing::info!(product_id = %product.id, sku = %product.sku, "Product created");
        Ok(product)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        sqlx::query_as::<_, ProductRow>(concat!(
            "SELECT ",
            product_columns!(),
            " FROM products WHERE product_id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(self.pool)
        .await?
        .map(Product::try_from)
        .transpose()
    }

    /// Change the list price. Existing cart and order lines keep their snapshot.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product doesn't exist.
    pub async fn update_price(&self, id: ProductId, price: Money) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(concat!(
            "UPDATE products SET price = $2 WHERE product_id = $1 RETURNING ",
            product_columns!()
        ))
        .bind(id.as_uuid())
        .bind(price)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        tracing::info!(product_id = %id, %price, "Product price changed");
        Product::try_from(row)
    }

    /// Add `delta` (possibly negative) to the stock level.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product doesn't exist and
    /// `RepositoryError::Invalid` if stock would drop below zero.
    pub async fn adjust_stock(&self, id: ProductId, delta: i32) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(concat!(
            "UPDATE products SET stock_quantity = stock_quantity + $2 \
             WHERE product_id = $1 AND stock_quantity + $2 >= 0 \
             RETURNING ",
            product_columns!()
        ))
        .bind(id.as_uuid())
        .bind(delta)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::from_write(e, "stock quantity"))?;

        match row {
            Some(row) => Product::try_from(row),
            None => match self.get_product(id).await? {
                Some(product) => Err(RepositoryError::Invalid(format!(
                    "insufficient stock for {}: have {}, change {delta}",
                    product.sku, product.stock_quantity
                ))),
                None => Err(RepositoryError::NotFound),
            },
        }
    }

    /// Activate or retire a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product doesn't exist.
    pub async fn set_product_active(
        &self,
        id: ProductId,
        active: bool,
    ) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(concat!(
            "UPDATE products SET is_active = $2 WHERE product_id = $1 RETURNING ",
            product_columns!()
        ))
        .bind(id.as_uuid())
        .bind(active)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        Product::try_from(row)
    }

    /// Active products with stock, optionally restricted to one category.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_active_in_stock(
        &self,
        category: Option<CategoryId>,
    ) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductRow>(concat!(
            "SELECT ",
            product_columns!(),
            " FROM products \
              WHERE is_active AND stock_quantity > 0 \
                AND ($1::uuid IS NULL OR category_id = $1) \
              ORDER BY name, product_id"
        ))
        .bind(category.map(|id| id.as_uuid()))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(Product::try_from).collect()
    }
}

/// Serialize category tree changes for the rest of the transaction.
pub(crate) async fn lock_category_tree(conn: &mut PgConnection) -> Result<(), RepositoryError> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(CATEGORY_LOCK_KEY)
        .execute(conn)
        .await?;
    Ok(())
}

/// Check that `parent` exists and is not `id` or one of its descendants.
///
/// Call with the tree lock held.
pub(crate) async fn check_parent(
    conn: &mut PgConnection,
    id: CategoryId,
    parent: CategoryId,
) -> Result<(), RepositoryError> {
    if parent == id {
        return Err(RepositoryError::Invalid(
            CategoryTreeError::SelfParent(id).to_string(),
        ));
    }

    // Ancestors of the proposed parent, itself included. UNION (not
    // UNION ALL) keeps the walk finite even over corrupted data.
    let ancestors: Vec<Uuid> = sqlx::query_scalar(
        r"
        WITH RECURSIVE ancestors (category_id, parent_category_id) AS (
            SELECT category_id, parent_category_id
            FROM product_categories
            WHERE category_id = $1
            UNION
            SELECT c.category_id, c.parent_category_id
            FROM product_categories c
            JOIN ancestors a ON c.category_id = a.parent_category_id
        )
        SELECT category_id FROM ancestors
        ",
    )
    .bind(parent.as_uuid())
    .fetch_all(conn)
    .await?;

    if ancestors.is_empty() {
        return Err(RepositoryError::MissingReference(format!(
            "parent category {parent}"
        )));
    }
    if ancestors.contains(&id.as_uuid()) {
        tracing::warn!(category_id = %id, parent_id = %parent, "Rejected cyclic re-parent");
        return Err(RepositoryError::Invalid(
            CategoryTreeError::Cycle(id).to_string(),
        ));
    }
    Ok(())
}
