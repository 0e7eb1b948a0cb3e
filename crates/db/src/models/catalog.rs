//! Catalog domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ecomm_core::{CategoryId, Money, ProductId};

/// A node in the category forest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    /// `None` for top-level categories.
    pub parent_id: Option<CategoryId>,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for [`Category`].
#[derive(Debug, Clone)]
pub struct NewCategory {
    pub parent_id: Option<CategoryId>,
    pub name: String,
    pub description: Option<String>,
}

/// A sellable product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    /// Stock keeping unit, unique across the catalog.
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub category_id: CategoryId,
    /// Current list price. Carts and orders keep their own snapshot.
    pub price: Money,
    pub cost: Money,
    pub stock_quantity: u32,
    /// Inactive products stay visible to history but cannot be added to carts.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Whether the product can currently be bought.
    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.is_active && self.stock_quantity > 0
    }

    /// Price minus cost, saturating at zero.
    #[must_use]
    pub fn margin(&self) -> Money {
        self.price.saturating_sub(self.cost)
    }
}

/// Input for [`Product`].
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub category_id: CategoryId,
    pub price: Money,
    pub cost: Money,
    pub stock_quantity: u32,
}
