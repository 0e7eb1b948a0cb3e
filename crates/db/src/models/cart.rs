//! Cart domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ecomm_core::{CartId, CartItemId, CartStatus, LineItem, Money, ProductId, SessionId, UserId};

/// A shopping cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    /// Owner; anonymous carts have none and cannot check out.
    pub user_id: Option<UserId>,
    pub session_id: Option<SessionId>,
    pub status: CartStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for [`Cart`].
#[derive(Debug, Clone, Default)]
pub struct NewCart {
    pub user_id: Option<UserId>,
    pub session_id: Option<SessionId>,
}

/// A line in a cart.
///
/// `unit_price` is the product price captured when the item was added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
    pub added_timestamp: DateTime<Utc>,
    /// Set when the item is removed; the row is kept.
    pub removed_timestamp: Option<DateTime<Utc>>,
}

impl CartItem {
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.removed_timestamp.is_none()
    }

    /// The priced line used for order totals.
    #[must_use]
    pub const fn line_item(&self) -> LineItem {
        LineItem::new(self.quantity, self.unit_price)
    }
}
