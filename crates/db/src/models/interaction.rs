//! Product views and wishlists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ecomm_core::{ProductId, ProductViewId, SessionId, UserId, WishlistId};

/// A product page view within a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductView {
    pub id: ProductViewId,
    pub session_id: SessionId,
    pub product_id: ProductId,
    pub view_timestamp: DateTime<Utc>,
    pub view_duration_seconds: Option<u32>,
    /// Where the shopper came from, e.g. `search` or `category`.
    pub source_page: Option<String>,
}

/// Input for [`ProductView`].
#[derive(Debug, Clone)]
pub struct NewProductView {
    pub session_id: SessionId,
    pub product_id: ProductId,
    pub view_duration_seconds: Option<u32>,
    pub source_page: Option<String>,
}

/// A wishlist entry. Removal is soft: the row keeps `removed_timestamp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WishlistEntry {
    pub id: WishlistId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub added_timestamp: DateTime<Utc>,
    pub removed_timestamp: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl WishlistEntry {
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.removed_timestamp.is_none()
    }
}
