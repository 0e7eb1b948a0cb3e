//! Order domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ecomm_core::{AddressId, CartId, Money, OrderId, OrderItemId, OrderStatus, ProductId, UserId};

/// An order placed from a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    /// The cart this order was placed from. One order per cart.
    pub cart_id: CartId,
    pub status: OrderStatus,
    pub total_amount: Money,
    pub tax_amount: Money,
    pub shipping_amount: Money,
    pub discount_amount: Money,
    pub payment_method: String,
    pub delivery_method: String,
    pub billing_address_id: AddressId,
    pub shipping_address_id: AddressId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A line of an order, with the price snapshot taken at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
    /// This line's share of the order discount.
    pub discount_amount: Money,
    pub created_at: DateTime<Utc>,
}
