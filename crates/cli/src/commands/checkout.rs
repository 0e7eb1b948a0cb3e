//! Checkout command.
//!
//! # Usage
//!
//! ```bash
//! ecomm checkout --cart <CART_ID> --payment credit_card --delivery express
//! ```

use ecomm_core::CartId;
use ecomm_db::services::{CheckoutError, CheckoutService};
use sqlx::PgPool;

/// Place an order from `cart` and log its totals.
pub async fn run(
    pool: &PgPool,
    cart: CartId,
    payment: &str,
    delivery: &str,
) -> Result<(), CheckoutError> {
    let placed = CheckoutService::new(pool)
        .place_order(cart, payment, delivery)
        .await?;

    let order = &placed.order;
    #[allow(clippy::print_stdout)]
    {
        println!("order {}", order.id);
        println!("  items     {}", placed.items.len());
        println!("  tax       {}", order.tax_amount);
        println!("  shipping  {}", order.shipping_amount);
        println!("  discount  {}", order.discount_amount);
        println!("  total     {}", order.total_amount);
    }
    Ok(())
}
