//! Order status commands.
//!
//! # Usage
//!
//! ```bash
//! ecomm order advance --order <ORDER_ID>
//! ecomm order cancel --order <ORDER_ID>
//! ```

use ecomm_core::OrderId;
use ecomm_db::RepositoryError;
use ecomm_db::db::OrderRepository;
use sqlx::PgPool;

/// Move an order to its next status.
pub async fn advance(pool: &PgPool, id: OrderId) -> Result<(), RepositoryError> {
    let order = OrderRepository::new(pool)
        .advance_status(id)
        .await
        .map_err(|e| not_found_as_missing(e, id))?;

    #[allow(clippy::print_stdout)]
    {
        println!("order {} is now {}", order.id, order.status);
    }
    Ok(())
}

/// Cancel an order that hasn't shipped.
pub async fn cancel(pool: &PgPool, id: OrderId) -> Result<(), RepositoryError> {
    let order = OrderRepository::new(pool)
        .cancel(id)
        .await
        .map_err(|e| not_found_as_missing(e, id))?;

    #[allow(clippy::print_stdout)]
    {
        println!("order {} is now {}", order.id, order.status);
    }
    Ok(())
}

/// `NotFound` alone makes a poor error line; name the order.
fn not_found_as_missing(err: RepositoryError, id: OrderId) -> RepositoryError {
    match err {
        RepositoryError::NotFound => RepositoryError::MissingReference(format!("order {id}")),
        other => other,
    }
}
