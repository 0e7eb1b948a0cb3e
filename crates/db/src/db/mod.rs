//! Repositories over the transactional `PostgreSQL` store.
//!
//! ## Tables
//!
//! - `users`, `user_demographics`, `user_addresses` - Accounts
//! - `sessions` - Browsing sessions (anonymous allowed)
//! - `product_categories`, `products` - Catalog
//! - `product_views`, `wishlists` - Shopper interactions
//! - `carts`, `cart_items` - Open and historical carts
//! - `orders`, `order_items` - Orders created by checkout
//! - `support_tickets`, `ticket_messages` - Customer support
//! - `failed_events` - Ingest dead letters
//!
//! # Migrations
//!
//! The schema is applied by [`crate::migrate::run`]:
//! ```bash
//! cargo run -p ecomm-cli -- migrate run
//! ```

pub mod carts;
pub mod catalog;
pub mod failed_events;
pub mod interactions;
pub mod orders;
pub mod sessions;
pub mod support;
pub mod users;

use sqlx::PgPool;
use sqlx::error::ErrorKind;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use secrecy::ExposeSecret;

use crate::config::DbConfig;

pub use carts::CartRepository;
pub use catalog::CatalogRepository;
pub use failed_events::FailedEventRepository;
pub use interactions::InteractionRepository;
pub use orders::OrderRepository;
pub use sessions::SessionRepository;
pub use support::SupportRepository;
pub use users::UserRepository;

/// SQLSTATE for a value that overflows its column type.
const NUMERIC_OUT_OF_RANGE: &str = "22003";

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// A referenced row does not exist.
    #[error("missing reference: {0}")]
    MissingReference(String),

    /// A check constraint or domain rule rejected the values.
    #[error("invalid value: {0}")]
    Invalid(String),

    /// The entity's lifecycle does not allow the requested change.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
}

impl RepositoryError {
    /// Classify a write error by the constraint it violated.
    ///
    /// `what` describes the write for the error message, e.g. `"user email"`.
    #[must_use]
    pub fn from_write(err: sqlx::Error, what: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            let constraint = db_err.constraint().unwrap_or("unnamed constraint");
            match db_err.kind() {
                ErrorKind::UniqueViolation => {
                    return Self::Conflict(format!("{what} already exists ({constraint})"));
                }
                ErrorKind::ForeignKeyViolation => {
                    return Self::MissingReference(format!("{what}: {constraint}"));
                }
                ErrorKind::CheckViolation | ErrorKind::NotNullViolation => {
                    return Self::Invalid(format!("{what}: {}", db_err.message()));
                }
                _ if db_err.code().as_deref() == Some(NUMERIC_OUT_OF_RANGE) => {
                    return Self::Invalid(format!("{what}: {}", db_err.message()));
                }
                _ => {}
            }
        }
        Self::Database(err)
    }

    /// Build a [`RepositoryError::DataCorruption`] for a column that failed to
    /// parse into its domain type.
    pub(crate) fn corrupt(column: &str, err: impl std::fmt::Display) -> Self {
        Self::DataCorruption(format!("invalid {column} in database: {err}"))
    }
}

/// Create a `PostgreSQL` connection pool from configuration.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(config: &DbConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(config.database_url.expose_secret())
        .await
}

/// Convert a stored non-negative integer column into `u32`.
pub(crate) fn to_u32(column: &str, value: i32) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|e| RepositoryError::corrupt(column, e))
}

/// Convert a count into the `INTEGER` column type.
pub(crate) fn to_i32(column: &str, value: u32) -> Result<i32, RepositoryError> {
    i32::try_from(value).map_err(|_| RepositoryError::Invalid(format!("{column} out of range: {value}")))
}
