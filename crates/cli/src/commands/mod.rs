//! Subcommand implementations.

pub mod category;
pub mod checkout;
pub mod ingest;
pub mod migrate;
pub mod order;

use ecomm_db::DbConfig;
use sqlx::PgPool;

/// Load configuration from the environment and open a pool.
pub async fn connect() -> Result<PgPool, Box<dyn std::error::Error>> {
    let config = DbConfig::from_env()?;

    tracing::info!(target = %config.redacted_target(), "Connecting to database...");
    let pool = ecomm_db::create_pool(&config).await?;
    Ok(pool)
}
