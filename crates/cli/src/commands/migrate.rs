//! Schema migration commands.
//!
//! # Usage
//!
//! ```bash
//! ecomm migrate run
//! ecomm migrate status
//! ```
//!
//! Migrations are embedded in the binary from `crates/db/migrations/` and
//! recorded in `_sqlx_migrations`. Running twice is a no-op.

use ecomm_db::migrate::{self, MigrationError, MigrationState};
use sqlx::PgPool;

/// Apply every pending migration.
pub async fn run(pool: &PgPool) -> Result<(), MigrationError> {
    tracing::info!("Running migrations...");
    let report = migrate::run(pool).await?;

    if report.is_noop() {
        tracing::info!(
            already_applied = report.already_applied.len(),
            "Nothing to apply"
        );
    } else {
        tracing::info!(
            applied = ?report.applied,
            already_applied = report.already_applied.len(),
            "Migrations complete!"
        );
    }
    Ok(())
}

/// Print each known migration with its state.
pub async fn status(pool: &PgPool) -> Result<(), MigrationError> {
    let statuses = migrate::status(pool).await?;

    #[allow(clippy::print_stdout)]
    {
        for entry in &statuses {
            let state = match &entry.state {
                MigrationState::Pending => "pending".to_string(),
                MigrationState::Applied { applied_at } => format!("applied {applied_at}"),
                MigrationState::Modified { applied_at } => {
                    format!("MODIFIED since applied {applied_at}")
                }
                MigrationState::Dirty { applied_at } => {
                    format!("FAILED partway at {applied_at}")
                }
                MigrationState::Unknown { applied_at } => {
                    format!("unknown to this build, applied {applied_at}")
                }
            };
            println!("{:>6} {:<32} {state}", entry.version, entry.description);
        }
    }
    Ok(())
}
