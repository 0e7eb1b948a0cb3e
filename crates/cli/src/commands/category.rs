//! Category tree audit.
//!
//! # Usage
//!
//! ```bash
//! ecomm category check
//! ```
//!
//! Loads every parent link and reports cycles, self-parents and parents that
//! don't exist. Exits non-zero when anything is found.

use ecomm_db::RepositoryError;
use ecomm_db::db::CatalogRepository;
use sqlx::PgPool;
use thiserror::Error;

/// Errors from the category audit.
#[derive(Debug, Error)]
pub enum CategoryCheckError {
    /// Loading the tree failed.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// The tree is not a forest.
    #[error("{0} problem(s) found in the category tree")]
    Problems(usize),
}

/// Audit the category forest.
pub async fn check(pool: &PgPool) -> Result<(), CategoryCheckError> {
    let forest = CatalogRepository::new(pool).load_forest().await?;
    let problems = forest.problems();

    if problems.is_empty() {
        tracing::info!(
            categories = forest.len(),
            roots = forest.roots().len(),
            "Category tree is consistent"
        );
        return Ok(());
    }

    for problem in &problems {
        tracing::warn!(%problem, "Category tree problem");
    }
    Err(CategoryCheckError::Problems(problems.len()))
}
