//! Migration gate.
//!
//! Migrations live in `crates/db/migrations/` and are embedded with
//! [`sqlx::migrate!`]. sqlx records each one in `_sqlx_migrations` with a
//! checksum of its SQL and applies it in its own transaction, so re-running
//! the gate is a no-op and a recorded migration whose SQL has since changed
//! is refused.
//!
//! Whole runs are serialized with a transaction-scoped advisory lock, so two
//! processes starting at once cannot both apply the same migration and each
//! reports what it actually did.
//!
//! # Usage
//!
//! ```bash
//! ecomm migrate run
//! ecomm migrate status
//! ```

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use sqlx::migrate::{MigrateError, Migration, Migrator};
use sqlx::{PgConnection, PgPool};
use thiserror::Error;

/// Migrations shipped with this build.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Advisory lock key held for a whole run ("ecommmig" in ASCII).
const MIGRATION_LOCK_KEY: i64 = 0x6563_6f6d_6d6d_6967;

/// Extensions the schema depends on.
pub const REQUIRED_EXTENSIONS: &[&str] = &["uuid-ossp", "citext"];

/// Errors that stop a migration run.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A required extension is not installable on this server.
    #[error("required extension(s) unavailable: {}", .0.join(", "))]
    ExtensionUnavailable(Vec<String>),

    /// A recorded migration's SQL no longer matches the embedded copy.
    #[error("migration {0} was modified after being applied")]
    ChecksumMismatch(i64),

    /// The database records a migration this build does not know about.
    #[error("database has unknown migration {0}; is this binary older than the schema?")]
    UnknownMigration(i64),

    #[error("migration error: {0}")]
    Migration(#[source] MigrateError),
}

impl From<MigrateError> for MigrationError {
    fn from(err: MigrateError) -> Self {
        match err {
            MigrateError::VersionMismatch(version) => Self::ChecksumMismatch(version),
            MigrateError::VersionMissing(version) => Self::UnknownMigration(version),
            other => Self::Migration(other),
        }
    }
}

/// A row of `_sqlx_migrations`.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct AppliedMigration {
    pub version: i64,
    pub checksum: Vec<u8>,
    pub installed_on: DateTime<Utc>,
    pub success: bool,
}

/// Outcome of [`run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Versions applied by this run.
    pub applied: Vec<i64>,
    /// Versions that were already recorded.
    pub already_applied: Vec<i64>,
}

impl MigrationReport {
    /// Whether the run changed nothing.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// State of one migration as reported by [`status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationState {
    Pending,
    Applied { applied_at: DateTime<Utc> },
    /// Recorded, but the embedded SQL has changed since.
    Modified { applied_at: DateTime<Utc> },
    /// Started but never finished; needs manual repair.
    Dirty { applied_at: DateTime<Utc> },
    /// Recorded in the database but not embedded in this build.
    Unknown { applied_at: DateTime<Utc> },
}

/// One line of [`status`] output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub version: i64,
    pub description: String,
    pub state: MigrationState,
}

/// Apply every pending embedded migration.
///
/// # Errors
///
/// See [`MigrationError`]. Any error leaves already-committed migrations in
/// place and the failing one fully rolled back.
pub async fn run(pool: &PgPool) -> Result<MigrationReport, MigrationError> {
    let mut gate = pool.begin().await?;
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(MIGRATION_LOCK_KEY)
        .execute(&mut *gate)
        .await?;

    let before = recorded_versions(&mut gate).await?;
    let embedded = embedded_versions();
    if embedded.iter().any(|v| !before.contains(v)) {
        check_extensions(pool).await?;
    }

    MIGRATOR.run(pool).await?;

    let after = recorded_versions(&mut gate).await?;
    gate.commit().await?;

    let report = MigrationReport {
        applied: embedded
            .iter()
            .copied()
            .filter(|v| after.contains(v) && !before.contains(v))
            .collect(),
        already_applied: embedded
            .iter()
            .copied()
            .filter(|v| before.contains(v))
            .collect(),
    };

    if report.is_noop() {
        tracing::info!(count = report.already_applied.len(), "Schema up to date");
    } else {
        tracing::info!(applied = ?report.applied, "Migrations applied");
    }
    Ok(report)
}

/// Report the state of every embedded and recorded migration.
///
/// # Errors
///
/// Returns `MigrationError::Database` if the tracking table cannot be read.
pub async fn status(pool: &PgPool) -> Result<Vec<MigrationStatus>, MigrationError> {
    let mut conn = pool.acquire().await?;
    let recorded = load_recorded(&mut conn).await?;
    Ok(describe(MIGRATOR.iter(), &recorded))
}

/// Pair embedded migrations with recorded history.
#[must_use]
pub fn describe<'m>(
    migrations: impl IntoIterator<Item = &'m Migration>,
    recorded: &[AppliedMigration],
) -> Vec<MigrationStatus> {
    let by_version: HashMap<i64, &AppliedMigration> =
        recorded.iter().map(|r| (r.version, r)).collect();

    let mut statuses: Vec<MigrationStatus> = migrations
        .into_iter()
        .filter(|m| !m.migration_type.is_down_migration())
        .map(|m| {
            let state = match by_version.get(&m.version) {
                None => MigrationState::Pending,
                Some(r) if !r.success => MigrationState::Dirty {
                    applied_at: r.installed_on,
                },
                Some(r) if r.checksum.as_slice() == &*m.checksum => MigrationState::Applied {
                    applied_at: r.installed_on,
                },
                Some(r) => MigrationState::Modified {
                    applied_at: r.installed_on,
                },
            };
            MigrationStatus {
                version: m.version,
                description: m.description.to_string(),
                state,
            }
        })
        .collect();

    let known: BTreeSet<i64> = statuses.iter().map(|s| s.version).collect();
    statuses.extend(
        recorded
            .iter()
            .filter(|r| !known.contains(&r.version))
            .map(|r| MigrationStatus {
                version: r.version,
                description: String::new(),
                state: MigrationState::Unknown {
                    applied_at: r.installed_on,
                },
            }),
    );

    statuses.sort_by_key(|s| s.version);
    statuses
}

// =============================================================================
// Helpers
// =============================================================================

fn embedded_versions() -> Vec<i64> {
    MIGRATOR
        .iter()
        .filter(|m| !m.migration_type.is_down_migration())
        .map(|m| m.version)
        .collect()
}

async fn load_recorded(conn: &mut PgConnection) -> Result<Vec<AppliedMigration>, sqlx::Error> {
    let exists: bool = sqlx::query_scalar("SELECT to_regclass('_sqlx_migrations') IS NOT NULL")
        .fetch_one(&mut *conn)
        .await?;
    if !exists {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, AppliedMigration>(
        "SELECT version, checksum, installed_on, success FROM _sqlx_migrations ORDER BY version",
    )
    .fetch_all(conn)
    .await
}

async fn recorded_versions(conn: &mut PgConnection) -> Result<BTreeSet<i64>, sqlx::Error> {
    Ok(load_recorded(conn)
        .await?
        .into_iter()
        .filter(|r| r.success)
        .map(|r| r.version)
        .collect())
}

/// Fail fast when the server cannot provide the extensions the schema needs.
async fn check_extensions(pool: &PgPool) -> Result<(), MigrationError> {
    let wanted: Vec<String> = REQUIRED_EXTENSIONS.iter().map(ToString::to_string).collect();
    let available: Vec<String> =
        sqlx::query_scalar("SELECT name::text FROM pg_available_extensions WHERE name::text = ANY($1)")
            .bind(&wanted)
            .fetch_all(pool)
            .await?;

    let missing = missing_extensions(&available);
    if missing.is_empty() {
        Ok(())
    } else {
        tracing::error!(missing = ?missing, "Required extensions unavailable");
        Err(MigrationError::ExtensionUnavailable(missing))
    }
}

fn missing_extensions(available: &[String]) -> Vec<String> {
    REQUIRED_EXTENSIONS
        .iter()
        .filter(|ext| !available.iter().any(|a| a == *ext))
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn applied(migration: &Migration) -> AppliedMigration {
        AppliedMigration {
            version: migration.version,
            checksum: migration.checksum.to_vec(),
            installed_on: Utc::now(),
            success: true,
        }
    }

    fn labels(statuses: &[MigrationStatus]) -> Vec<&'static str> {
        statuses
            .iter()
            .map(|s| match s.state {
                MigrationState::Pending => "pending",
                MigrationState::Applied { .. } => "applied",
                MigrationState::Modified { .. } => "modified",
                MigrationState::Dirty { .. } => "dirty",
                MigrationState::Unknown { .. } => "unknown",
            })
            .collect()
    }

    #[test]
    fn test_initial_schema_is_embedded() {
        let first = MIGRATOR.iter().next().unwrap();
        assert_eq!(first.version, 1);
        assert_eq!(first.description, "initial schema");
        assert!(first.sql.contains("CREATE EXTENSION IF NOT EXISTS \"uuid-ossp\""));
        assert!(first.sql.contains("CREATE EXTENSION IF NOT EXISTS citext"));
        assert!(first.sql.contains("FUNCTION set_updated_at()"));
        // sqlx owns the tracking table.
        assert!(!first.sql.contains("_sqlx_migrations"));
    }

    #[test]
    fn test_embedded_versions_are_sorted_and_unique() {
        let versions = embedded_versions();
        let mut sorted = versions.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(versions, sorted);
    }

    #[test]
    fn test_describe_fresh_database() {
        let statuses = describe(MIGRATOR.iter(), &[]);
        assert!(labels(&statuses).iter().all(|l| *l == "pending"));
    }

    #[test]
    fn test_describe_reports_every_state() {
        let first = MIGRATOR.iter().next().unwrap();

        let ok = describe(MIGRATOR.iter(), &[applied(first)]);
        assert_eq!(labels(&ok)[0], "applied");

        let mut edited = applied(first);
        edited.checksum = vec![0; 48];
        assert_eq!(labels(&describe(MIGRATOR.iter(), &[edited]))[0], "modified");

        let mut half_done = applied(first);
        half_done.success = false;
        assert_eq!(labels(&describe(MIGRATOR.iter(), &[half_done]))[0], "dirty");

        let orphan = AppliedMigration {
            version: 99_999,
            checksum: vec![1; 48],
            installed_on: Utc::now(),
            success: true,
        };
        let statuses = describe(MIGRATOR.iter(), &[applied(first), orphan]);
        assert_eq!(statuses.last().unwrap().version, 99_999);
        assert_eq!(labels(&statuses).last(), Some(&"unknown"));
    }

    #[test]
    fn test_sqlx_errors_are_classified() {
        assert!(matches!(
            MigrationError::from(MigrateError::VersionMismatch(1)),
            MigrationError::ChecksumMismatch(1)
        ));
        assert!(matches!(
            MigrationError::from(MigrateError::VersionMissing(7)),
            MigrationError::UnknownMigration(7)
        ));
        assert!(matches!(
            MigrationError::from(MigrateError::Dirty(2)),
            MigrationError::Migration(MigrateError::Dirty(2))
        ));
    }

    #[test]
    fn test_missing_extensions() {
        assert_eq!(missing_extensions(&["citext".to_string()]), vec!["uuid-ossp"]);
        assert!(missing_extensions(&["citext".to_string(), "uuid-ossp".to_string()]).is_empty());
    }

    #[test]
    fn test_extension_error_lists_names() {
        let err = MigrationError::ExtensionUnavailable(vec!["citext".to_string()]);
        assert_eq!(err.to_string(), "required extension(s) unavailable: citext");
    }
}
