//! Database configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Connection
//! - `DATABASE_URL` - Full `PostgreSQL` connection string; when set, the
//!   `POSTGRES_*` variables are ignored
//! - `POSTGRES_HOST` - Server host (default: localhost)
//! - `POSTGRES_PORT` - Server port (default: 5432)
//! - `POSTGRES_DB` - Database name (default: ecommerce)
//! - `POSTGRES_USER` - Role name (default: admin)
//! - `POSTGRES_PASSWORD` - Role password (default: password)
//!
//! ## Pool
//! - `DB_MAX_CONNECTIONS` - Upper bound on pooled connections (default: 10)
//! - `DB_MIN_CONNECTIONS` - Connections kept warm (default: 2)
//! - `DB_ACQUIRE_TIMEOUT_SECS` - Seconds to wait for a connection (default: 10)

use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Connection and pool settings.
#[derive(Clone)]
pub struct DbConfig {
    /// `PostgreSQL` connection URL (contains password)
    pub database_url: SecretString,
    /// Maximum pooled connections
    pub max_connections: u32,
    /// Minimum idle connections
    pub min_connections: u32,
    /// How long `acquire` waits before failing
    pub acquire_timeout: Duration,
}

impl std::fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConfig")
            .field("database_url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish()
    }
}

impl DbConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if a numeric variable does not
    /// parse or the assembled URL is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`DbConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = match lookup("DATABASE_URL") {
            Some(url) => SecretString::from(url),
            None => assemble_url(&lookup)?,
        };

        let max_connections = parse_or_default(&lookup, "DB_MAX_CONNECTIONS", 10)?;
        let min_connections = parse_or_default(&lookup, "DB_MIN_CONNECTIONS", 2)?;
        if min_connections > max_connections {
            return Err(ConfigError::InvalidEnvVar(
                "DB_MIN_CONNECTIONS".to_string(),
                format!("{min_connections} exceeds DB_MAX_CONNECTIONS ({max_connections})"),
            ));
        }
        let acquire_timeout =
            Duration::from_secs(parse_or_default(&lookup, "DB_ACQUIRE_TIMEOUT_SECS", 10)?);

        Ok(Self {
            database_url,
            max_connections,
            min_connections,
            acquire_timeout,
        })
    }

    /// Config for an explicit URL with default pool settings.
    #[must_use]
    pub const fn with_url(database_url: SecretString) -> Self {
        Self {
            database_url,
            max_connections: 10,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(10),
        }
    }

    /// Host and database name, for logging without credentials.
    #[must_use]
    pub fn redacted_target(&self) -> String {
        Url::parse(self.database_url.expose_secret()).map_or_else(
            |_| "[unparseable url]".to_string(),
            |url| {
                format!(
                    "{}:{}{}",
                    url.host_str().unwrap_or("localhost"),
                    url.port().unwrap_or(5432),
                    url.path()
                )
            },
        )
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Build a connection URL from the `POSTGRES_*` parts.
fn assemble_url<F>(lookup: &F) -> Result<SecretString, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let host = get_or_default(lookup, "POSTGRES_HOST", "localhost");
    let port: u16 = parse_or_default(lookup, "POSTGRES_PORT", 5432)?;
    let db = get_or_default(lookup, "POSTGRES_DB", "ecommerce");
    let user = get_or_default(lookup, "POSTGRES_USER", "admin");
    let password = get_or_default(lookup, "POSTGRES_PASSWORD", "password");

    let invalid = |key: &str, e: &dyn std::fmt::Display| {
        ConfigError::InvalidEnvVar(key.to_string(), e.to_string())
    };

    let mut url = Url::parse(&format!("postgres://{host}:{port}"))
        .map_err(|e| invalid("POSTGRES_HOST", &e))?;
    url.set_path(&db);
    url.set_username(&user)
        .map_err(|()| invalid("POSTGRES_USER", &"cannot be used in a URL"))?;
    url.set_password(Some(&password))
        .map_err(|()| invalid("POSTGRES_PASSWORD", &"cannot be used in a URL"))?;

    Ok(SecretString::from(String::from(url)))
}

/// Get a variable with a default value.
fn get_or_default<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).unwrap_or_else(|| default.to_string())
}

/// Parse a variable, falling back to `default` when unset.
fn parse_or_default<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}
