//! ecomm database layer.
//!
//! Schema, migration gate, repositories and the services built on them.
//! Everything here talks to `PostgreSQL` through a shared `sqlx::PgPool`.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod migrate;
pub mod models;
pub mod services;

pub use config::{ConfigError, DbConfig};
pub use db::{RepositoryError, create_pool};
