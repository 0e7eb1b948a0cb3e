//! ecomm Core - Shared domain types for the transactional commerce store.
//!
//! This crate provides the types used by every ecomm component:
//! - `db` - `PostgreSQL` schema, migration gate, repositories and services
//! - `cli` - Command-line tools for migrations, ingest and order handling
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access. Anything that needs a connection lives in `ecomm-db`.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids, emails, money, statuses and preferences
//! - [`timestamps`] - The `updated_at` stamping contract
//! - [`category`] - Category forest with depth and cycle detection
//! - [`pricing`] - Order totals computed from captured cart prices

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod category;
pub mod pricing;
pub mod timestamps;
pub mod types;

pub use category::{CategoryForest, CategoryTreeError};
pub use pricing::{LineItem, OrderTotals, PricingPolicy};
pub use timestamps::Timestamps;
pub use types::*;
