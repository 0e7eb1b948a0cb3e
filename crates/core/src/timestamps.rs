//! The `updated_at` stamping contract.
//!
//! Mutable entities carry `created_at` and `updated_at`. In the database the
//! `set_updated_at()` trigger enforces the rules below on every `UPDATE`;
//! [`Timestamps::touched`] is the same rule for code that stamps rows itself:
//!
//! - `updated_at` becomes the moment of the write,
//! - but never moves backwards (a lagging clock keeps the previous value),
//! - and `created_at` is never touched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Creation and last-mutation times of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    /// When the row was inserted.
    pub created_at: DateTime<Utc>,
    /// When the row was last written.
    pub updated_at: DateTime<Utc>,
}

impl Timestamps {
    /// Timestamps for a row inserted at `at`.
    #[must_use]
    pub const fn new(at: DateTime<Utc>) -> Self {
        Self {
            created_at: at,
            updated_at: at,
        }
    }

    /// The timestamps after a write at `now`.
    #[must_use]
    pub fn touched(self, now: DateTime<Utc>) -> Self {
        Self {
            created_at: self.created_at,
            updated_at: stamp_update(self.updated_at, now),
        }
    }
}

/// New `updated_at` for a row previously stamped `previous`, written at `now`.
#[must_use]
pub fn stamp_update(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    previous.max(now)
}
