//! Ingest dead letters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ecomm_core::FailedEventId;

/// An ingest event that could not be decoded or written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedEvent {
    pub id: FailedEventId,
    /// Source topic, or `unknown` when the envelope itself was unreadable.
    pub topic: String,
    /// The raw event. Unparsable lines are stored as a JSON string.
    pub event_data: serde_json::Value,
    pub error_message: String,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_retry_at: Option<DateTime<Utc>>,
}
