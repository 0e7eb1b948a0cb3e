//! Support ticket domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ecomm_core::{
    IssueType, OrderId, SenderType, TicketId, TicketMessageId, TicketPriority, TicketStatus,
    UserId,
};

/// A customer support ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportTicket {
    pub id: TicketId,
    pub user_id: UserId,
    /// The order the ticket is about, if any.
    pub order_id: Option<OrderId>,
    pub issue_type: IssueType,
    pub priority: TicketPriority,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
    /// Set when the ticket is first resolved.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Customer rating, 1 to 5.
    pub satisfaction_score: Option<u8>,
}

/// Input for opening a ticket. `message` becomes the first customer message.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub user_id: UserId,
    pub order_id: Option<OrderId>,
    pub issue_type: IssueType,
    pub priority: TicketPriority,
    pub message: String,
}

/// One message in a ticket thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketMessage {
    pub id: TicketMessageId,
    pub ticket_id: TicketId,
    /// Database-assigned position; threads are ordered by it.
    pub seq: i64,
    pub sender_type: SenderType,
    pub message_text: String,
    pub created_at: DateTime<Utc>,
}

/// Lowest and highest satisfaction scores.
pub const SATISFACTION_RANGE: std::ops::RangeInclusive<u8> = 1..=5;
