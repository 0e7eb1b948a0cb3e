//! Status and classification enums for store entities.
//!
//! Every enum here is stored as a short lowercase `VARCHAR` guarded by a
//! `CHECK` constraint, so each one round-trips through `as_str` / `FromStr`.
//! The lifecycle enums (`CartStatus`, `OrderStatus`, `TicketStatus`) also
//! encode which transitions are legal.

use serde::{Deserialize, Serialize};

/// Error returned when a stored or user-supplied string names no variant.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind}: {value}")]
pub struct StatusParseError {
    /// Which enum was being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// The stored string form.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = StatusParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(StatusParseError {
                        kind: $kind,
                        value: s.to_owned(),
                    }),
                }
            }
        }
    };
}

/// Address purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressType {
    Billing,
    Shipping,
}

string_enum!(AddressType, "address type", {
    Billing => "billing",
    Shipping => "shipping",
});

/// Device class recorded on a browsing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Mobile,
    Desktop,
    Tablet,
}

string_enum!(DeviceType, "device type", {
    Mobile => "mobile",
    Desktop => "desktop",
    Tablet => "tablet",
});

/// Cart lifecycle.
///
/// ```text
/// active -> converted
///        -> abandoned
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CartStatus {
    #[default]
    Active,
    Converted,
    Abandoned,
}

string_enum!(CartStatus, "cart status", {
    Active => "active",
    Converted => "converted",
    Abandoned => "abandoned",
});

impl CartStatus {
    /// Whether a cart in this status may move to `to`.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Active, Self::Converted | Self::Abandoned)
        )
    }

    /// Only active carts accept item changes.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Order fulfilment lifecycle.
///
/// ```text
/// pending -> processing -> shipped -> delivered
///    |            |
///    +------------+--> cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

string_enum!(OrderStatus, "order status", {
    Pending => "pending",
    Processing => "processing",
    Shipped => "shipped",
    Delivered => "delivered",
    Cancelled => "cancelled",
});

impl OrderStatus {
    /// The next status along the fulfilment path, if any.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Processing),
            Self::Processing => Some(Self::Shipped),
            Self::Shipped => Some(Self::Delivered),
            Self::Delivered | Self::Cancelled => None,
        }
    }

    /// Orders can be cancelled until they leave the warehouse.
    #[must_use]
    pub const fn can_cancel(self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }
}

/// Support ticket urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TicketPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

string_enum!(TicketPriority, "ticket priority", {
    Low => "low",
    Medium => "medium",
    High => "high",
    Urgent => "urgent",
});

/// Support ticket lifecycle.
///
/// ```text
/// open -> in_progress -> resolved -> closed
///   any non-closed status -> closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    #[default]
    Open,
    InProgress,
    Resolved,
    Closed,
}

string_enum!(TicketStatus, "ticket status", {
    Open => "open",
    InProgress => "in_progress",
    Resolved => "resolved",
    Closed => "closed",
});

impl TicketStatus {
    /// The next status along the handling path, if any.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Open => Some(Self::InProgress),
            Self::InProgress => Some(Self::Resolved),
            Self::Resolved => Some(Self::Closed),
            Self::Closed => None,
        }
    }

    /// Satisfaction can only be recorded once the issue is dealt with.
    #[must_use]
    pub const fn accepts_rating(self) -> bool {
        matches!(self, Self::Resolved | Self::Closed)
    }

    /// Tickets still waiting on the support team.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Open | Self::InProgress)
    }
}

/// What a support ticket is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    OrderStatus,
    DeliveryDelay,
    ProductIssue,
    PaymentIssue,
    ReturnRefund,
    Other,
}

string_enum!(IssueType, "issue type", {
    OrderStatus => "order_status",
    DeliveryDelay => "delivery_delay",
    ProductIssue => "product_issue",
    PaymentIssue => "payment_issue",
    ReturnRefund => "return_refund",
    Other => "other",
});

/// Author of a ticket message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderType {
    Customer,
    SupportAgent,
}

string_enum!(SenderType, "sender type", {
    Customer => "customer",
    SupportAgent => "support_agent",
});

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_strings() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), *status);
        }
        for status in TicketStatus::ALL {
            assert_eq!(status.as_str().parse::<TicketStatus>().unwrap(), *status);
        }
        for issue in IssueType::ALL {
            assert_eq!(issue.to_string().parse::<IssueType>().unwrap(), *issue);
        }
    }

    #[test]
    fn test_serde_matches_stored_form() {
        for status in TicketStatus::ALL {
            let json = serde_json::to_string(status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
        for sender in SenderType::ALL {
            let json = serde_json::to_string(sender).unwrap();
            assert_eq!(json, format!("\"{}\"", sender.as_str()));
        }
    }

    #[test]
    fn test_parse_error_names_kind() {
        let err = "teleported".parse::<OrderStatus>().unwrap_err();
        assert_eq!(err.to_string(), "invalid order status: teleported");
    }

    #[test]
    fn test_cart_transitions() {
        assert!(CartStatus::Active.can_transition_to(CartStatus::Converted));
        assert!(CartStatus::Active.can_transition_to(CartStatus::Abandoned));
        assert!(!CartStatus::Converted.can_transition_to(CartStatus::Active));
        assert!(!CartStatus::Abandoned.can_transition_to(CartStatus::Converted));
        assert!(!CartStatus::Active.can_transition_to(CartStatus::Active));
    }

    #[test]
    fn test_order_path() {
        let mut status = OrderStatus::Pending;
        let mut seen = vec![status];
        while let Some(next) = status.next() {
            status = next;
            seen.push(status);
        }
        assert_eq!(
            seen,
            vec![
                OrderStatus::Pending,
                OrderStatus::Processing,
                OrderStatus::Shipped,
                OrderStatus::Delivered
            ]
        );
        assert!(status.is_terminal());
    }

    #[test]
    fn test_order_cancellation_window() {
        assert!(OrderStatus::Pending.can_cancel());
        assert!(OrderStatus::Processing.can_cancel());
        assert!(!OrderStatus::Shipped.can_cancel());
        assert!(!OrderStatus::Delivered.can_cancel());
        assert!(!OrderStatus::Cancelled.can_cancel());
        assert_eq!(OrderStatus::Cancelled.next(), None);
    }

    #[test]
    fn test_ticket_path() {
        assert_eq!(TicketStatus::Open.next(), Some(TicketStatus::InProgress));
        assert_eq!(TicketStatus::InProgress.next(), Some(TicketStatus::Resolved));
        assert_eq!(TicketStatus::Resolved.next(), Some(TicketStatus::Closed));
        assert_eq!(TicketStatus::Closed.next(), None);
        assert!(!TicketStatus::Open.accepts_rating());
        assert!(TicketStatus::Resolved.accepts_rating());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(TicketPriority::Urgent > TicketPriority::High);
        assert!(TicketPriority::Low < TicketPriority::Medium);
    }
}
