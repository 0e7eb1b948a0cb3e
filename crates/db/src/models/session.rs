//! Browsing session domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ecomm_core::{DeviceType, SessionId, UserId};

/// Campaign attribution carried on a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utm {
    pub source: Option<String>,
    pub medium: Option<String>,
    pub campaign: Option<String>,
}

/// One browsing session, optionally tied to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    /// `None` for anonymous sessions.
    pub user_id: Option<UserId>,
    pub timestamp_start: DateTime<Utc>,
    /// `None` while the session is open.
    pub timestamp_end: Option<DateTime<Utc>>,
    pub device_type: Option<DeviceType>,
    pub os_info: Option<String>,
    pub browser_info: Option<String>,
    pub ip_address: Option<String>,
    pub referral_source: Option<String>,
    pub utm: Utm,
    pub created_at: DateTime<Utc>,
}

impl Session {
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.timestamp_end.is_none()
    }

    /// Length of a finished session.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.timestamp_end.map(|end| end - self.timestamp_start)
    }
}

/// Input for starting a session.
#[derive(Debug, Clone, Default)]
pub struct NewSession {
    pub user_id: Option<UserId>,
    pub device_type: Option<DeviceType>,
    pub os_info: Option<String>,
    pub browser_info: Option<String>,
    pub ip_address: Option<String>,
    pub referral_source: Option<String>,
    pub utm: Utm,
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn test_open_session_has_no_duration() {
        let now = Utc::now();
        let mut session = Session {
            id: SessionId::generate(),
            user_id: None,
            timestamp_start: now,
            timestamp_end: None,
            device_type: Some(DeviceType::Mobile),
            os_info: None,
            browser_info: None,
            ip_address: None,
            referral_source: None,
            utm: Utm::default(),
            created_at: now,
        };
        assert!(session.is_open());
        assert_eq!(session.duration(), None);

        session.timestamp_end = Some(now + Duration::minutes(12));
        assert!(!session.is_open());
        assert_eq!(session.duration(), Some(Duration::minutes(12)));
    }
}
