//! Account domain types.
//!
//! These types represent validated domain objects separate from database row types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ecomm_core::{AddressId, AddressType, DemographicId, Email, Preferences, Timestamps, UserId};

/// A registered customer.
///
/// Users are soft-disabled through `is_active` and never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Sign-in address, unique regardless of case.
    pub email: Email,
    pub first_name: String,
    pub last_name: String,
    /// When the account was registered.
    pub registration_date: DateTime<Utc>,
    /// Most recent sign-in, if any.
    pub last_login: Option<DateTime<Utc>>,
    /// Whether the account may sign in.
    pub is_active: bool,
    /// Free-form preference document.
    pub preferences: Preferences,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
    /// When the user was last updated.
    pub updated_at: DateTime<Utc>,
}

impl User {
    #[must_use]
    pub const fn timestamps(&self) -> Timestamps {
        Timestamps {
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Input for registering a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: Email,
    /// Already-hashed credential; the store never sees plaintext.
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub preferences: Preferences,
}

/// Partial profile update. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub email: Option<Email>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl ProfileUpdate {
    /// Whether the update changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.email.is_none() && self.first_name.is_none() && self.last_name.is_none()
    }
}

/// Demographic profile attached to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Demographic {
    pub id: DemographicId,
    pub user_id: UserId,
    pub age_range: Option<String>,
    pub gender: Option<String>,
    pub income_bracket: Option<String>,
    pub occupation: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for [`Demographic`].
#[derive(Debug, Clone, Default)]
pub struct NewDemographic {
    pub age_range: Option<String>,
    pub gender: Option<String>,
    pub income_bracket: Option<String>,
    pub occupation: Option<String>,
}

/// A billing or shipping address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: AddressId,
    pub user_id: UserId,
    pub address_type: AddressType,
    pub street_address: String,
    pub city: String,
    pub state: Option<String>,
    pub country: String,
    pub postal_code: String,
    /// At most one default per user and address type.
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for [`Address`].
#[derive(Debug, Clone)]
pub struct NewAddress {
    pub address_type: AddressType,
    pub street_address: String,
    pub city: String,
    pub state: Option<String>,
    pub country: String,
    pub postal_code: String,
    /// Make this the default, replacing any previous default of the same type.
    pub is_default: bool,
}

/// A user's current default addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultAddresses {
    pub billing: Option<Address>,
    pub shipping: Option<Address>,
}

impl DefaultAddresses {
    /// Collect defaults from a list of addresses.
    #[must_use]
    pub fn from_addresses(addresses: impl IntoIterator<Item = Address>) -> Self {
        let mut defaults = Self::default();
        for address in addresses.into_iter().filter(|a| a.is_default) {
            match address.address_type {
                AddressType::Billing => defaults.billing = Some(address),
                AddressType::Shipping => defaults.shipping = Some(address),
            }
        }
        defaults
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn address(address_type: AddressType, is_default: bool) -> Address {
        let now = Utc::now();
        Address {
            id: AddressId::generate(),
            user_id: UserId::generate(),
            address_type,
            street_address: "1 Main St".to_string(),
            city: "Springfield".to_string(),
            state: None,
            country: "US".to_string(),
            postal_code: "12345".to_string(),
            is_default,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_default_addresses_picks_defaults_only() {
        let billing = address(AddressType::Billing, true);
        let defaults = DefaultAddresses::from_addresses([
            address(AddressType::Shipping, false),
            billing.clone(),
            address(AddressType::Billing, false),
        ]);
        assert_eq!(defaults.billing, Some(billing));
        assert_eq!(defaults.shipping, None);
    }

    #[test]
    fn test_profile_update_is_empty() {
        assert!(ProfileUpdate::default().is_empty());
        let update = ProfileUpdate {
            first_name: Some("Ada".to_string()),
            ..ProfileUpdate::default()
        };
        assert!(!update.is_empty());
    }

    #[test]
    fn test_user_serialization_keeps_preferences_shape() {
        let now = Utc::now();
        let user = User {
            id: UserId::generate(),
            email: Email::parse("ada@example.com").unwrap(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            registration_date: now,
            last_login: None,
            is_active: true,
            preferences: Preferences::from_value(serde_json::json!({"language": "en"})).unwrap(),
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["email"], "ada@example.com");
        assert_eq!(json["preferences"]["language"], "en");
    }
}
