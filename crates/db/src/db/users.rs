//! User repository for database operations.
//!
//! Covers `users` and its 1-to-many extensions `user_demographics` and
//! `user_addresses`. Users are never deleted; `set_active` disables them.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use ecomm_core::{AddressId, AddressType, DemographicId, Email, Preferences, UserId};

use super::RepositoryError;
use crate::models::user::{
    Address, DefaultAddresses, Demographic, NewAddress, NewDemographic, NewUser, ProfileUpdate,
    User,
};

macro_rules! user_columns {
    () => {
        "user_id, email::text AS email, first_name, last_name, registration_date, \
         last_login, is_active, preferences, created_at, updated_at"
    };
}

macro_rules! address_columns {
    () => {
        "address_id, user_id, address_type, street_address, city, state, country, \
         postal_code, is_default, created_at, updated_at"
    };
}

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    user_id: Uuid,
    email: String,
    first_name: String,
    last_name: String,
    registration_date: DateTime<Utc>,
    last_login: Option<DateTime<Utc>>,
    is_active: bool,
    preferences: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| RepositoryError::corrupt("email", e))?;
        let preferences = Preferences::from_value(row.preferences)
            .map_err(|e| RepositoryError::corrupt("preferences", e))?;

        Ok(Self {
            id: UserId::new(row.user_id),
            email,
            first_name: row.first_name,
            last_name: row.last_name,
            registration_date: row.registration_date,
            last_login: row.last_login,
            is_active: row.is_active,
            preferences,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DemographicRow {
    demographic_id: Uuid,
    user_id: Uuid,
    age_range: Option<String>,
    gender: Option<String>,
    income_bracket: Option<String>,
    occupation: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DemographicRow> for Demographic {
    fn from(row: DemographicRow) -> Self {
        Self {
            id: DemographicId::new(row.demographic_id),
            user_id: UserId::new(row.user_id),
            age_range: row.age_range,
            gender: row.gender,
            income_bracket: row.income_bracket,
            occupation: row.occupation,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AddressRow {
    address_id: Uuid,
    user_id: Uuid,
    address_type: String,
    street_address: String,
    city: String,
    state: Option<String>,
    country: String,
    postal_code: String,
    is_default: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AddressRow> for Address {
    type Error = RepositoryError;

    fn try_from(row: AddressRow) -> Result<Self, Self::Error> {
        let address_type = row
            .address_type
            .parse::<AddressType>()
            .map_err(|e| RepositoryError::corrupt("address_type", e))?;

        Ok(Self {
            id: AddressId::new(row.address_id),
            user_id: UserId::new(row.user_id),
            address_type,
            street_address: row.street_address,
            city: row.city,
            state: row.state,
            country: row.country,
            postal_code: row.postal_code,
            is_default: row.is_default,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for user database operations.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Register a new user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email already exists (in any case).
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn register(&self, new: &NewUser) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(concat!(
            "INSERT INTO users (email, password_hash, first_name, last_name, preferences) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING ",
            user_columns!()
        ))
        .bind(new.email.as_str())
        .bind(&new.password_hash)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(Json(&new.preferences))
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_write(e, "user email"))?;

        let user = User::try_from(row)?;
        tracing::info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    /// Get a user by their ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the stored row is invalid.
    pub async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        sqlx::query_as::<_, UserRow>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users WHERE user_id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(self.pool)
        .await?
        .map(User::try_from)
        .transpose()
    }

    /// Get a user by email address, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the stored row is invalid.
    pub async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        sqlx::query_as::<_, UserRow>(concat!(
            "SELECT ",
            user_columns!(),
            " FROM users WHERE email = $1::citext"
        ))
        .bind(email.as_str())
        .fetch_optional(self.pool)
        .await?
        .map(User::try_from)
        .transpose()
    }

    /// Stamp `last_login` with the current time.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    pub async fn record_login(&self, id: UserId) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(concat!(
            "UPDATE users SET last_login = now() WHERE user_id = $1 RETURNING ",
            user_columns!()
        ))
        .bind(id.as_uuid())
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        User::try_from(row)
    }

    /// Update profile fields. Fields left as `None` keep their value.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    /// Returns `RepositoryError::Conflict` if the new email is taken.
    pub async fn update_profile(
        &self,
        id: UserId,
        update: &ProfileUpdate,
    ) -> Result<User, RepositoryError> {
        if update.is_empty() {
            return self.get_by_id(id).await?.ok_or(RepositoryError::NotFound);
        }

        let row = sqlx::query_as::<_, UserRow>(concat!(
            "UPDATE users SET \
                 email = COALESCE($2::citext, email), \
                 first_name = COALESCE($3, first_name), \
                 last_name = COALESCE($4, last_name) \
             WHERE user_id = $1 \
             RETURNING ",
            user_columns!()
        ))
        .bind(id.as_uuid())
        .bind(update.email.as_ref().map(Email::as_str))
        .bind(update.first_name.as_deref())
        .bind(update.last_name.as_deref())
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::from_write(e, "user email"))?
        .ok_or(RepositoryError::NotFound)?;

        User::try_from(row)
    }

    /// Enable or disable a user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    pub async fn set_active(&self, id: UserId, active: bool) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(concat!(
            "UPDATE users SET is_active = $2 WHERE user_id = $1 RETURNING ",
            user_columns!()
        ))
        .bind(id.as_uuid())
        .bind(active)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        tracing::info!(user_id = %id, active, "User active flag changed");
        User::try_from(row)
    }

    /// Merge `patch` into the user's preferences.
    ///
    /// Keys in `patch` overwrite stored keys; a `null` value deletes the key.
    /// The row is locked for the read-merge-write so concurrent patches
    /// don't drop each other's keys.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user doesn't exist.
    pub async fn update_preferences(
        &self,
        id: UserId,
        patch: Preferences,
    ) -> Result<User, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let current: serde_json::Value =
            sqlx::query_scalar("SELECT preferences FROM users WHERE user_id = $1 FOR UPDATE")
                .bind(id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(RepositoryError::NotFound)?;

        let mut preferences = Preferences::from_value(current)
            .map_err(|e| RepositoryError::corrupt("preferences", e))?;
        preferences.merge(patch);

        let row = sqlx::query_as::<_, UserRow>(concat!(
            "UPDATE users SET preferences = $2 WHERE user_id = $1 RETURNING ",
            user_columns!()
        ))
        .bind(id.as_uuid())
        .bind(Json(&preferences))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        User::try_from(row)
    }

    // -------------------------------------------------------------------------
    // Demographics
    // -------------------------------------------------------------------------

    /// Attach a demographic profile to a user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::MissingReference` if the user doesn't exist.
    pub async fn add_demographic(
        &self,
        user_id: UserId,
        new: &NewDemographic,
    ) -> Result<Demographic, RepositoryError> {
        let row = sqlx::query_as::<_, DemographicRow>(
            r"
            INSERT INTO user_demographics (user_id, age_range, gender, income_bracket, occupation)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING demographic_id, user_id, age_range, gender, income_bracket, occupation,
                      created_at, updated_at
            ",
        )
        .bind(user_id.as_uuid())
        .bind(new.age_range.as_deref())
        .bind(new.gender.as_deref())
        .bind(new.income_bracket.as_deref())
        .bind(new.occupation.as_deref())
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_write(e, "demographic user"))?;

        Ok(row.into())
    }

    /// All demographic rows for a user, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_demographics(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Demographic>, RepositoryError> {
        let rows = sqlx::query_as::<_, DemographicRow>(
            r"
            SELECT demographic_id, user_id, age_range, gender, income_bracket, occupation,
                   created_at, updated_at
            FROM user_demographics
            WHERE user_id = $1
            ORDER BY created_at, demographic_id
            ",
        )
        .bind(user_id.as_uuid())
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Demographic::from).collect())
    }

    // -------------------------------------------------------------------------
    // Addresses
    // -------------------------------------------------------------------------

    /// Add an address. A default address replaces the previous default of
    /// the same type in the same transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::MissingReference` if the user doesn't exist.
    /// Returns `RepositoryError::Invalid` if a required field is rejected.
    pub async fn add_address(
        &self,
        user_id: UserId,
        new: &NewAddress,
    ) -> Result<Address, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        if new.is_default {
            lock_user(&mut tx, user_id).await?;
            clear_default(&mut tx, user_id, new.address_type).await?;
        }

        let row = sqlx::query_as::<_, AddressRow>(concat!(
            "INSERT INTO user_addresses \
                 (user_id, address_type, street_address, city, state, country, postal_code, is_default) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING ",
            address_columns!()
        ))
        .bind(user_id.as_uuid())
        .bind(new.address_type.as_str())
        .bind(&new.street_address)
        .bind(&new.city)
        .bind(new.state.as_deref())
        .bind(&new.country)
        .bind(&new.postal_code)
        .bind(new.is_default)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::from_write(e, "address"))?;

        tx.commit().await?;
        Address::try_from(row)
    }

    /// Make an existing address the default for its type.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the address doesn't belong to the user.
    pub async fn set_default_address(
        &self,
        user_id: UserId,
        address_id: AddressId,
    ) -> Result<Address, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        lock_user(&mut tx, user_id).await?;

        let address_type: String = sqlx::query_scalar(
            "SELECT address_type FROM user_addresses WHERE address_id = $1 AND user_id = $2",
        )
        .bind(address_id.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;
        let address_type = address_type
            .parse::<AddressType>()
            .map_err(|e| RepositoryError::corrupt("address_type", e))?;

        clear_default(&mut tx, user_id, address_type).await?;

        let row = sqlx::query_as::<_, AddressRow>(concat!(
            "UPDATE user_addresses SET is_default = TRUE WHERE address_id = $1 RETURNING ",
            address_columns!()
        ))
        .bind(address_id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Address::try_from(row)
    }

    /// All addresses of a user, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_addresses(&self, user_id: UserId) -> Result<Vec<Address>, RepositoryError> {
        let rows = sqlx::query_as::<_, AddressRow>(concat!(
            "SELECT ",
            address_columns!(),
            " FROM user_addresses WHERE user_id = $1 ORDER BY created_at, address_id"
        ))
        .bind(user_id.as_uuid())
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(Address::try_from).collect()
    }

    /// The user's default billing and shipping addresses.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn default_addresses(
        &self,
        user_id: UserId,
    ) -> Result<DefaultAddresses, RepositoryError> {
        let rows = sqlx::query_as::<_, AddressRow>(concat!(
            "SELECT ",
            address_columns!(),
            " FROM user_addresses WHERE user_id = $1 AND is_default"
        ))
        .bind(user_id.as_uuid())
        .fetch_all(self.pool)
        .await?;

        let addresses = rows
            .into_iter()
            .map(Address::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DefaultAddresses::from_addresses(addresses))
    }
}

/// Serialize default-address changes for one user.
pub(crate) async fn lock_user(
    conn: &mut sqlx::PgConnection,
    user_id: UserId,
) -> Result<(), RepositoryError> {
    sqlx::query_scalar::<_, Uuid>("SELECT user_id FROM users WHERE user_id = $1 FOR UPDATE")
        .bind(user_id.as_uuid())
        .fetch_optional(conn)
        .await?
        .map(|_| ())
        .ok_or_else(|| RepositoryError::MissingReference(format!("user {user_id}")))
}

pub(crate) async fn clear_default(
    conn: &mut sqlx::PgConnection,
    user_id: UserId,
    address_type: AddressType,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        UPDATE user_addresses SET is_default = FALSE
        WHERE user_id = $1 AND address_type = $2 AND is_default
        ",
    )
    .bind(user_id.as_uuid())
    .bind(address_type.as_str())
    .execute(conn)
    .await?;
    Ok(())
}
