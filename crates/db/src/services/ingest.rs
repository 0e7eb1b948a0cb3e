//! Entity event ingest.
//!
//! Input is newline-delimited JSON, one envelope per line:
//!
//! ```json
//! {"topic": "users", "data": {"user_id": "…", "email": "…", "first_name": "…", "last_name": "…"}}
//! ```
//!
//! Each payload is decoded into a typed record and upserted by its primary
//! key. A line that fails to decode or write is logged, stored in
//! `failed_events`, and skipped; the run carries on. Stored events can be
//! replayed with [`EventIngestor::retry_failed`]. Orders are not an ingest
//! topic: they only come from checkout.

use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use sqlx::types::Json;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use uuid::Uuid;

use ecomm_core::{
    AddressType, CategoryId, DeviceType, Email, FailedEventId, Money, Preferences, UserId,
};

use crate::db::failed_events::FailedEventRepository;
use crate::db::{RepositoryError, catalog, to_i32, users};

/// Topic recorded for lines whose envelope couldn't be read.
const UNKNOWN_TOPIC: &str = "unknown";

/// Width of `failed_events.topic`.
const TOPIC_WIDTH: usize = 100;

/// Errors that can occur while ingesting events.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The line or payload is not valid JSON of the expected shape.
    #[error("malformed event: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The envelope names a topic this ingestor doesn't handle.
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    /// A field decoded but failed validation.
    #[error("invalid {field}: {message}")]
    InvalidField {
        field: &'static str,
        message: String,
    },

    /// The database rejected the write.
    #[error("write failed: {0}")]
    Write(#[from] RepositoryError),

    /// Reading the input failed.
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
}

impl From<sqlx::Error> for IngestError {
    fn from(err: sqlx::Error) -> Self {
        Self::Write(RepositoryError::Database(err))
    }
}

// =============================================================================
// Envelope and Topics
// =============================================================================

/// Entity streams accepted by the ingestor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Users,
    UserDemographics,
    UserAddresses,
    Sessions,
    ProductCategories,
    Products,
}

impl Topic {
    pub const ALL: &'static [Self] = &[
        Self::Users,
        Self::UserDemographics,
        Self::UserAddresses,
        Self::Sessions,
        Self::ProductCategories,
        Self::Products,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::UserDemographics => "user_demographics",
            Self::UserAddresses => "user_addresses",
            Self::Sessions => "sessions",
            Self::ProductCategories => "product_categories",
            Self::Products => "products",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|topic| topic.as_str() == s)
            .ok_or_else(|| IngestError::UnknownTopic(s.to_string()))
    }
}

/// One line of ingest input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub topic: String,
    pub data: Value,
}

/// Counts from one ingest run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub ingested: u64,
    pub failed: u64,
}

/// Counts from one pass over `failed_events`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryReport {
    /// Applied and removed from `failed_events`.
    pub resolved: u64,
    /// Still failing; their retry count went up.
    pub still_failing: u64,
}

// =============================================================================
// Payloads
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
struct UserEvent {
    user_id: Uuid,
    email: Email,
    first_name: String,
    last_name: String,
    #[serde(default)]
    password_hash: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    registration_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    last_login: Option<DateTime<Utc>>,
    #[serde(default)]
    is_active: Option<bool>,
    #[serde(default)]
    preferences: Option<Preferences>,
}

#[derive(Debug, Clone, Deserialize)]
struct DemographicEvent {
    demographic_id: Uuid,
    user_id: Uuid,
    #[serde(default)]
    age_range: Option<String>,
    #[serde(default)]
    gender: Option<String>,
    #[serde(default)]
    income_bracket: Option<String>,
    #[serde(default)]
    occupation: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct AddressEvent {
    address_id: Uuid,
    user_id: Uuid,
    address_type: AddressType,
    street_address: String,
    city: String,
    #[serde(default)]
    state: Option<String>,
    country: String,
    postal_code: String,
    #[serde(default)]
    is_default: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct SessionEvent {
    session_id: Uuid,
    #[serde(default)]
    user_id: Option<Uuid>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    timestamp_start: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    timestamp_end: Option<DateTime<Utc>>,
    #[serde(default)]
    device_type: Option<DeviceType>,
    #[serde(default)]
    os_info: Option<String>,
    #[serde(default)]
    browser_info: Option<String>,
    #[serde(default)]
    ip_address: Option<String>,
    #[serde(default)]
    referral_source: Option<String>,
    #[serde(default)]
    utm_source: Option<String>,
    #[serde(default)]
    utm_medium: Option<String>,
    #[serde(default)]
    utm_campaign: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct CategoryEvent {
    category_id: Uuid,
    #[serde(default)]
    parent_category_id: Option<Uuid>,
    name: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ProductEvent {
    product_id: Uuid,
    sku: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    category_id: Uuid,
    price: Money,
    cost: Money,
    #[serde(default)]
    stock_quantity: u32,
    #[serde(default = "default_true")]
    is_active: bool,
}

const fn default_true() -> bool {
    true
}

/// A decoded payload, ready to upsert.
#[derive(Debug, Clone)]
enum EntityEvent {
    User(UserEvent),
    Demographic(DemographicEvent),
    Address(AddressEvent),
    Session(SessionEvent),
    Category(CategoryEvent),
    Product(ProductEvent),
}

impl EntityEvent {
    fn decode(envelope: &EventEnvelope) -> Result<Self, IngestError> {
        let topic: Topic = envelope.topic.parse()?;
        let data = envelope.data.clone();

        let event = match topic {
            Topic::Users => Self::User(serde_json::from_value(data)?),
            Topic::UserDemographics => Self::Demographic(serde_json::from_value(data)?),
            Topic::UserAddresses => Self::Address(serde_json::from_value(data)?),
            Topic::Sessions => Self::Session(serde_json::from_value(data)?),
            Topic::ProductCategories => Self::Category(serde_json::from_value(data)?),
            Topic::Products => Self::Product(serde_json::from_value(data)?),
        };
        event.validate()?;
        Ok(event)
    }

    fn validate(&self) -> Result<(), IngestError> {
        match self {
            Self::Session(session) => {
                if let Some(ip) = session.ip_address.as_deref() {
                    ip.parse::<IpAddr>().map_err(|e| IngestError::InvalidField {
                        field: "ip_address",
                        message: format!("{ip}: {e}"),
                    })?;
                }
                if let (Some(start), Some(end)) = (session.timestamp_start, session.timestamp_end) {
                    if end < start {
                        return Err(IngestError::InvalidField {
                            field: "timestamp_end",
                            message: "session ends before it starts".to_string(),
                        });
                    }
                }
            }
            Self::Category(category) => {
                if category.parent_category_id == Some(category.category_id) {
                    return Err(IngestError::InvalidField {
                        field: "parent_category_id",
                        message: "category cannot be its own parent".to_string(),
                    });
                }
            }
            Self::User(_) | Self::Demographic(_) | Self::Address(_) | Self::Product(_) => {}
        }
        Ok(())
    }

    const fn topic(&self) -> Topic {
        match self {
            Self::User(_) => Topic::Users,
            Self::Demographic(_) => Topic::UserDemographics,
            Self::Address(_) => Topic::UserAddresses,
            Self::Session(_) => Topic::Sessions,
            Self::Category(_) => Topic::ProductCategories,
            Self::Product(_) => Topic::Products,
        }
    }

    const fn key(&self) -> Uuid {
        match self {
            Self::User(e) => e.user_id,
            Self::Demographic(e) => e.demographic_id,
            Self::Address(e) => e.address_id,
            Self::Session(e) => e.session_id,
            Self::Category(e) => e.category_id,
            Self::Product(e) => e.product_id,
        }
    }
}

/// Accept RFC 3339 timestamps and naive ones (read as UTC), with either a
/// `T` or a space between date and time.
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|n| n.and_utc()))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").map(|n| n.and_utc()))
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|raw| {
            parse_timestamp(&raw)
                .map_err(|e| serde::de::Error::custom(format!("invalid timestamp {raw:?}: {e}")))
        })
        .transpose()
}

/// PostgreSQL text and JSONB cannot hold NUL; store U+FFFD in its place.
fn strip_nul(text: &str) -> String {
    text.replace('\0', "\u{FFFD}")
}

fn strip_nul_value(value: Value) -> Value {
    match value {
        Value::String(s) if s.contains('\0') => Value::String(strip_nul(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_nul_value).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (strip_nul(&k), strip_nul_value(v)))
                .collect(),
        ),
        other => other,
    }
}

/// Errors that mean the database itself is gone, not that one event is bad.
const fn is_connection_error(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}

// =============================================================================
// Ingestor
// =============================================================================

/// Applies entity events to the store.
pub struct EventIngestor<'a> {
    pool: &'a PgPool,
    failed: FailedEventRepository<'a>,
}

impl<'a> EventIngestor<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            pool,
            failed: FailedEventRepository::new(pool),
        }
    }

    /// Ingest every line of `reader`. Blank lines are ignored.
    ///
    /// # Errors
    ///
    /// Returns `IngestError::Io` if the input can't be read and
    /// `IngestError::Write` if the database connection is lost. Failures of
    /// individual events are counted in the report instead.
    pub async fn run<R>(&self, reader: R) -> Result<IngestReport, IngestError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut report = IngestReport::default();
        let mut lines = reader.lines();
        let mut line_no: u64 = 0;

        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match self.ingest_line(line).await {
                Ok(topic) => {
                    report.ingested += 1;
                    tracing::debug!(line = line_no, topic = %topic, "Event ingested");
                }
                Err(err) => {
                    report.failed += 1;
                    self.dead_letter(line_no, line, &err).await?;
                }
            }
        }

        tracing::info!(
            ingested = report.ingested,
            failed = report.failed,
            "Ingest finished"
        );
        Ok(report)
    }

    /// Ingest one raw line.
    ///
    /// # Errors
    ///
    /// Returns the decode or write error for this event.
    pub async fn ingest_line(&self, line: &str) -> Result<Topic, IngestError> {
        let envelope: EventEnvelope = serde_json::from_str(line)?;
        self.ingest(&envelope).await
    }

    /// Decode and upsert one event.
    ///
    /// # Errors
    ///
    /// Returns the decode or write error for this event.
    pub async fn ingest(&self, envelope: &EventEnvelope) -> Result<Topic, IngestError> {
        let event = EntityEvent::decode(envelope)?;
        let topic = event.topic();
        let key = event.key();

        match event {
            EntityEvent::User(e) => self.upsert_user(&e).await?,
            EntityEvent::Demographic(e) => self.upsert_demographic(&e).await?,
            EntityEvent::Address(e) => self.upsert_address(&e).await?,
            EntityEvent::Session(e) => self.upsert_session(&e).await?,
            EntityEvent::Category(e) => self.upsert_category(&e).await?,
            EntityEvent::Product(e) => self.upsert_product(&e).await?,
        }

        tracing::trace!(topic = %topic, key = %key, "Upserted");
        Ok(topic)
    }

    /// Replay up to `limit` stored failures, oldest first, optionally for one
    /// topic. Events that now apply are deleted; the rest get another retry
    /// counted against them.
    ///
    /// # Errors
    ///
    /// Returns `IngestError::Write` if `failed_events` can't be read or
    /// updated.
    pub async fn retry_failed(
        &self,
        topic: Option<&str>,
        limit: i64,
    ) -> Result<RetryReport, IngestError> {
        let mut report = RetryReport::default();

        for event in self.failed.list(topic, limit).await? {
            let outcome = match serde_json::from_value::<EventEnvelope>(event.event_data) {
                Ok(envelope) => self.ingest(&envelope).await,
                Err(err) => Err(err.into()),
            };

            match outcome {
                Ok(topic) => {
                    self.failed.delete(event.id).await?;
                    report.resolved += 1;
                    tracing::info!(event_id = %event.id, topic = %topic, "Failed event applied");
                }
                Err(err) => {
                    self.still_failing(event.id, &err).await?;
                    report.still_failing += 1;
                }
            }
        }

        tracing::info!(
            resolved = report.resolved,
            still_failing = report.still_failing,
            "Retry finished"
        );
        Ok(report)
    }

    async fn still_failing(&self, id: FailedEventId, err: &IngestError) -> Result<(), IngestError> {
        let message = strip_nul(&err.to_string());
        let event = self.failed.mark_retry(id, &message).await?;
        tracing::warn!(
            event_id = %id,
            retry_count = event.retry_count,
            error = %message,
            "Failed event still failing"
        );
        Ok(())
    }

    async fn dead_letter(&self, line_no: u64, line: &str, err: &IngestError) -> Result<(), IngestError> {
        let raw: Option<Value> = serde_json::from_str(line).ok();
        let topic: String = raw
            .as_ref()
            .and_then(|v| v.get("topic"))
            .and_then(Value::as_str)
            .map_or_else(|| UNKNOWN_TOPIC.to_string(), strip_nul)
            .chars()
            .take(TOPIC_WIDTH)
            .collect();
        let event_data = strip_nul_value(raw.unwrap_or_else(|| Value::String(line.to_string())));
        let message = strip_nul(&err.to_string());

        tracing::warn!(line = line_no, topic = %topic, error = %message, "Event failed");
        match self.failed.record(&topic, &event_data, &message).await {
            Ok(_) => Ok(()),
            Err(RepositoryError::Database(db_err)) if is_connection_error(&db_err) => {
                Err(IngestError::Write(RepositoryError::Database(db_err)))
            }
            Err(store_err) => {
                tracing::error!(
                    line = line_no,
                    topic = %topic,
                    error = %store_err,
                    "Failed event could not be stored"
                );
                Ok(())
            }
        }
    }

    // -------------------------------------------------------------------------
    // Upserts
    // -------------------------------------------------------------------------

    async fn upsert_user(&self, e: &UserEvent) -> Result<(), IngestError> {
        sqlx::query(
            r"
            INSERT INTO users
                (user_id, email, password_hash, first_name, last_name, registration_date,
                 last_login, is_active, preferences)
            VALUES ($1, $2, COALESCE($3, ''), $4, $5, COALESCE($6, now()), $7,
                    COALESCE($8, TRUE), COALESCE($9, '{}'::jsonb))
            ON CONFLICT (user_id) DO UPDATE SET
                email = EXCLUDED.email,
                password_hash = COALESCE($3, users.password_hash),
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                registration_date = COALESCE($6, users.registration_date),
                last_login = COALESCE($7, users.last_login),
                is_active = COALESCE($8, users.is_active),
                preferences = COALESCE($9, users.preferences)
            ",
        )
        .bind(e.user_id)
        .bind(e.email.as_str())
        .bind(e.password_hash.as_deref())
        .bind(&e.first_name)
        .bind(&e.last_name)
        .bind(e.registration_date)
        .bind(e.last_login)
        .bind(e.is_active)
        .bind(e.preferences.as_ref().map(Json))
        .execute(self.pool)
        .await
        .map_err(|err| RepositoryError::from_write(err, "user"))?;
        Ok(())
    }

    async fn upsert_demographic(&self, e: &DemographicEvent) -> Result<(), IngestError> {
        sqlx::query(
            r"
            INSERT INTO user_demographics
                (demographic_id, user_id, age_range, gender, income_bracket, occupation)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (demographic_id) DO UPDATE SET
                user_id = EXCLUDED.user_id,
                age_range = EXCLUDED.age_range,
                gender = EXCLUDED.gender,
                income_bracket = EXCLUDED.income_bracket,
                occupation = EXCLUDED.occupation
            ",
        )
        .bind(e.demographic_id)
        .bind(e.user_id)
        .bind(e.age_range.as_deref())
        .bind(e.gender.as_deref())
        .bind(e.income_bracket.as_deref())
        .bind(e.occupation.as_deref())
        .execute(self.pool)
        .await
        .map_err(|err| RepositoryError::from_write(err, "demographic"))?;
        Ok(())
    }

    async fn upsert_address(&self, e: &AddressEvent) -> Result<(), IngestError> {
        let mut tx = self.pool.begin().await?;

        if e.is_default {
            let user_id = UserId::new(e.user_id);
            users::lock_user(&mut tx, user_id).await?;
            users::clear_default(&mut tx, user_id, e.address_type).await?;
        }

        sqlx::query(
            r"
            INSERT INTO user_addresses
                (address_id, user_id, address_type, street_address, city, state, country,
                 postal_code, is_default)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (address_id) DO UPDATE SET
                user_id = EXCLUDED.user_id,
                address_type = EXCLUDED.address_type,
                street_address = EXCLUDED.street_address,
                city = EXCLUDED.city,
                state = EXCLUDED.state,
                country = EXCLUDED.country,
                postal_code = EXCLUDED.postal_code,
                is_default = EXCLUDED.is_default
            ",
        )
        .bind(e.address_id)
        .bind(e.user_id)
        .bind(e.address_type.as_str())
        .bind(&e.street_address)
        .bind(&e.city)
        .bind(e.state.as_deref())
        .bind(&e.country)
        .bind(&e.postal_code)
        .bind(e.is_default)
        .execute(&mut *tx)
        .await
        .map_err(|err| RepositoryError::from_write(err, "address"))?;

        tx.commit().await?;
        Ok(())
    }

    async fn upsert_session(&self, e: &SessionEvent) -> Result<(), IngestError> {
        sqlx::query(
            r"
            INSERT INTO sessions
                (session_id, user_id, timestamp_start, timestamp_end, device_type, os_info,
                 browser_info, ip_address, referral_source, utm_source, utm_medium, utm_campaign)
            VALUES ($1, $2, COALESCE($3, now()), $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (session_id) DO UPDATE SET
                user_id = COALESCE(EXCLUDED.user_id, sessions.user_id),
                timestamp_start = COALESCE($3, sessions.timestamp_start),
                timestamp_end = COALESCE($4, sessions.timestamp_end),
                device_type = EXCLUDED.device_type,
                os_info = EXCLUDED.os_info,
                browser_info = EXCLUDED.browser_info,
                ip_address = EXCLUDED.ip_address,
                referral_source = EXCLUDED.referral_source,
                utm_source = EXCLUDED.utm_source,
                utm_medium = EXCLUDED.utm_medium,
                utm_campaign = EXCLUDED.utm_campaign
            ",
        )
        .bind(e.session_id)
        .bind(e.user_id)
        .bind(e.timestamp_start)
        .bind(e.timestamp_end)
        .bind(e.device_type.map(|d| d.as_str()))
        .bind(e.os_info.as_deref())
        .bind(e.browser_info.as_deref())
        .bind(e.ip_address.as_deref())
        .bind(e.referral_source.as_deref())
        .bind(e.utm_source.as_deref())
        .bind(e.utm_medium.as_deref())
        .bind(e.utm_campaign.as_deref())
        .execute(self.pool)
        .await
        .map_err(|err| RepositoryError::from_write(err, "session"))?;
        Ok(())
    }

    async fn upsert_category(&self, e: &CategoryEvent) -> Result<(), IngestError> {
        let mut tx = self.pool.begin().await?;

        catalog::lock_category_tree(&mut tx).await?;
        if let Some(parent) = e.parent_category_id {
            catalog::check_parent(&mut tx, CategoryId::new(e.category_id), CategoryId::new(parent))
                .await?;
        }

        sqlx::query(
            r"
            INSERT INTO product_categories (category_id, parent_category_id, name, description)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (category_id) DO UPDATE SET
                parent_category_id = EXCLUDED.parent_category_id,
                name = EXCLUDED.name,
                description = EXCLUDED.description
            ",
        )
        .bind(e.category_id)
        .bind(e.parent_category_id)
        .bind(&e.name)
        .bind(e.description.as_deref())
        .execute(&mut *tx)
        .await
        .map_err(|err| RepositoryError::from_write(err, "category"))?;

        tx.commit().await?;
        Ok(())
    }

    async fn upsert_product(&self, e: &ProductEvent) -> Result<(), IngestError> {
        sqlx::query(
            r"
            INSERT INTO products
                (product_id, sku, name, description, category_id, price, cost, stock_quantity,
                 is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (product_id) DO UPDATE SET
                sku = EXCLUDED.sku,
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                category_id = EXCLUDED.category_id,
                price = EXCLUDED.price,
                cost = EXCLUDED.cost,
                stock_quantity = EXCLUDED.stock_quantity,
                is_active = EXCLUDED.is_active
            ",
        )
        .bind(e.product_id)
        .bind(&e.sku)
        .bind(&e.name)
        .bind(e.description.as_deref())
        .bind(e.category_id)
        .bind(e.price)
        .bind(e.cost)
        .bind(to_i32("stock_quantity", e.stock_quantity)?)
        .bind(e.is_active)
        .execute(self.pool)
        .await
        .map_err(|err| RepositoryError::from_write(err, "product"))?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Datelike, Timelike};
    use serde_json::json;

    use super::*;

    fn envelope(topic: &str, data: Value) -> EventEnvelope {
        EventEnvelope {
            topic: topic.to_string(),
            data,
        }
    }

    fn user_data() -> Value {
        json!({
            "user_id": "6f1c2a8e-3b5d-4c7a-9e2f-0a1b2c3d4e5f",
            "email": "Ada.Lovelace@Example.com",
            "first_name": "Ada",
            "last_name": "Lovelace",
            "registration_date": "2024-03-01T09:30:00.123456",
            "last_login": null,
            "is_active": true,
            "preferences": {"language": "en", "currency": "EUR", "notifications": true}
        })
    }

    #[test]
    fn test_topic_names_round_trip() {
        for topic in Topic::ALL {
            assert_eq!(topic.as_str().parse::<Topic>().unwrap(), *topic);
        }
    }

    #[test]
    fn test_orders_are_not_a_topic() {
        let err = EntityEvent::decode(&envelope("orders", json!({}))).unwrap_err();
        assert!(matches!(err, IngestError::UnknownTopic(t) if t == "orders"));
    }

    #[test]
    fn test_decodes_generated_user() {
        let event = EntityEvent::decode(&envelope("users", user_data())).unwrap();
        let EntityEvent::User(user) = event else {
            panic!("expected a user event");
        };
        assert_eq!(user.email.as_str(), "Ada.Lovelace@Example.com");
        assert_eq!(user.password_hash, None);
        let registered = user.registration_date.unwrap();
        assert_eq!(registered.month(), 3);
        assert_eq!(registered.hour(), 9);
        assert_eq!(
            user.preferences.unwrap().get("currency"),
            Some(&json!("EUR"))
        );
    }

    #[test]
    fn test_user_requires_names_and_email() {
        for field in ["email", "first_name", "last_name"] {
            let mut data = user_data();
            data.as_object_mut().unwrap().remove(field);
            let err = EntityEvent::decode(&envelope("users", data)).unwrap_err();
            assert!(
                err.to_string().contains(field),
                "error for missing {field}: {err}"
            );
        }
    }

    #[test]
    fn test_user_rejects_bad_email() {
        let mut data = user_data();
        data["email"] = json!("not-an-email");
        assert!(matches!(
            EntityEvent::decode(&envelope("users", data)),
            Err(IngestError::Malformed(_))
        ));
    }

    #[test]
    fn test_product_amounts_accept_numbers_and_strings() {
        let data = json!({
            "product_id": "0d9b6a52-6a57-4c39-9d55-6f1d4b7c8e21",
            "sku": "SKU-1001",
            "name": "Kettle",
            "category_id": "3f5e7d9c-1b2a-4c3d-8e9f-0a1b2c3d4e5f",
            "price": 39.99,
            "cost": "21.50",
            "stock_quantity": 12
        });
        let EntityEvent::Product(product) = EntityEvent::decode(&envelope("products", data)).unwrap()
        else {
            panic!("expected a product event");
        };
        assert_eq!(product.price, "39.99".parse().unwrap());
        assert_eq!(product.cost, "21.50".parse().unwrap());
        assert!(product.is_active);
    }

    #[test]
    fn test_product_rejects_negative_stock() {
        let data = json!({
            "product_id": "0d9b6a52-6a57-4c39-9d55-6f1d4b7c8e21",
            "sku": "SKU-1001",
            "name": "Kettle",
            "category_id": "3f5e7d9c-1b2a-4c3d-8e9f-0a1b2c3d4e5f",
            "price": "39.99",
            "cost": "21.50",
            "stock_quantity": -3
        });
        assert!(EntityEvent::decode(&envelope("products", data)).is_err());
    }

    #[test]
    fn test_session_validation() {
        let base = json!({
            "session_id": "9a8b7c6d-5e4f-4a3b-8c2d-1e0f9a8b7c6d",
            "user_id": null,
            "timestamp_start": "2024-05-01 10:00:00",
            "device_type": "tablet",
            "ip_address": "203.0.113.7"
        });
        let EntityEvent::Session(session) =
            EntityEvent::decode(&envelope("sessions", base.clone())).unwrap()
        else {
            panic!("expected a session event");
        };
        assert_eq!(session.device_type, Some(DeviceType::Tablet));
        assert!(session.user_id.is_none());

        let mut bad_ip = base.clone();
        bad_ip["ip_address"] = json!("300.1.1.1");
        assert!(matches!(
            EntityEvent::decode(&envelope("sessions", bad_ip)),
            Err(IngestError::InvalidField { field: "ip_address", .. })
        ));

        let mut backwards = base;
        backwards["timestamp_end"] = json!("2024-05-01T09:00:00Z");
        assert!(matches!(
            EntityEvent::decode(&envelope("sessions", backwards)),
            Err(IngestError::InvalidField { field: "timestamp_end", .. })
        ));
    }

    #[test]
    fn test_category_cannot_parent_itself() {
        let data = json!({
            "category_id": "3f5e7d9c-1b2a-4c3d-8e9f-0a1b2c3d4e5f",
            "parent_category_id": "3f5e7d9c-1b2a-4c3d-8e9f-0a1b2c3d4e5f",
            "name": "Loop"
        });
        assert!(matches!(
            EntityEvent::decode(&envelope("product_categories", data)),
            Err(IngestError::InvalidField { field: "parent_category_id", .. })
        ));
    }

    #[test]
    fn test_nul_is_replaced_everywhere() {
        let raw = json!({
            "topic": "users",
            "data": {"first_name": "A\u{0}", "tags": ["x\u{0}y"], "k\u{0}": 1, "n": 5}
        });
        let clean = strip_nul_value(raw);
        assert!(!clean.to_string().contains("\\u0000"));
        assert_eq!(clean["data"]["first_name"], json!("A\u{FFFD}"));
        assert_eq!(clean["data"]["tags"][0], json!("x\u{FFFD}y"));
        assert_eq!(clean["data"]["k\u{FFFD}"], json!(1));
        assert_eq!(clean["data"]["n"], json!(5));
    }

    #[test]
    fn test_only_lost_connections_stop_a_run() {
        assert!(is_connection_error(&sqlx::Error::PoolTimedOut));
        assert!(is_connection_error(&sqlx::Error::PoolClosed));
        assert!(!is_connection_error(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn test_timestamp_formats() {
        let expected = parse_timestamp("2024-01-02T03:04:05Z").unwrap();
        assert_eq!(parse_timestamp("2024-01-02T03:04:05").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-01-02 03:04:05").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-01-02T05:04:05+02:00").unwrap(), expected);
        assert!(parse_timestamp("yesterday").is_err());
    }
}
