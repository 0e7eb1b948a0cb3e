//! Browsing session repository.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use ecomm_core::{DeviceType, SessionId, UserId};

use super::RepositoryError;
use crate::models::session::{NewSession, Session, Utm};

macro_rules! session_columns {
    () => {
        "session_id, user_id, timestamp_start, timestamp_end, device_type, os_info, \
         browser_info, ip_address, referral_source, utm_source, utm_medium, utm_campaign, \
         created_at"
    };
}

#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    session_id: Uuid,
    user_id: Option<Uuid>,
    timestamp_start: DateTime<Utc>,
    timestamp_end: Option<DateTime<Utc>>,
    device_type: Option<String>,
    os_info: Option<String>,
    browser_info: Option<String>,
    ip_address: Option<String>,
    referral_source: Option<String>,
    utm_source: Option<String>,
    utm_medium: Option<String>,
    utm_campaign: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<SessionRow> for Session {
    type Error = RepositoryError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let device_type = row
            .device_type
            .as_deref()
            .map(str::parse::<DeviceType>)
            .transpose()
            .map_err(|e| RepositoryError::corrupt("device_type", e))?;

        Ok(Self {
            id: SessionId::new(row.session_id),
            user_id: row.user_id.map(UserId::new),
            timestamp_start: row.timestamp_start,
            timestamp_end: row.timestamp_end,
            device_type,
            os_info: row.os_info,
            browser_info: row.browser_info,
            ip_address: row.ip_address,
            referral_source: row.referral_source,
            utm: Utm {
                source: row.utm_source,
                medium: row.utm_medium,
                campaign: row.utm_campaign,
            },
            created_at: row.created_at,
        })
    }
}

/// Repository for browsing sessions.
pub struct SessionRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> SessionRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Open a session starting now.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::MissingReference` if `user_id` names no user.
    pub async fn start(&self, new: &NewSession) -> Result<Session, RepositoryError> {
        let row = sqlx::query_as::<_, SessionRow>(concat!(
            "INSERT INTO sessions \
                 (user_id, device_type, os_info, browser_info, ip_address, referral_source, \
                  utm_source, utm_medium, utm_campaign) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING ",
            session_columns!()
        ))
        .bind(new.user_id.map(|id| id.as_uuid()))
        .bind(new.device_type.map(|d| d.as_str()))
        .bind(new.os_info.as_deref())
        .bind(new.browser_info.as_deref())
        .bind(new.ip_address.as_deref())
        .bind(new.referral_source.as_deref())
        .bind(new.utm.source.as_deref())
        .bind(new.utm.medium.as_deref())
        .bind(new.utm.campaign.as_deref())
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_write(e, "session user"))?;

        Session::try_from(row)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: SessionId) -> Result<Option<Session>, RepositoryError> {
        sqlx::query_as::<_, SessionRow>(concat!(
            "SELECT ",
            session_columns!(),
            " FROM sessions WHERE session_id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(self.pool)
        .await?
        .map(Session::try_from)
        .transpose()
    }

    /// Close a session at `at`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the session doesn't exist,
    /// `RepositoryError::InvalidTransition` if it has already ended, and
    /// `RepositoryError::Invalid` if `at` precedes the session start.
    pub async fn end(&self, id: SessionId, at: DateTime<Utc>) -> Result<Session, RepositoryError> {
        let row = sqlx::query_as::<_, SessionRow>(concat!(
            "UPDATE sessions SET timestamp_end = $2 \
             WHERE session_id = $1 AND timestamp_end IS NULL \
             RETURNING ",
            session_columns!()
        ))
        .bind(id.as_uuid())
        .bind(at)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::from_write(e, "session end"))?;

        match row {
            Some(row) => Session::try_from(row),
            None => match self.get(id).await? {
                Some(_) => Err(RepositoryError::InvalidTransition(format!(
                    "session {id} has already ended"
                ))),
                None => Err(RepositoryError::NotFound),
            },
        }
    }

    /// Sessions without an end time, oldest first. Optionally only one user's.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_open(&self, user_id: Option<UserId>) -> Result<Vec<Session>, RepositoryError> {
        let rows = sqlx::query_as::<_, SessionRow>(concat!(
            "SELECT ",
            session_columns!(),
            " FROM sessions \
              WHERE timestamp_end IS NULL AND ($1::uuid IS NULL OR user_id = $1) \
              ORDER BY timestamp_start, session_id"
        ))
        .bind(user_id.map(|id| id.as_uuid()))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(Session::try_from).collect()
    }
}
