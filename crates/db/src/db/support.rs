//! Support ticket repository.
//!
//! A ticket is opened together with its first customer message. Threads are
//! ordered by the database-assigned `seq` column, so messages written in the
//! same instant still have a stable order.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use ecomm_core::{
    IssueType, OrderId, SenderType, TicketId, TicketMessageId, TicketPriority, TicketStatus,
    UserId,
};

use super::RepositoryError;
use crate::models::support::{NewTicket, SATISFACTION_RANGE, SupportTicket, TicketMessage};

macro_rules! ticket_columns {
    () => {
        "ticket_id, user_id, order_id, issue_type, priority, status, created_at, resolved_at, \
         satisfaction_score"
    };
}

macro_rules! message_columns {
    () => {
        "message_id, ticket_id, seq, sender_type, message_text, created_at"
    };
}

#[derive(Debug, sqlx::FromRow)]
struct TicketRow {
    ticket_id: Uuid,
    user_id: Uuid,
    order_id: Option<Uuid>,
    issue_type: String,
    priority: String,
    status: String,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    satisfaction_score: Option<i16>,
}

impl TryFrom<TicketRow> for SupportTicket {
    type Error = RepositoryError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        let satisfaction_score = row
            .satisfaction_score
            .map(u8::try_from)
            .transpose()
            .map_err(|e| RepositoryError::corrupt("satisfaction_score", e))?;

        Ok(Self {
            id: TicketId::new(row.ticket_id),
            user_id: UserId::new(row.user_id),
            order_id: row.order_id.map(OrderId::new),
            issue_type: row
                .issue_type
                .parse::<IssueType>()
                .map_err(|e| RepositoryError::corrupt("issue_type", e))?,
            priority: row
                .priority
                .parse::<TicketPriority>()
                .map_err(|e| RepositoryError::corrupt("priority", e))?,
            status: parse_status(&row.status)?,
            created_at: row.created_at,
            resolved_at: row.resolved_at,
            satisfaction_score,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    message_id: Uuid,
    ticket_id: Uuid,
    seq: i64,
    sender_type: String,
    message_text: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for TicketMessage {
    type Error = RepositoryError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: TicketMessageId::new(row.message_id),
            ticket_id: TicketId::new(row.ticket_id),
            seq: row.seq,
            sender_type: row
                .sender_type
                .parse::<SenderType>()
                .map_err(|e| RepositoryError::corrupt("sender_type", e))?,
            message_text: row.message_text,
            created_at: row.created_at,
        })
    }
}

fn parse_status(raw: &str) -> Result<TicketStatus, RepositoryError> {
    raw.parse().map_err(|e| RepositoryError::corrupt("ticket status", e))
}

/// Repository for support tickets and their message threads.
pub struct SupportRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> SupportRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Open a ticket and post its first customer message atomically.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Invalid` for an empty message and
    /// `RepositoryError::MissingReference` if the user or order doesn't exist.
    pub async fn open_ticket(
        &self,
        new: &NewTicket,
    ) -> Result<(SupportTicket, TicketMessage), RepositoryError> {
        if new.message.trim().is_empty() {
            return Err(RepositoryError::Invalid("ticket message is empty".to_string()));
        }

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, TicketRow>(concat!(
            "INSERT INTO support_tickets (user_id, order_id, issue_type, priority) \
             VALUES ($1, $2, $3, $4) \
             RETURNING ",
            ticket_columns!()
        ))
        .bind(new.user_id.as_uuid())
        .bind(new.order_id.map(|id| id.as_uuid()))
        .bind(new.issue_type.as_str())
        .bind(new.priority.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::from_write(e, "support ticket"))?;
        let ticket = SupportTicket::try_from(row)?;

        let message = insert_message(&mut tx, ticket.id, SenderType::Customer, &new.message).await?;
        tx.commit().await?;

        tracing::info!(
            ticket_id = %ticket.id,
            user_id = %ticket.user_id,
            issue_type = %ticket.issue_type,
            priority = %ticket.priority,
            "Support ticket opened"
        );
        Ok((ticket, message))
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_ticket(&self, id: TicketId) -> Result<Option<SupportTicket>, RepositoryError> {
        sqlx::query_as::<_, TicketRow>(concat!(
            "SELECT ",
            ticket_columns!(),
            " FROM support_tickets WHERE ticket_id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(self.pool)
        .await?
        .map(SupportTicket::try_from)
        .transpose()
    }

    /// Append a message to a ticket that isn't closed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the ticket doesn't exist,
    /// `RepositoryError::InvalidTransition` if it is closed and
    /// `RepositoryError::Invalid` for an empty message.
    pub async fn post_message(
        &self,
        ticket_id: TicketId,
        sender: SenderType,
        text: &str,
    ) -> Result<TicketMessage, RepositoryError> {
        if text.trim().is_empty() {
            return Err(RepositoryError::Invalid("ticket message is empty".to_string()));
        }

        let mut tx = self.pool.begin().await?;
        let status = lock_status(&mut tx, ticket_id).await?;
        if status == TicketStatus::Closed {
            return Err(RepositoryError::InvalidTransition(format!(
                "ticket {ticket_id} is closed"
            )));
        }

        let message = insert_message(&mut tx, ticket_id, sender, text).await?;
        tx.commit().await?;
        Ok(message)
    }

    /// A ticket's messages in posting order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn thread(&self, ticket_id: TicketId) -> Result<Vec<TicketMessage>, RepositoryError> {
        let rows = sqlx::query_as::<_, MessageRow>(concat!(
            "SELECT ",
            message_columns!(),
            " FROM ticket_messages WHERE ticket_id = $1 ORDER BY seq"
        ))
        .bind(ticket_id.as_uuid())
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TicketMessage::try_from).collect()
    }

    /// Move a ticket from `open` to `in_progress`, or `in_progress` to
    /// `resolved`. Resolving stamps `resolved_at`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the ticket doesn't exist and
    /// `RepositoryError::InvalidTransition` if it is already resolved or closed.
    pub async fn advance_ticket(&self, id: TicketId) -> Result<SupportTicket, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let current = lock_status(&mut tx, id).await?;

        // Closing is a separate decision; see `close_ticket`.
        let next = current
            .next()
            .filter(|_| current.is_active())
            .ok_or_else(|| RepositoryError::InvalidTransition(format!("ticket {id} is {current}")))?;

        let row = sqlx::query_as::<_, TicketRow>(concat!(
            "UPDATE support_tickets \
             SET status = $2, \
                 resolved_at = CASE WHEN $2 = 'resolved' THEN now() ELSE resolved_at END \
             WHERE ticket_id = $1 \
             RETURNING ",
            ticket_columns!()
        ))
        .bind(id.as_uuid())
        .bind(next.as_str())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(ticket_id = %id, from = %current, to = %next, "Ticket advanced");
        SupportTicket::try_from(row)
    }

    /// Close a ticket from any other status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the ticket doesn't exist and
    /// `RepositoryError::InvalidTransition` if it is already closed.
    pub async fn close_ticket(&self, id: TicketId) -> Result<SupportTicket, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let current = lock_status(&mut tx, id).await?;

        if current == TicketStatus::Closed {
            return Err(RepositoryError::InvalidTransition(format!(
                "ticket {id} is already closed"
            )));
        }

        let row = sqlx::query_as::<_, TicketRow>(concat!(
            "UPDATE support_tickets SET status = 'closed' WHERE ticket_id = $1 RETURNING ",
            ticket_columns!()
        ))
        .bind(id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(ticket_id = %id, from = %current, "Ticket closed");
        SupportTicket::try_from(row)
    }

    /// Record the customer's satisfaction score.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Invalid` for a score outside 1..=5,
    /// `RepositoryError::NotFound` if the ticket doesn't exist and
    /// `RepositoryError::InvalidTransition` if it isn't resolved or closed.
    pub async fn rate(&self, id: TicketId, score: u8) -> Result<SupportTicket, RepositoryError> {
        if !SATISFACTION_RANGE.contains(&score) {
            return Err(RepositoryError::Invalid(format!(
                "satisfaction score {score} outside {}..={}",
                SATISFACTION_RANGE.start(),
                SATISFACTION_RANGE.end()
            )));
        }

        let mut tx = self.pool.begin().await?;
        let current = lock_status(&mut tx, id).await?;

        if !current.accepts_rating() {
            return Err(RepositoryError::InvalidTransition(format!(
                "ticket {id} is {current} and cannot be rated yet"
            )));
        }

        let row = sqlx::query_as::<_, TicketRow>(concat!(
            "UPDATE support_tickets SET satisfaction_score = $2 WHERE ticket_id = $1 RETURNING ",
            ticket_columns!()
        ))
        .bind(id.as_uuid())
        .bind(i16::from(score))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        SupportTicket::try_from(row)
    }
}

async fn lock_status(conn: &mut PgConnection, id: TicketId) -> Result<TicketStatus, RepositoryError> {
    let status: String =
        sqlx::query_scalar("SELECT status FROM support_tickets WHERE ticket_id = $1 FOR UPDATE")
            .bind(id.as_uuid())
            .fetch_optional(conn)
            .await?
            .ok_or(RepositoryError::NotFound)?;

    parse_status(&status)
}

async fn insert_message(
    conn: &mut PgConnection,
    ticket_id: TicketId,
    sender: SenderType,
    text: &str,
) -> Result<TicketMessage, RepositoryError> {
    let row = sqlx::query_as::<_, MessageRow>(concat!(
        "INSERT INTO ticket_messages (ticket_id, sender_type, message_text) \
         VALUES ($1, $2, $3) \
         RETURNING ",
        message_columns!()
    ))
    .bind(ticket_id.as_uuid())
    .bind(sender.as_str())
    .bind(text)
    .fetch_one(conn)
    .await
    .map_err(|e| RepositoryError::from_write(e, "ticket message"))?;

    TicketMessage::try_from(row)
}
