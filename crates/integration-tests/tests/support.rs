//! Support tickets and their message threads.

#![allow(clippy::unwrap_used)]

use ecomm_core::{IssueType, SenderType, TicketPriority, TicketStatus};
use ecomm_db::RepositoryError;
use ecomm_db::db::SupportRepository;
use ecomm_db::models::NewTicket;
use ecomm_integration_tests::TestDb;

fn ticket_for(user_id: ecomm_core::UserId, message: &str) -> NewTicket {
    NewTicket {
        user_id,
        order_id: None,
        issue_type: IssueType::DeliveryDelay,
        priority: TicketPriority::High,
        message: message.to_string(),
    }
}

#[tokio::test]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL and run with --ignored"]
async fn test_ticket_lifecycle_and_rating() {
    let db = TestDb::new().await.unwrap();
    let user = db.user("Katherine").await.unwrap();
    let support = SupportRepository::new(&db.pool);

    let (ticket, first) = support
        .open_ticket(&ticket_for(user.id, "Where is my parcel?"))
        .await
        .unwrap();
    assert_eq!(ticket.status, TicketStatus::Open);
    assert_eq!(first.sender_type, SenderType::Customer);
    assert!(ticket.resolved_at.is_none());

    // Rating an open ticket is refused.
    assert!(matches!(
        support.rate(ticket.id, 5).await,
        Err(RepositoryError::InvalidTransition(_))
    ));

    let in_progress = support.advance_ticket(ticket.id).await.unwrap();
    assert_eq!(in_progress.status, TicketStatus::InProgress);
    let resolved = support.advance_ticket(ticket.id).await.unwrap();
    assert_eq!(resolved.status, TicketStatus::Resolved);
    assert!(resolved.resolved_at.is_some());

    // advance only walks active tickets; closing is explicit.
    assert!(matches!(
        support.advance_ticket(ticket.id).await,
        Err(RepositoryError::InvalidTransition(_))
    ));

    assert!(matches!(
        support.rate(ticket.id, 0).await,
        Err(RepositoryError::Invalid(_))
    ));
    assert!(matches!(
        support.rate(ticket.id, 6).await,
        Err(RepositoryError::Invalid(_))
    ));
    let rated = support.rate(ticket.id, 4).await.unwrap();
    assert_eq!(rated.satisfaction_score, Some(4));

    let closed = support.close_ticket(ticket.id).await.unwrap();
    assert_eq!(closed.status, TicketStatus::Closed);
    assert_eq!(closed.resolved_at, resolved.resolved_at);
    assert!(matches!(
        support.close_ticket(ticket.id).await,
        Err(RepositoryError::InvalidTransition(_))
    ));

    db.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL and run with --ignored"]
async fn test_thread_keeps_posting_order() {
    let db = TestDb::new().await.unwrap();
    let user = db.user("Annie").await.unwrap();
    let support = SupportRepository::new(&db.pool);

    let (ticket, _) = support
        .open_ticket(&ticket_for(user.id, "The box arrived damaged"))
        .await
        .unwrap();
    support
        .post_message(ticket.id, SenderType::SupportAgent, "Sorry! Sending a replacement.")
        .await
        .unwrap();
    support
        .post_message(ticket.id, SenderType::Customer, "Thanks")
        .await
        .unwrap();

    let thread = support.thread(ticket.id).await.unwrap();
    let senders: Vec<_> = thread.iter().map(|m| m.sender_type).collect();
    assert_eq!(
        senders,
        vec![SenderType::Customer, SenderType::SupportAgent, SenderType::Customer]
    );
    assert!(thread.windows(2).all(|w| w[0].seq < w[1].seq));

    assert!(matches!(
        support.post_message(ticket.id, SenderType::Customer, "   ").await,
        Err(RepositoryError::Invalid(_))
    ));

    support.close_ticket(ticket.id).await.unwrap();
    assert!(matches!(
        support
            .post_message(ticket.id, SenderType::Customer, "Hello?")
            .await,
        Err(RepositoryError::InvalidTransition(_))
    ));

    db.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL and run with --ignored"]
async fn test_ticket_requires_known_user_and_message() {
    let db = TestDb::new().await.unwrap();
    let support = SupportRepository::new(&db.pool);

    assert!(matches!(
        support
            .open_ticket(&ticket_for(ecomm_core::UserId::generate(), "Hi"))
            .await,
        Err(RepositoryError::MissingReference(_))
    ));

    let user = db.user("Mary").await.unwrap();
    assert!(matches!(
        support.open_ticket(&ticket_for(user.id, "")).await,
        Err(RepositoryError::Invalid(_))
    ));
    assert!(
        support
            .get_ticket(ecomm_core::TicketId::generate())
            .await
            .unwrap()
            .is_none()
    );

    db.cleanup().await.unwrap();
}
