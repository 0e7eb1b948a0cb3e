//! Users, addresses, demographics, sessions and product views.

#![allow(clippy::unwrap_used)]

use ecomm_core::{AddressType, DeviceType};
use ecomm_db::RepositoryError;
use ecomm_db::db::{InteractionRepository, SessionRepository, UserRepository};
use ecomm_db::models::{NewAddress, NewDemographic, NewProductView, NewSession, Utm};
use ecomm_integration_tests::TestDb;

fn shipping_to(city: &str, is_default: bool) -> NewAddress {
    NewAddress {
        address_type: AddressType::Shipping,
        street_address: "42 Harbour Road".to_string(),
        city: city.to_string(),
        state: None,
        country: "NZ".to_string(),
        postal_code: "6011".to_string(),
        is_default,
    }
}

#[tokio::test]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL and run with --ignored"]
async fn test_one_default_address_per_type() {
    let db = TestDb::new().await.unwrap();
    let users = UserRepository::new(&db.pool);
    let user = db.user("Ada").await.unwrap();
    let (billing, first_shipping) = db.default_addresses(&user).await.unwrap();

    let second = users
        .add_address(user.id, &shipping_to("Wellington", true))
        .await
        .unwrap();
    let defaults = users.default_addresses(user.id).await.unwrap();
    assert_eq!(defaults.shipping.unwrap().id, second.id);
    assert_eq!(defaults.billing.unwrap().id, billing.id);

    let third = users
        .add_address(user.id, &shipping_to("Auckland", false))
        .await
        .unwrap();
    assert!(!third.is_default);

    // Switch back to the first shipping address.
    users
        .set_default_address(user.id, first_shipping.id)
        .await
        .unwrap();
    let all = users.list_addresses(user.id).await.unwrap();
    assert_eq!(all.len(), 4);
    let shipping_defaults: Vec<_> = all
        .iter()
        .filter(|a| a.address_type == AddressType::Shipping && a.is_default)
        .collect();
    assert_eq!(shipping_defaults.len(), 1);
    assert_eq!(shipping_defaults[0].id, first_shipping.id);

    // Someone else's address is not ours to promote.
    let stranger = db.user("Eve").await.unwrap();
    assert!(matches!(
        users.set_default_address(stranger.id, second.id).await,
        Err(RepositoryError::NotFound)
    ));
    assert!(matches!(
        users
            .add_address(ecomm_core::UserId::generate(), &shipping_to("Nowhere", false))
            .await,
        Err(RepositoryError::MissingReference(_))
    ));

    db.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL and run with --ignored"]
async fn test_login_and_disable() {
    let db = TestDb::new().await.unwrap();
    let users = UserRepository::new(&db.pool);
    let user = db.user("Alan").await.unwrap();
    assert!(user.last_login.is_none());
    assert!(user.is_active);

    let logged_in = users.record_login(user.id).await.unwrap();
    assert!(logged_in.last_login.is_some());

    let disabled = users.set_active(user.id, false).await.unwrap();
    assert!(!disabled.is_active);
    // Disabled users stay readable.
    assert!(users.get_by_id(user.id).await.unwrap().is_some());

    assert!(matches!(
        users.record_login(ecomm_core::UserId::generate()).await,
        Err(RepositoryError::NotFound)
    ));

    db.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL and run with --ignored"]
async fn test_demographics_accumulate() {
    let db = TestDb::new().await.unwrap();
    let users = UserRepository::new(&db.pool);
    let user = db.user("Grace").await.unwrap();

    users
        .add_demographic(
            user.id,
            &NewDemographic {
                age_range: Some("25-34".to_string()),
                occupation: Some("Engineer".to_string()),
                ..NewDemographic::default()
            },
        )
        .await
        .unwrap();
    users
        .add_demographic(
            user.id,
            &NewDemographic {
                age_range: Some("35-44".to_string()),
                ..NewDemographic::default()
            },
        )
        .await
        .unwrap();

    let rows = users.list_demographics(user.id).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].occupation.as_deref(), Some("Engineer"));

    assert!(matches!(
        users
            .add_demographic(ecomm_core::UserId::generate(), &NewDemographic::default())
            .await,
        Err(RepositoryError::MissingReference(_))
    ));

    db.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL and run with --ignored"]
async fn test_views_belong_to_sessions() {
    let db = TestDb::new().await.unwrap();
    let user = db.user("Tim").await.unwrap();
    let category = db.category("Browsers", None).await.unwrap();
    let product = db.product(&category, "0.99").await.unwrap();

    let sessions = SessionRepository::new(&db.pool);
    let session = sessions
        .start(&NewSession {
            user_id: Some(user.id),
            device_type: Some(DeviceType::Desktop),
            utm: Utm {
                source: Some("newsletter".to_string()),
                ..Utm::default()
            },
            ..NewSession::default()
        })
        .await
        .unwrap();
    assert_eq!(sessions.list_open(Some(user.id)).await.unwrap().len(), 1);

    let interactions = InteractionRepository::new(&db.pool);
    let view = interactions
        .record_view(&NewProductView {
            session_id: session.id,
            product_id: product.id,
            view_duration_seconds: Some(42),
            source_page: Some("search".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(view.view_duration_seconds, Some(42));

    assert!(matches!(
        interactions
            .record_view(&NewProductView {
                session_id: ecomm_core::SessionId::generate(),
                product_id: product.id,
                view_duration_seconds: None,
                source_page: None,
            })
            .await,
        Err(RepositoryError::MissingReference(_))
    ));

    db.cleanup().await.unwrap();
}
