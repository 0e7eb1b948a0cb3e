//! Carts, checkout, orders and wishlists.

#![allow(clippy::unwrap_used)]

use ecomm_core::{CartStatus, OrderStatus};
use ecomm_db::RepositoryError;
use ecomm_db::db::{CartRepository, CatalogRepository, InteractionRepository, OrderRepository};
use ecomm_db::models::NewCart;
use ecomm_db::services::{CheckoutError, CheckoutService};
use ecomm_integration_tests::{TestDb, money};

// =============================================================================
// Carts
// =============================================================================

#[tokio::test]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL and run with --ignored"]
async fn test_cart_item_removal_is_soft() {
    let db = TestDb::new().await.unwrap();
    let user = db.user("Ada").await.unwrap();
    let category = db.category("Books", None).await.unwrap();
    let book = db.product(&category, "12.50").await.unwrap();
    let pen = db.product(&category, "1.99").await.unwrap();
    let cart = db.cart_with(&user, &[(&book, 1), (&pen, 3)]).await.unwrap();

    let carts = CartRepository::new(&db.pool);
    let items = carts.list_items(cart.id, false).await.unwrap();
    assert_eq!(items.len(), 2);

    let removed = carts.remove_item(items[1].id).await.unwrap();
    assert!(!removed.is_active());
    assert!(removed.removed_timestamp.unwrap() >= removed.added_timestamp);

    // Gone from the active view, still in history.
    assert_eq!(carts.list_items(cart.id, false).await.unwrap().len(), 1);
    assert_eq!(carts.list_items(cart.id, true).await.unwrap().len(), 2);

    assert!(matches!(
        carts.remove_item(items[1].id).await,
        Err(RepositoryError::InvalidTransition(_))
    ));

    db.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL and run with --ignored"]
async fn test_add_item_rules() {
    let db = TestDb::new().await.unwrap();
    let user = db.user("Alan").await.unwrap();
    let category = db.category("Games", None).await.unwrap();
    let product = db.product(&category, "30.00").await.unwrap();
    let cart = db.cart_with(&user, &[]).await.unwrap();
    let carts = CartRepository::new(&db.pool);

    assert!(matches!(
        carts.add_item(cart.id, product.id, 0).await,
        Err(RepositoryError::Invalid(_))
    ));

    CatalogRepository::new(&db.pool)
        .set_product_active(product.id, false)
        .await
        .unwrap();
    assert!(matches!(
        carts.add_item(cart.id, product.id, 1).await,
        Err(RepositoryError::Invalid(_))
    ));

    assert!(matches!(
        carts
            .add_item(cart.id, ecomm_core::ProductId::generate(), 1)
            .await,
        Err(RepositoryError::MissingReference(_))
    ));

    db.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL and run with --ignored"]
async fn test_cart_status_moves_only_from_active() {
    let db = TestDb::new().await.unwrap();
    let user = db.user("Hedy").await.unwrap();
    let category = db.category("Radios", None).await.unwrap();
    let product = db.product(&category, "45.00").await.unwrap();
    let cart = db.cart_with(&user, &[(&product, 1)]).await.unwrap();
    let carts = CartRepository::new(&db.pool);

    // Only checkout converts a cart.
    assert!(matches!(
        carts.set_status(cart.id, CartStatus::Converted).await,
        Err(RepositoryError::InvalidTransition(_))
    ));
    assert_eq!(
        carts.get(cart.id).await.unwrap().unwrap().status,
        CartStatus::Active
    );

    let abandoned = carts.set_status(cart.id, CartStatus::Abandoned).await.unwrap();
    assert_eq!(abandoned.status, CartStatus::Abandoned);

    assert!(matches!(
        carts.set_status(cart.id, CartStatus::Active).await,
        Err(RepositoryError::InvalidTransition(_))
    ));
    assert!(matches!(
        carts.add_item(cart.id, product.id, 1).await,
        Err(RepositoryError::InvalidTransition(_))
    ));

    db.cleanup().await.unwrap();
}

// =============================================================================
// Checkout
// =============================================================================

#[tokio::test]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL and run with --ignored"]
async fn test_checkout_prices_from_cart_snapshot() {
    let db = TestDb::new().await.unwrap();
    let user = db.user("Edsger").await.unwrap();
    let (billing, shipping) = db.default_addresses(&user).await.unwrap();
    let category = db.category("Stationery", None).await.unwrap();
    let notebook = db.product(&category, "19.99").await.unwrap();
    let stapler = db.product(&category, "5.00").await.unwrap();
    let cart = db
        .cart_with(&user, &[(&notebook, 2), (&stapler, 1)])
        .await
        .unwrap();

    // A later price change must not reach the order.
    CatalogRepository::new(&db.pool)
        .update_price(notebook.id, money("99.00"))
        .await
        .unwrap();

    let placed = CheckoutService::new(&db.pool)
        .place_order(cart.id, "credit_card", "standard")
        .await
        .unwrap();

    let order = &placed.order;
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.user_id, user.id);
    assert_eq!(order.cart_id, cart.id);
    assert_eq!(order.billing_address_id, billing.id);
    assert_eq!(order.shipping_address_id, shipping.id);
    // 44.98 subtotal, 8% tax, flat shipping under 100.00, no discount.
    assert_eq!(order.tax_amount, money("3.60"));
    assert_eq!(order.shipping_amount, money("10.00"));
    assert_eq!(order.discount_amount, money("0.00"));
    assert_eq!(order.total_amount, money("58.58"));

    let mut prices: Vec<_> = placed.items.iter().map(|i| i.unit_price).collect();
    prices.sort();
    assert_eq!(prices, vec![money("5.00"), money("19.99")]);

    let stored = OrderRepository::new(&db.pool)
        .list_items(order.id)
        .await
        .unwrap();
    assert_eq!(stored.len(), 2);

    let cart = CartRepository::new(&db.pool).get(cart.id).await.unwrap().unwrap();
    assert_eq!(cart.status, CartStatus::Converted);

    db.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL and run with --ignored"]
async fn test_checkout_allocates_discount_to_lines() {
    let db = TestDb::new().await.unwrap();
    let user = db.user("Donald").await.unwrap();
    db.default_addresses(&user).await.unwrap();
    let category = db.category("Typesetting", None).await.unwrap();
    let product = db.product(&category, "150.00").await.unwrap();
    let cart = db.cart_with(&user, &[(&product, 2)]).await.unwrap();

    let placed = CheckoutService::new(&db.pool)
        .place_order(cart.id, "paypal", "express")
        .await
        .unwrap();

    // 300.00 subtotal: free shipping, 10% discount.
    assert_eq!(placed.order.shipping_amount, money("0.00"));
    assert_eq!(placed.order.discount_amount, money("30.00"));
    assert_eq!(placed.order.total_amount, money("294.00"));
    assert_eq!(placed.items[0].discount_amount, money("30.00"));

    db.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL and run with --ignored"]
async fn test_checkout_ignores_removed_items() {
    let db = TestDb::new().await.unwrap();
    let user = db.user("Frances").await.unwrap();
    db.default_addresses(&user).await.unwrap();
    let category = db.category("Compilers", None).await.unwrap();
    let kept = db.product(&category, "20.00").await.unwrap();
    let dropped = db.product(&category, "80.00").await.unwrap();
    let cart = db.cart_with(&user, &[(&kept, 1), (&dropped, 1)]).await.unwrap();

    let carts = CartRepository::new(&db.pool);
    let items = carts.list_items(cart.id, false).await.unwrap();
    let dropped_item = items.iter().find(|i| i.product_id == dropped.id).unwrap();
    carts.remove_item(dropped_item.id).await.unwrap();

    let placed = CheckoutService::new(&db.pool)
        .place_order(cart.id, "credit_card", "standard")
        .await
        .unwrap();
    assert_eq!(placed.items.len(), 1);
    assert_eq!(placed.items[0].product_id, kept.id);

    db.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL and run with --ignored"]
async fn test_cart_checks_out_once() {
    let db = TestDb::new().await.unwrap();
    let user = db.user("Barbara").await.unwrap();
    db.default_addresses(&user).await.unwrap();
    let category = db.category("Languages", None).await.unwrap();
    let product = db.product(&category, "25.00").await.unwrap();
    let cart = db.cart_with(&user, &[(&product, 1)]).await.unwrap();

    let other = db.another_pool().await.unwrap();
    let first = CheckoutService::new(&db.pool);
    let second = CheckoutService::new(&other);
    let (a, b) = tokio::join!(
        first.place_order(cart.id, "credit_card", "standard"),
        second.place_order(cart.id, "credit_card", "standard"),
    );

    let (ok, err) = match (a, b) {
        (Ok(placed), Err(e)) | (Err(e), Ok(placed)) => (placed, e),
        (a, b) => panic!("expected one success and one failure, got {a:?} and {b:?}"),
    };
    assert!(matches!(err, CheckoutError::CartNotActive(_)));

    let orders = OrderRepository::new(&db.pool)
        .list_for_user(user.id)
        .await
        .unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].id, ok.order.id);

    other.close().await;
    db.cleanup().await.unwrap();
}

#[tokio::test]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL and run with --ignored"]
async fn test_checkout_rejections_leave_cart_active() {
    let db = TestDb::new().await.unwrap();
    let user = db.user("John").await.unwrap();
    let category = db.category("Lisp", None).await.unwrap();
    let product = db.product(&category, "10.00").await.unwrap();
    let checkout = CheckoutService::new(&db.pool);

    // No default addresses yet.
    let cart = db.cart_with(&user, &[(&product, 1)]).await.unwrap();
    assert!(matches!(
        checkout.place_order(cart.id, "credit_card", "standard").await,
        Err(CheckoutError::MissingDefaultAddress { .. })
    ));

    db.default_addresses(&user).await.unwrap();

    assert!(matches!(
        checkout.place_order(cart.id, "  ", "standard").await,
        Err(CheckoutError::MissingMethod(_))
    ));

    let empty = db.cart_with(&user, &[]).await.unwrap();
    assert!(matches!(
        checkout.place_order(empty.id, "credit_card", "standard").await,
        Err(CheckoutError::EmptyCart(_))
    ));

    let anonymous = CartRepository::new(&db.pool)
        .create(&NewCart::default())
        .await
        .unwrap();
    assert!(matches!(
        checkout.place_order(anonymous.id, "credit_card", "standard").await,
        Err(CheckoutError::AnonymousCart(_))
    ));

    assert!(matches!(
        checkout
            .place_order(ecomm_core::CartId::generate(), "credit_card", "standard")
            .await,
        Err(CheckoutError::CartNotFound(_))
    ));

    // Every rejection rolled back.
    let cart = CartRepository::new(&db.pool).get(cart.id).await.unwrap().unwrap();
    assert_eq!(cart.status, CartStatus::Active);
    assert!(
        OrderRepository::new(&db.pool)
            .list_for_user(user.id)
            .await
            .unwrap()
            .is_empty()
    );

    db.cleanup().await.unwrap();
}

// =============================================================================
// Orders
// =============================================================================

#[tokio::test]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL and run with --ignored"]
async fn test_order_lifecycle() {
    let db = TestDb::new().await.unwrap();
    let user = db.user("Grace").await.unwrap();
    db.default_addresses(&user).await.unwrap();
    let category = db.category("Cobol", None).await.unwrap();
    let product = db.product(&category, "15.00").await.unwrap();
    let orders = OrderRepository::new(&db.pool);
    let checkout = CheckoutService::new(&db.pool);

    let cart = db.cart_with(&user, &[(&product, 1)]).await.unwrap();
    let order = checkout
        .place_order(cart.id, "credit_card", "standard")
        .await
        .unwrap()
        .order;

    let mut seen = vec![order.status];
    let mut current = order.clone();
    while !current.status.is_terminal() {
        current = orders.advance_status(order.id).await.unwrap();
        seen.push(current.status);
    }
    assert_eq!(
        seen,
        vec![
            OrderStatus::Pending,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ]
    );
    assert!(matches!(
        orders.advance_status(order.id).await,
        Err(RepositoryError::InvalidTransition(_))
    ));
    assert!(matches!(
        orders.cancel(order.id).await,
        Err(RepositoryError::InvalidTransition(_))
    ));

    // A fresh order can be cancelled before it ships.
    let cart = db.cart_with(&user, &[(&product, 2)]).await.unwrap();
    let second = checkout
        .place_order(cart.id, "credit_card", "standard")
        .await
        .unwrap()
        .order;
    orders.advance_status(second.id).await.unwrap();
    let cancelled = orders.cancel(second.id).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert!(cancelled.updated_at >= second.updated_at);

    assert!(matches!(
        orders.advance_status(ecomm_core::OrderId::generate()).await,
        Err(RepositoryError::NotFound)
    ));

    db.cleanup().await.unwrap();
}

// =============================================================================
// Wishlists
// =============================================================================

#[tokio::test]
#[ignore = "requires PostgreSQL; set TEST_DATABASE_URL and run with --ignored"]
async fn test_wishlist_removal_is_soft_and_allows_readding() {
    let db = TestDb::new().await.unwrap();
    let user = db.user("Radia").await.unwrap();
    let category = db.category("Networking", None).await.unwrap();
    let product = db.product(&category, "60.00").await.unwrap();
    let interactions = InteractionRepository::new(&db.pool);

    interactions
        .add_to_wishlist(user.id, product.id, Some("birthday"))
        .await
        .unwrap();
    assert!(matches!(
        interactions.add_to_wishlist(user.id, product.id, None).await,
        Err(RepositoryError::Conflict(_))
    ));

    let removed = interactions
        .remove_from_wishlist(user.id, product.id)
        .await
        .unwrap();
    assert!(!removed.is_active());
    assert!(matches!(
        interactions.remove_from_wishlist(user.id, product.id).await,
        Err(RepositoryError::NotFound)
    ));

    interactions
        .add_to_wishlist(user.id, product.id, None)
        .await
        .unwrap();
    assert_eq!(
        interactions.list_wishlist(user.id, false).await.unwrap().len(),
        1
    );
    assert_eq!(
        interactions.list_wishlist(user.id, true).await.unwrap().len(),
        2
    );

    db.cleanup().await.unwrap();
}
