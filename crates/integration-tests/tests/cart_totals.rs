//! Integration tests for the derived cart count and total.

#![allow(clippy::unwrap_used)]

use food_cart_core::{Price, ProductId};
use food_cart_integration_tests::{CallKind, Harness, extra, green_curry, pad_thai};

#[tokio::test]
async fn test_totals_follow_every_mutation() {
    let h = Harness::new();
    assert_eq!(h.cart.cart_count(), 0);
    assert_eq!(h.cart.total_price(), Price::ZERO);

    h.cart.add_item(pad_thai(), 2, vec![]).await.unwrap();
    h.cart.add_item(green_curry(), 1, vec![]).await.unwrap();
    assert_eq!(h.cart.cart_count(), 3);
    assert_eq!(h.cart.total_price(), Price::from_cents(4500));

    h.cart
        .update_quantity(&ProductId::new("green-curry"), 3, None)
        .await
        .unwrap();
    assert_eq!(h.cart.cart_count(), 5);
    assert_eq!(h.cart.total_price(), Price::from_cents(7700));

    h.cart
        .remove_item(&ProductId::new("pad-thai"), None)
        .await
        .unwrap();
    assert_eq!(h.cart.cart_count(), 3);
    assert_eq!(h.cart.total_price(), Price::from_cents(4800));

    h.cart.clear_cart().await.unwrap();
    assert_eq!(h.cart.cart_count(), 0);
    assert_eq!(h.cart.total_price(), Price::ZERO);
}

#[tokio::test]
async fn test_totals_after_rollback_match_items() {
    let h = Harness::new();
    h.cart.add_item(pad_thai(), 2, vec![extra("egg")]).await.unwrap();
    h.service.fail_always(CallKind::Update);

    assert!(
        h.cart
            .update_quantity(&ProductId::new("pad-thai"), 9, None)
            .await
            .is_err()
    );

    let state = h.cart.snapshot();
    assert_eq!(state.cart_count(), 2);
    assert_eq!(state.total_price(), Price::from_cents(2900));
    assert_eq!(h.cart.total_price(), state.total_price());
}

#[tokio::test]
async fn test_totals_include_queued_changes() {
    let h = Harness::new();
    h.cart.set_online_status(false);

    h.cart.add_item(pad_thai(), 4, vec![]).await.unwrap();

    assert_eq!(h.cart.cart_count(), 4);
    assert_eq!(h.cart.total_price(), Price::from_cents(5800));
}
