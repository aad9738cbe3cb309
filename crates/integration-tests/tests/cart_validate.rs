//! Integration tests for cart validation.
//!
//! Local checks always run; server checks are added when online and dropped
//! quietly when the server cannot answer.

#![allow(clippy::unwrap_used)]

use food_cart_core::{Price, Product};
use food_cart_integration_tests::{CallKind, Harness, MockCartService, green_curry, pad_thai};

fn negative_price_product() -> Product {
    Product::new("refund", "Refund Line", Price::from_cents(-500), "misc")
}

#[tokio::test]
async fn test_valid_cart_has_no_issues() {
    let h = Harness::new();
    h.cart.add_item(pad_thai(), 2, vec![]).await.unwrap();

    assert!(h.cart.validate_cart().await.is_empty());
    assert!(h.cart.validate_for_checkout().await.is_empty());
    assert_eq!(h.service.call_count(CallKind::Validate), 2);
}

#[tokio::test]
async fn test_empty_cart_blocks_checkout() {
    let h = Harness::new();

    assert!(h.cart.validate_cart().await.is_empty());
    assert_eq!(
        h.cart.validate_for_checkout().await,
        vec!["Cart is empty".to_string()]
    );
}

#[tokio::test]
async fn test_server_issues_are_merged() {
    let service = MockCartService::new().with_catalog([pad_thai()]);
    let h = Harness::with_service(service);
    h.cart.add_item(pad_thai(), 1, vec![]).await.unwrap();
    h.cart.add_item(green_curry(), 1, vec![]).await.unwrap();

    let issues = h.cart.validate_cart().await;

    assert_eq!(issues, vec!["Green Curry is no longer available".to_string()]);
}

#[tokio::test]
async fn test_local_and_server_issues_unioned() {
    let h = Harness::new();
    h.cart.add_item(negative_price_product(), 1, vec![]).await.unwrap();
    h.service
        .set_validation_issues(vec!["Kitchen closes in 5 minutes".to_string()]);

    let issues = h.cart.validate_cart().await;

    assert_eq!(issues.len(), 2);
    assert!(issues[0].contains("price cannot be negative"));
    assert_eq!(issues[1], "Kitchen closes in 5 minutes");
}

#[tokio::test]
async fn test_server_failure_keeps_local_issues() {
    let h = Harness::new();
    h.cart.add_item(negative_price_product(), 1, vec![]).await.unwrap();
    h.service.fail_always(CallKind::Validate);

    let issues = h.cart.validate_cart().await;

    assert_eq!(issues.len(), 1);
    assert!(issues[0].starts_with("Refund Line"));
}

#[tokio::test]
async fn test_offline_validation_is_local_only() {
    let h = Harness::new();
    h.cart.set_online_status(false);
    h.cart.add_item(pad_thai(), 1, vec![]).await.unwrap();

    assert!(h.cart.validate_cart().await.is_empty());
    assert_eq!(h.service.call_count(CallKind::Validate), 0);
}
