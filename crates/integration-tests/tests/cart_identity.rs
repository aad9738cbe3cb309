//! Integration tests for cart line identity.
//!
//! A line is a product id plus a set of option names; adding an existing line
//! merges quantities instead of creating a second line.

#![allow(clippy::unwrap_used)]

use food_cart_core::ProductId;
use food_cart_integration_tests::{CallKind, Harness, extra, green_curry, line, pad_thai};
use food_cart_sync::{CartError, MutationOutcome};

// =============================================================================
// Merging
// =============================================================================

#[tokio::test]
async fn test_same_product_and_options_merge_into_one_line() {
    let h = Harness::new();

    h.cart
        .add_item(pad_thai(), 2, vec![extra("egg"), extra("tofu")])
        .await
        .unwrap();
    let outcome = h
        .cart
        .add_item(pad_thai(), 3, vec![extra("tofu"), extra("egg")])
        .await
        .unwrap();

    assert_eq!(outcome, MutationOutcome::Synced);
    let items = h.cart.items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].quantity, 5);
    assert_eq!(h.service.server_items(), items);
}

#[tokio::test]
async fn test_different_options_are_distinct_lines() {
    let h = Harness::new();

    h.cart.add_item(pad_thai(), 1, vec![extra("egg")]).await.unwrap();
    h.cart.add_item(pad_thai(), 1, vec![extra("tofu")]).await.unwrap();
    h.cart.add_item(pad_thai(), 1, vec![]).await.unwrap();

    assert_eq!(h.cart.items().len(), 3);
    assert_eq!(h.cart.cart_count(), 3);
}

#[tokio::test]
async fn test_merged_quantity_above_maximum_rejected() {
    let h = Harness::new();
    h.cart.add_item(green_curry(), 60, vec![]).await.unwrap();

    let result = h.cart.add_item(green_curry(), 50, vec![]).await;

    assert!(matches!(result, Err(CartError::InvalidQuantity(_))));
    assert_eq!(h.cart.items(), vec![line(green_curry(), 60, vec![])]);
    assert_eq!(h.service.call_count(CallKind::Add), 1);
}

#[tokio::test]
async fn test_zero_quantity_add_rejected() {
    let h = Harness::new();

    let result = h.cart.add_item(green_curry(), 0, vec![]).await;

    assert!(matches!(result, Err(CartError::InvalidQuantity(_))));
    assert!(h.cart.items().is_empty());
    assert!(h.service.calls().is_empty());
}

// =============================================================================
// Targeting Lines
// =============================================================================

#[tokio::test]
async fn test_update_below_one_removes_line() {
    let h = Harness::new();
    h.cart.add_item(pad_thai(), 2, vec![]).await.unwrap();

    h.cart
        .update_quantity(&ProductId::new("pad-thai"), 0, None)
        .await
        .unwrap();

    assert!(h.cart.items().is_empty());
    assert_eq!(h.service.call_count(CallKind::Remove), 1);
    assert_eq!(h.service.call_count(CallKind::Update), 0);
    assert!(h.service.server_items().is_empty());
}

#[tokio::test]
async fn test_update_above_maximum_rejected() {
    let h = Harness::new();
    h.cart.add_item(pad_thai(), 2, vec![]).await.unwrap();

    let result = h
        .cart
        .update_quantity(&ProductId::new("pad-thai"), 101, None)
        .await;

    assert!(matches!(result, Err(CartError::InvalidQuantity(_))));
    assert_eq!(h.cart.items()[0].quantity, 2);
}

#[tokio::test]
async fn test_option_name_selects_line() {
    let h = Harness::new();
    h.cart.add_item(pad_thai(), 1, vec![extra("egg")]).await.unwrap();
    h.cart.add_item(pad_thai(), 1, vec![extra("tofu")]).await.unwrap();

    h.cart
        .update_quantity(&ProductId::new("pad-thai"), 4, Some("tofu"))
        .await
        .unwrap();
    h.cart
        .remove_item(&ProductId::new("pad-thai"), Some("egg"))
        .await
        .unwrap();

    assert_eq!(h.cart.items(), vec![line(pad_thai(), 4, vec![extra("tofu")])]);
    assert_eq!(h.service.server_items(), h.cart.items());
}

#[tokio::test]
async fn test_missing_line_is_item_not_found() {
    let h = Harness::new();
    h.cart.add_item(pad_thai(), 1, vec![extra("egg")]).await.unwrap();

    let result = h
        .cart
        .remove_item(&ProductId::new("pad-thai"), Some("tofu"))
        .await;
    assert!(matches!(result, Err(CartError::ItemNotFound(ref id)) if id.as_str() == "pad-thai"));

    let result = h
        .cart
        .update_quantity(&ProductId::new("green-curry"), 2, None)
        .await;
    assert!(matches!(result, Err(CartError::ItemNotFound(_))));

    assert_eq!(h.cart.cart_count(), 1);
}
