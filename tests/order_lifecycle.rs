//! Public API checks that need no database or network

use rust_decimal::Decimal;
use smm_relay::config::{AppConfig, RefundPolicy};
use smm_relay::orders::{OrderFilter, OrderStatus, SubmissionOutcome, order_price};
use smm_relay::provider::wire::OrdersResponse;

#[test]
fn price_is_rate_per_thousand() {
    // Balance 100, rate 10, quantity 1000 → price 10
    assert_eq!(order_price(1000, Decimal::from(10)), Decimal::from(10));
    assert_eq!(Decimal::from(100) - order_price(1000, Decimal::from(10)), Decimal::from(90));
    // Fractional prices stay exact
    assert_eq!(order_price(250, Decimal::new(12, 1)), Decimal::new(3, 1));
}

#[test]
fn provider_status_vocabulary() {
    assert_eq!(OrderStatus::from_provider("INPROGRESS"), Some(OrderStatus::InProgress));
    assert_eq!(OrderStatus::from_provider("In progress"), Some(OrderStatus::InProgress));
    assert_eq!(OrderStatus::from_provider("cancelled"), Some(OrderStatus::Canceled));
    assert_eq!(OrderStatus::from_provider("Partial"), Some(OrderStatus::Partial));
    assert_eq!(OrderStatus::from_provider("Queued"), None);
}

#[test]
fn open_set_excludes_terminal_states() {
    let filter = OrderFilter::open();
    for status in [OrderStatus::Completed, OrderStatus::Canceled, OrderStatus::Refunded] {
        assert!(status.is_terminal());
        assert!(!filter.statuses.contains(&status));
    }
    assert_eq!(filter.statuses.len(), 5);
    assert!(filter.statuses.contains(&OrderStatus::Processing));
}

#[test]
fn submission_outcome_text() {
    assert_eq!(SubmissionOutcome::Accepted(42).response_text(), "Order: 42");
    assert_eq!(
        SubmissionOutcome::Rejected("Incorrect service ID".into()).response_text(),
        "Error: Incorrect service ID"
    );
    assert_eq!(SubmissionOutcome::Rejected("x".into()).provider_order_id(), 0);
}

#[test]
fn bulk_status_reply_shapes() {
    let list: OrdersResponse =
        serde_json::from_str(r#"[{"order":42,"status":"INPROGRESS","remains":80,"start_counter":120}]"#)
            .unwrap();
    let entries = list.into_entries().unwrap();
    assert_eq!(entries[0].order, 42);
    assert_eq!(entries[0].remains, 80);

    let failure: OrdersResponse = serde_json::from_str(r#"{"error":"Incorrect request"}"#).unwrap();
    assert!(failure.into_entries().is_err());
}

#[test]
fn shipped_configs_parse() {
    let dev = AppConfig::load("dev").unwrap();
    assert_eq!(dev.reconcile.page_size, 1000);
    assert_eq!(dev.reconcile.stale_after_secs, 300);
    assert_eq!(dev.reconcile.refund_policy, RefundPolicy::StatusOnly);

    let prod = AppConfig::load("prod").unwrap();
    assert!(prod.use_json);
    assert!(prod.gateway.admin_secret.is_none());
}
