//! Refund accounting: remainder enforcement, restocking, and the flip to
//! REFUNDED once refunds cover the order total.

mod common;

use assert_matches::assert_matches;
use atelier_api::{
    entities::{OrderModel, OrderStatus, PaymentStatus, Region},
    errors::ServiceError,
    services::orders::{CreateOrderInput, OrderLineInput},
    services::refunds::{CreateRefundInput, RefundLineInput},
};
use common::TestApp;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

async fn paid_order_of_1000(app: &TestApp) -> (OrderModel, uuid::Uuid) {
    let product = app.seed_product("Golden Hour", "golden-hour").await;
    let variant = app
        .seed_variant(product.id, "GH-1", dec!(500), dec!(28), dec!(1), 10, true)
        .await;

    let order = app
        .services
        .orders
        .create_order(CreateOrderInput {
            region: Region::Tr,
            customer_name: "Mert Kaya".to_string(),
            customer_email: "mert@example.com".to_string(),
            shipping_address: "Alsancak, İzmir".to_string(),
            billing_address: "Alsancak, İzmir".to_string(),
            customer_note: None,
            internal_note: None,
            coupon_code: None,
            shipping_total: Decimal::ZERO,
            status: Some(OrderStatus::Paid),
            payment_status: Some(PaymentStatus::Paid),
            lines: vec![OrderLineInput {
                variant_id: variant.id,
                quantity: 2,
                unit_price: dec!(500),
            }],
        })
        .await
        .expect("paid order");

    assert_eq!(order.total_amount, dec!(1000));
    (order, variant.id)
}

fn refund(amount: Decimal) -> CreateRefundInput {
    CreateRefundInput {
        amount,
        reason: None,
        items: vec![],
        restock_items: false,
    }
}

#[tokio::test]
async fn partial_refunds_accumulate_to_refunded() {
    let app = TestApp::new().await;
    let (order, _) = paid_order_of_1000(&app).await;

    app.services
        .refunds
        .create_refund(order.id, refund(dec!(400)))
        .await
        .expect("first refund");

    let details = app.services.orders.get_order(order.id).await.expect("details");
    assert_eq!(details.order.status, OrderStatus::Paid);
    assert_eq!(details.order.payment_status, PaymentStatus::Paid);

    app.services
        .refunds
        .create_refund(order.id, refund(dec!(600)))
        .await
        .expect("second refund");

    let details = app.services.orders.get_order(order.id).await.expect("details");
    assert_eq!(details.order.status, OrderStatus::Refunded);
    assert_eq!(details.order.payment_status, PaymentStatus::Refunded);
    assert!(details.events.iter().any(|e| e.kind == "order.refunded"));
}

#[tokio::test]
async fn over_refund_is_rejected() {
    let app = TestApp::new().await;
    let (order, _) = paid_order_of_1000(&app).await;

    let too_much = app
        .services
        .refunds
        .create_refund(order.id, refund(dec!(1200)))
        .await;
    assert_matches!(too_much, Err(ServiceError::InvalidOperation(_)));

    app.services
        .refunds
        .create_refund(order.id, refund(dec!(800)))
        .await
        .expect("within remainder");

    // 200 remains; 300 exceeds it.
    let over_remainder = app
        .services
        .refunds
        .create_refund(order.id, refund(dec!(300)))
        .await;
    assert_matches!(over_remainder, Err(ServiceError::InvalidOperation(_)));

    let refunds = app
        .services
        .refunds
        .list_for_order(order.id)
        .await
        .expect("list refunds");
    assert_eq!(refunds.len(), 1);
}

#[tokio::test]
async fn refund_with_restock_returns_inventory() {
    let app = TestApp::new().await;
    let (order, variant_id) = paid_order_of_1000(&app).await;
    assert_eq!(app.reload_variant(variant_id).await.stock, 8);

    let details = app.services.orders.get_order(order.id).await.expect("details");
    app.services
        .refunds
        .create_refund(
            order.id,
            CreateRefundInput {
                amount: dec!(500),
                reason: Some("damaged in transit".to_string()),
                items: vec![RefundLineInput {
                    order_item_id: details.items[0].id,
                    quantity: 1,
                }],
                restock_items: true,
            },
        )
        .await
        .expect("refund with restock");

    assert_eq!(app.reload_variant(variant_id).await.stock, 9);
}

#[tokio::test]
async fn unpaid_orders_cannot_be_refunded() {
    let app = TestApp::new().await;
    let product = app.seed_product("Night Swim", "night-swim").await;
    let variant = app
        .seed_variant(product.id, "NS-1", dec!(600), dec!(33), dec!(1), 5, true)
        .await;

    let order = app
        .services
        .orders
        .create_order(CreateOrderInput {
            region: Region::Tr,
            customer_name: "Test".to_string(),
            customer_email: "test@example.com".to_string(),
            shipping_address: "addr".to_string(),
            billing_address: "addr".to_string(),
            customer_note: None,
            internal_note: None,
            coupon_code: None,
            shipping_total: Decimal::ZERO,
            status: None,
            payment_status: None,
            lines: vec![OrderLineInput {
                variant_id: variant.id,
                quantity: 1,
                unit_price: dec!(600),
            }],
        })
        .await
        .expect("pending order");

    let result = app
        .services
        .refunds
        .create_refund(order.id, refund(dec!(100)))
        .await;
    assert_matches!(result, Err(ServiceError::InvalidOperation(_)));
}

#[tokio::test]
async fn zero_amount_refunds_are_invalid() {
    let app = TestApp::new().await;
    let (order, _) = paid_order_of_1000(&app).await;

    let result = app
        .services
        .refunds
        .create_refund(order.id, refund(Decimal::ZERO))
        .await;
    assert_matches!(result, Err(ServiceError::ValidationError(_)));
}
