//! Coupon validation and the usage-limit guarantee: the slot is taken by a
//! conditional increment inside the order transaction, so the limit holds
//! even when validation raced ahead.

mod common;

use assert_matches::assert_matches;
use atelier_api::{
    entities::{CouponKind, OrderStatus, PaymentStatus, Region},
    errors::ServiceError,
    services::coupons::CreateCouponInput,
    services::orders::{CreateOrderInput, OrderLineInput},
};
use chrono::{Duration, Utc};
use common::TestApp;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

fn order_with_coupon(variant_id: Uuid, coupon_code: Option<String>) -> CreateOrderInput {
    CreateOrderInput {
        region: Region::Tr,
        customer_name: "Deniz Arslan".to_string(),
        customer_email: "deniz@example.com".to_string(),
        shipping_address: "Çankaya, Ankara".to_string(),
        billing_address: "Çankaya, Ankara".to_string(),
        customer_note: None,
        internal_note: None,
        coupon_code,
        shipping_total: Decimal::ZERO,
        status: Some(OrderStatus::Paid),
        payment_status: Some(PaymentStatus::Paid),
        lines: vec![OrderLineInput {
            variant_id,
            quantity: 2,
            unit_price: dec!(1500),
        }],
    }
}

#[tokio::test]
async fn percentage_coupon_discounts_the_order() {
    let app = TestApp::new().await;
    let product = app.seed_product("Coastline", "coastline").await;
    let variant = app
        .seed_variant(product.id, "CL-1", dec!(1500), dec!(85), dec!(2), 10, true)
        .await;

    app.services
        .coupons
        .create_coupon(CreateCouponInput {
            code: "welcome10".to_string(),
            kind: CouponKind::Percentage,
            value: dec!(10),
            starts_at: None,
            ends_at: None,
            usage_limit: None,
            customer_email: None,
        })
        .await
        .expect("create coupon");

    let order = app
        .services
        .orders
        .create_order(order_with_coupon(variant.id, Some("WELCOME10".to_string())))
        .await
        .expect("order with coupon");

    assert_eq!(order.subtotal, dec!(3000));
    assert_eq!(order.discount_total, dec!(300));
    assert_eq!(order.total_amount, dec!(2700));
    assert_eq!(order.coupon_code.as_deref(), Some("WELCOME10"));
}

#[tokio::test]
async fn usage_limit_admits_exactly_the_limit() {
    let app = TestApp::new().await;
    let product = app.seed_product("Lighthouse", "lighthouse").await;
    let variant = app
        .seed_variant(product.id, "LH-1", dec!(1500), dec!(85), dec!(2), 10, true)
        .await;

    app.services
        .coupons
        .create_coupon(CreateCouponInput {
            code: "LASTONE".to_string(),
            kind: CouponKind::FixedAmount,
            value: dec!(250),
            starts_at: None,
            ends_at: None,
            usage_limit: Some(1),
            customer_email: None,
        })
        .await
        .expect("create coupon");

    app.services
        .orders
        .create_order(order_with_coupon(variant.id, Some("LASTONE".to_string())))
        .await
        .expect("first redemption wins");

    let second = app
        .services
        .orders
        .create_order(order_with_coupon(variant.id, Some("LASTONE".to_string())))
        .await;
    assert_matches!(second, Err(ServiceError::CouponExhausted));

    // The losing order must not exist and must not have taken stock.
    let (_, total) = app
        .services
        .orders
        .list_orders(1, 10, None)
        .await
        .expect("list");
    assert_eq!(total, 1);
    assert_eq!(app.reload_variant(variant.id).await.stock, 8);

    let (coupons, _) = app.services.coupons.list_coupons(1, 10).await.expect("list");
    assert_eq!(coupons[0].used_count, 1);
}

#[tokio::test]
async fn restricted_coupon_rejects_other_customers_atomically() {
    let app = TestApp::new().await;
    let product = app.seed_product("Quiet Garden", "quiet-garden").await;
    let variant = app
        .seed_variant(product.id, "QG-1", dec!(1500), dec!(85), dec!(2), 10, true)
        .await;

    app.services
        .coupons
        .create_coupon(CreateCouponInput {
            code: "VIP".to_string(),
            kind: CouponKind::FixedAmount,
            value: dec!(100),
            starts_at: None,
            ends_at: None,
            usage_limit: None,
            customer_email: Some("vip@example.com".to_string()),
        })
        .await
        .expect("create coupon");

    let result = app
        .services
        .orders
        .create_order(order_with_coupon(variant.id, Some("VIP".to_string())))
        .await;
    assert_matches!(result, Err(ServiceError::CouponNotEligible));

    // The stock decrement from the failed order rolled back with it.
    assert_eq!(app.reload_variant(variant.id).await.stock, 10);
}

#[tokio::test]
async fn validation_taxonomy_over_the_wire_shapes() {
    let app = TestApp::new().await;

    app.services
        .coupons
        .create_coupon(CreateCouponInput {
            code: "SOON".to_string(),
            kind: CouponKind::Percentage,
            value: dec!(20),
            starts_at: Some(Utc::now() + Duration::days(2)),
            ends_at: None,
            usage_limit: None,
            customer_email: None,
        })
        .await
        .expect("future coupon");

    app.services
        .coupons
        .create_coupon(CreateCouponInput {
            code: "BYGONE".to_string(),
            kind: CouponKind::Percentage,
            value: dec!(20),
            starts_at: None,
            ends_at: Some(Utc::now() - Duration::days(2)),
            usage_limit: None,
            customer_email: None,
        })
        .await
        .expect("expired coupon");

    assert_matches!(
        app.services.coupons.validate_coupon("SOON", None).await,
        Err(ServiceError::CouponNotStarted)
    );
    assert_matches!(
        app.services.coupons.validate_coupon("BYGONE", None).await,
        Err(ServiceError::CouponExpired)
    );
    assert_matches!(
        app.services.coupons.validate_coupon("NOSUCH", None).await,
        Err(ServiceError::CouponNotFound)
    );

    // Lookup is case-insensitive on the code.
    let summary = app
        .services
        .coupons
        .validate_coupon("soon", None)
        .await;
    assert_matches!(summary, Err(ServiceError::CouponNotStarted));
}
