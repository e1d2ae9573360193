//! Analytics reads: revenue comes from committed orders, the funnel and the
//! abandoned-cart report come from the activity log.

mod common;

use atelier_api::{
    entities::{ActivityEventType, OrderStatus, PaymentStatus, Region},
    services::activity::RecordActivityInput,
    services::analytics::StatsPeriod,
    services::orders::{CreateOrderInput, OrderLineInput},
};
use common::TestApp;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

async fn record(
    app: &TestApp,
    session: &str,
    event_type: ActivityEventType,
    product_id: Option<Uuid>,
) {
    app.services
        .activity
        .record(RecordActivityInput {
            session_id: Some(session.to_string()),
            customer_email: None,
            product_id,
            event_type,
            metadata: None,
        })
        .await
        .expect("record activity");
}

#[tokio::test]
async fn stats_split_funnel_from_order_revenue() {
    let app = TestApp::new().await;
    let product = app.seed_product("Morning Fog", "morning-fog").await;
    let variant = app
        .seed_variant(product.id, "MF-1", dec!(1000), dec!(55), dec!(2), 10, true)
        .await;

    // Behavioral rows, including a purchase row whose metadata must NOT be
    // the revenue source.
    record(&app, "s1", ActivityEventType::View, Some(product.id)).await;
    record(&app, "s1", ActivityEventType::View, Some(product.id)).await;
    record(&app, "s1", ActivityEventType::AddToCart, Some(product.id)).await;
    record(&app, "s1", ActivityEventType::CheckoutStart, None).await;

    // One committed order of 2000 TRY and one pending order that must not
    // count as revenue.
    let committed = |payment: PaymentStatus| CreateOrderInput {
        region: Region::Tr,
        customer_name: "Test".to_string(),
        customer_email: "t@example.com".to_string(),
        shipping_address: "addr".to_string(),
        billing_address: "addr".to_string(),
        customer_note: None,
        internal_note: None,
        coupon_code: None,
        shipping_total: Decimal::ZERO,
        status: Some(if payment == PaymentStatus::Paid {
            OrderStatus::Paid
        } else {
            OrderStatus::Pending
        }),
        payment_status: Some(payment),
        lines: vec![OrderLineInput {
            variant_id: variant.id,
            quantity: 2,
            unit_price: dec!(1000),
        }],
    };

    app.services
        .orders
        .create_order(committed(PaymentStatus::Paid))
        .await
        .expect("paid order");
    app.services
        .orders
        .create_order(committed(PaymentStatus::Pending))
        .await
        .expect("pending order");

    let stats = app
        .services
        .analytics
        .stats(StatsPeriod::SevenDays)
        .await
        .expect("stats");

    assert_eq!(stats.funnel.views, 2);
    assert_eq!(stats.funnel.cart_adds, 1);
    assert_eq!(stats.funnel.checkout_starts, 1);

    assert_eq!(stats.revenue.order_count, 1);
    assert_eq!(stats.revenue.by_currency.len(), 1);
    assert_eq!(stats.revenue.by_currency[0].currency, "TRY");
    assert_eq!(stats.revenue.by_currency[0].revenue, dec!(2000));

    assert_eq!(stats.top_products.len(), 1);
    assert_eq!(stats.top_products[0].product_id, product.id);
    assert_eq!(stats.top_products[0].views, 2);
    assert_eq!(stats.top_products[0].title.as_deref(), Some("Morning Fog"));

    assert_eq!(stats.chart.len(), 1);
    assert_eq!(stats.chart[0].orders, 1);
    assert_eq!(stats.chart[0].revenue_try, dec!(2000));
}

#[tokio::test]
async fn abandoned_report_excludes_purchasing_sessions() {
    let app = TestApp::new().await;
    let product = app.seed_product("Still Life", "still-life").await;

    record(&app, "buyer", ActivityEventType::AddToCart, Some(product.id)).await;
    app.services
        .activity
        .record(RecordActivityInput {
            session_id: Some("buyer".to_string()),
            customer_email: None,
            product_id: None,
            event_type: ActivityEventType::Purchase,
            metadata: None,
        })
        .await
        .expect("purchase row");

    record(&app, "browser", ActivityEventType::AddToCart, Some(product.id)).await;
    record(&app, "browser", ActivityEventType::AddToCart, Some(product.id)).await;

    let sessions = app
        .services
        .analytics
        .abandoned_carts()
        .await
        .expect("abandoned report");

    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].session_id, "browser");
    assert_eq!(sessions[0].cart_adds, 2);
    assert_eq!(sessions[0].product_ids, vec![product.id]);
}
