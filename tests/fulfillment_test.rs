//! Partial-shipment accounting: the order-level fulfillment status is derived
//! from shipped vs ordered quantities, never set wholesale.

mod common;

use assert_matches::assert_matches;
use atelier_api::{
    entities::{FulfillmentStatus, OrderStatus, PaymentStatus, Region},
    errors::ServiceError,
    services::fulfillments::{CreateFulfillmentInput, FulfillmentLineInput},
    services::orders::{CreateOrderInput, OrderLineInput},
};
use common::TestApp;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn shipment(items: Vec<FulfillmentLineInput>) -> CreateFulfillmentInput {
    CreateFulfillmentInput {
        items,
        tracking_company: Some("MNG".to_string()),
        tracking_number: Some("MNG-0042".to_string()),
        tracking_url: None,
        notify_customer: true,
    }
}

async fn two_line_order(app: &TestApp) -> (uuid::Uuid, Vec<atelier_api::entities::OrderItemModel>) {
    let product = app.seed_product("Diptych", "diptych").await;
    let left = app
        .seed_variant(product.id, "DI-L", dec!(900), dec!(50), dec!(2), 10, true)
        .await;
    let right = app
        .seed_variant(product.id, "DI-R", dec!(900), dec!(50), dec!(2), 10, true)
        .await;

    let order = app
        .services
        .orders
        .create_order(CreateOrderInput {
            region: Region::Tr,
            customer_name: "Zeynep Acar".to_string(),
            customer_email: "zeynep@example.com".to_string(),
            shipping_address: "Bornova, İzmir".to_string(),
            billing_address: "Bornova, İzmir".to_string(),
            customer_note: None,
            internal_note: None,
            coupon_code: None,
            shipping_total: Decimal::ZERO,
            status: Some(OrderStatus::Paid),
            payment_status: Some(PaymentStatus::Paid),
            lines: vec![
                OrderLineInput {
                    variant_id: left.id,
                    quantity: 2,
                    unit_price: dec!(900),
                },
                OrderLineInput {
                    variant_id: right.id,
                    quantity: 1,
                    unit_price: dec!(900),
                },
            ],
        })
        .await
        .expect("order created");

    let mut details = app.services.orders.get_order(order.id).await.expect("details");
    // Index 0 = DI-L (quantity 2), index 1 = DI-R (quantity 1).
    details.items.sort_by(|a, b| a.sku.cmp(&b.sku));
    (order.id, details.items)
}

#[tokio::test]
async fn partial_shipment_marks_partially_fulfilled() {
    let app = TestApp::new().await;
    let (order_id, items) = two_line_order(&app).await;

    app.services
        .fulfillments
        .create_fulfillment(
            order_id,
            shipment(vec![FulfillmentLineInput {
                order_item_id: items[0].id,
                quantity: 1,
            }]),
        )
        .await
        .expect("partial shipment");

    let details = app.services.orders.get_order(order_id).await.expect("details");
    assert_eq!(
        details.order.fulfillment_status,
        FulfillmentStatus::PartiallyFulfilled
    );
    assert_eq!(details.order.status, OrderStatus::Shipped);
    assert!(details.events.iter().any(|e| e.kind == "order.fulfilled"));
}

#[tokio::test]
async fn completing_all_lines_marks_fulfilled() {
    let app = TestApp::new().await;
    let (order_id, items) = two_line_order(&app).await;

    app.services
        .fulfillments
        .create_fulfillment(
            order_id,
            shipment(vec![FulfillmentLineInput {
                order_item_id: items[0].id,
                quantity: 1,
            }]),
        )
        .await
        .expect("first parcel");

    app.services
        .fulfillments
        .create_fulfillment(
            order_id,
            shipment(vec![
                FulfillmentLineInput {
                    order_item_id: items[0].id,
                    quantity: 1,
                },
                FulfillmentLineInput {
                    order_item_id: items[1].id,
                    quantity: 1,
                },
            ]),
        )
        .await
        .expect("second parcel");

    let details = app.services.orders.get_order(order_id).await.expect("details");
    assert_eq!(details.order.fulfillment_status, FulfillmentStatus::Fulfilled);

    let shipments = app
        .services
        .fulfillments
        .list_for_order(order_id)
        .await
        .expect("list shipments");
    assert_eq!(shipments.len(), 2);
}

#[tokio::test]
async fn overshipping_a_line_is_rejected() {
    let app = TestApp::new().await;
    let (order_id, items) = two_line_order(&app).await;

    let result = app
        .services
        .fulfillments
        .create_fulfillment(
            order_id,
            shipment(vec![FulfillmentLineInput {
                order_item_id: items[1].id,
                quantity: 2,
            }]),
        )
        .await;

    assert_matches!(result, Err(ServiceError::ValidationError(_)));

    let details = app.services.orders.get_order(order_id).await.expect("details");
    assert_eq!(
        details.order.fulfillment_status,
        FulfillmentStatus::Unfulfilled
    );
}

#[tokio::test]
async fn cancelled_orders_cannot_be_fulfilled() {
    let app = TestApp::new().await;
    let (order_id, items) = two_line_order(&app).await;

    app.services
        .orders
        .cancel_order(order_id, None)
        .await
        .expect("cancel");

    let result = app
        .services
        .fulfillments
        .create_fulfillment(
            order_id,
            shipment(vec![FulfillmentLineInput {
                order_item_id: items[0].id,
                quantity: 1,
            }]),
        )
        .await;

    assert_matches!(result, Err(ServiceError::InvalidStatus(_)));
}

#[tokio::test]
async fn empty_fulfillments_are_rejected() {
    let app = TestApp::new().await;
    let (order_id, _) = two_line_order(&app).await;

    let result = app
        .services
        .fulfillments
        .create_fulfillment(order_id, shipment(vec![]))
        .await;

    assert_matches!(result, Err(ServiceError::ValidationError(_)));
}
