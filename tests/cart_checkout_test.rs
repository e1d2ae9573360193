//! Cart merging, region totals, shipping quotes and the full checkout
//! conversion, including double-submit protection.

mod common;

use assert_matches::assert_matches;
use atelier_api::{
    entities::{CartStatus, OrderStatus, PaymentStatus, ProductVariantModel, Region},
    errors::ServiceError,
    services::carts::{AddToCartInput, CreateCartInput},
    services::checkout::SubmitCheckoutInput,
};
use common::TestApp;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, IntoActiveModel, Set};

async fn seeded_variant(app: &TestApp) -> ProductVariantModel {
    let product = app.seed_product("Bosphorus Sunset", "bosphorus-sunset").await;
    app.seed_variant(
        product.id,
        "BS-50x70",
        dec!(1500),
        dec!(85),
        dec!(2.5),
        10,
        true,
    )
    .await
}

fn submit_input() -> SubmitCheckoutInput {
    SubmitCheckoutInput {
        customer_name: "Elif Şahin".to_string(),
        customer_email: "elif@example.com".to_string(),
        shipping_address: "Karaköy, İstanbul".to_string(),
        billing_address: None,
        customer_note: Some("Please wrap as a gift".to_string()),
        coupon_code: None,
    }
}

#[tokio::test]
async fn adding_the_same_variant_merges_lines() {
    let app = TestApp::new().await;
    let variant = seeded_variant(&app).await;

    let cart = app
        .services
        .cart
        .create_cart(CreateCartInput {
            session_id: "sess-merge".to_string(),
            customer_email: None,
            region: Region::Tr,
        })
        .await
        .expect("create cart");

    app.services
        .cart
        .add_item(
            cart.id,
            AddToCartInput {
                variant_id: variant.id,
                quantity: 1,
            },
        )
        .await
        .expect("first add");

    let with_items = app
        .services
        .cart
        .add_item(
            cart.id,
            AddToCartInput {
                variant_id: variant.id,
                quantity: 2,
            },
        )
        .await
        .expect("second add");

    assert_eq!(with_items.items.len(), 1);
    assert_eq!(with_items.items[0].quantity, 3);
    assert_eq!(with_items.totals.subtotal, dec!(4500));
}

#[tokio::test]
async fn totals_follow_the_cart_region() {
    let app = TestApp::new().await;
    let variant = seeded_variant(&app).await;

    let tr_cart = app
        .services
        .cart
        .create_cart(CreateCartInput {
            session_id: "sess-tr".to_string(),
            customer_email: None,
            region: Region::Tr,
        })
        .await
        .expect("tr cart");
    let tr = app
        .services
        .cart
        .add_item(
            tr_cart.id,
            AddToCartInput {
                variant_id: variant.id,
                quantity: 2,
            },
        )
        .await
        .expect("add");
    assert_eq!(tr.totals.subtotal, dec!(3000));
    assert_eq!(tr.totals.currency, "TRY");

    let global_cart = app
        .services
        .cart
        .create_cart(CreateCartInput {
            session_id: "sess-global".to_string(),
            customer_email: None,
            region: Region::Global,
        })
        .await
        .expect("global cart");
    let global = app
        .services
        .cart
        .add_item(
            global_cart.id,
            AddToCartInput {
                variant_id: variant.id,
                quantity: 2,
            },
        )
        .await
        .expect("add");
    assert_eq!(global.totals.subtotal, dec!(170));
    assert_eq!(global.totals.currency, "USD");
}

#[tokio::test]
async fn quantity_zero_removes_the_line() {
    let app = TestApp::new().await;
    let variant = seeded_variant(&app).await;

    let cart = app
        .services
        .cart
        .create_cart(CreateCartInput {
            session_id: "sess-remove".to_string(),
            customer_email: None,
            region: Region::Tr,
        })
        .await
        .expect("cart");

    let with_items = app
        .services
        .cart
        .add_item(
            cart.id,
            AddToCartInput {
                variant_id: variant.id,
                quantity: 2,
            },
        )
        .await
        .expect("add");

    let emptied = app
        .services
        .cart
        .update_item_quantity(cart.id, with_items.items[0].id, 0)
        .await
        .expect("remove via zero quantity");
    assert!(emptied.items.is_empty());
    assert_eq!(emptied.totals.item_count, 0);
}

#[tokio::test]
async fn shipping_quote_follows_the_desi_formula() {
    let app = TestApp::new().await;
    let variant = seeded_variant(&app).await;

    let cart = app
        .services
        .cart
        .create_cart(CreateCartInput {
            session_id: "sess-quote".to_string(),
            customer_email: None,
            region: Region::Tr,
        })
        .await
        .expect("cart");

    // 2 x desi 2.5 = 5 desi; subtotal 1500 below the 2500 threshold.
    // Use a cheaper second price point by quantity instead: one unit.
    app.services
        .cart
        .add_item(
            cart.id,
            AddToCartInput {
                variant_id: variant.id,
                quantity: 1,
            },
        )
        .await
        .expect("add one");

    let quote = app.services.checkout.quote(cart.id).await.expect("quote");
    assert_eq!(quote.subtotal, dec!(1500));
    assert_eq!(quote.total_desi, dec!(2.5));
    // base 50 + 2.5 desi x 10
    assert_eq!(quote.shipping_total, dec!(75));
    assert!(!quote.free_shipping);

    // A second unit pushes the subtotal to 3000, past the threshold.
    app.services
        .cart
        .add_item(
            cart.id,
            AddToCartInput {
                variant_id: variant.id,
                quantity: 1,
            },
        )
        .await
        .expect("add second");

    let quote = app.services.checkout.quote(cart.id).await.expect("quote");
    assert_eq!(quote.subtotal, dec!(3000));
    assert_eq!(quote.shipping_total, dec!(0));
    assert!(quote.free_shipping);
}

#[tokio::test]
async fn submit_converts_the_cart_into_a_paid_order() {
    let app = TestApp::new().await;
    let variant = seeded_variant(&app).await;

    let cart = app
        .services
        .cart
        .create_cart(CreateCartInput {
            session_id: "sess-submit".to_string(),
            customer_email: Some("elif@example.com".to_string()),
            region: Region::Tr,
        })
        .await
        .expect("cart");

    app.services
        .cart
        .add_item(
            cart.id,
            AddToCartInput {
                variant_id: variant.id,
                quantity: 1,
            },
        )
        .await
        .expect("add");

    let order = app
        .services
        .checkout
        .submit(cart.id, submit_input())
        .await
        .expect("checkout");

    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert_eq!(order.subtotal, dec!(1500));
    // base 50 + 2.5 desi x 10
    assert_eq!(order.shipping_total, dec!(75));
    assert_eq!(order.total_amount, dec!(1575));
    assert_eq!(order.customer_note.as_deref(), Some("Please wrap as a gift"));

    assert_eq!(app.reload_variant(variant.id).await.stock, 9);

    let refreshed = app.services.cart.get_cart(cart.id).await.expect("cart");
    assert_eq!(refreshed.cart.status, CartStatus::Converted);
}

#[tokio::test]
async fn resubmitting_a_converted_cart_is_rejected() {
    let app = TestApp::new().await;
    let variant = seeded_variant(&app).await;

    let cart = app
        .services
        .cart
        .create_cart(CreateCartInput {
            session_id: "sess-double".to_string(),
            customer_email: None,
            region: Region::Tr,
        })
        .await
        .expect("cart");

    app.services
        .cart
        .add_item(
            cart.id,
            AddToCartInput {
                variant_id: variant.id,
                quantity: 1,
            },
        )
        .await
        .expect("add");

    app.services
        .checkout
        .submit(cart.id, submit_input())
        .await
        .expect("first submit");

    let again = app.services.checkout.submit(cart.id, submit_input()).await;
    assert_matches!(again, Err(ServiceError::InvalidOperation(_)));

    let (_, total) = app
        .services
        .orders
        .list_orders(1, 10, None)
        .await
        .expect("list");
    assert_eq!(total, 1);
}

#[tokio::test]
async fn price_drift_fails_checkout_and_releases_the_cart() {
    let app = TestApp::new().await;
    let variant = seeded_variant(&app).await;

    let cart = app
        .services
        .cart
        .create_cart(CreateCartInput {
            session_id: "sess-drift".to_string(),
            customer_email: None,
            region: Region::Tr,
        })
        .await
        .expect("cart");

    app.services
        .cart
        .add_item(
            cart.id,
            AddToCartInput {
                variant_id: variant.id,
                quantity: 1,
            },
        )
        .await
        .expect("add");

    // Reprice the variant after it was carted.
    let mut active = app.reload_variant(variant.id).await.into_active_model();
    active.price_try = Set(dec!(1800));
    active.update(&*app.db).await.expect("reprice");

    let result = app.services.checkout.submit(cart.id, submit_input()).await;
    assert_matches!(result, Err(ServiceError::PriceChanged(_)));

    // The cart claim was released so the customer can re-quote and retry.
    let refreshed = app.services.cart.get_cart(cart.id).await.expect("cart");
    assert_eq!(refreshed.cart.status, CartStatus::Active);
    assert_eq!(app.reload_variant(variant.id).await.stock, 10);
}
