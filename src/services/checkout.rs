use crate::{
    config::ShippingRates,
    entities::{
        activity_log, cart, ActivityEventType, Cart, CartStatus, OrderModel, OrderStatus,
        PaymentStatus, Region,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        carts::{cart_totals, unit_price},
        orders::{CreateOrderInput, OrderLineInput, OrderService},
    },
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait,
    QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Checkout service: shipping quotes and the cart-to-order conversion.
///
/// Submission claims the cart with a conditional ACTIVE→CONVERTED update
/// before anything else happens, so a double-submit (retry after a slow
/// response, double click) finds the cart already claimed and cannot create
/// a second order.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    order_service: Arc<OrderService>,
    rates: ShippingRates,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        order_service: Arc<OrderService>,
        rates: ShippingRates,
    ) -> Self {
        Self {
            db,
            event_sender,
            order_service,
            rates,
        }
    }

    /// Deterministic shipping estimate for a cart. Not a carrier lookup.
    #[instrument(skip(self))]
    pub async fn quote(&self, cart_id: Uuid) -> Result<ShippingQuote, ServiceError> {
        let cart = Cart::find_by_id(cart_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))?;

        let items = cart
            .find_related(crate::entities::CartItem)
            .all(&*self.db)
            .await?;
        let totals = cart_totals(cart.region, &items);
        let shipping_total = quote_shipping(&self.rates, cart.region, totals.subtotal, totals.total_desi);

        Ok(ShippingQuote {
            region: cart.region,
            currency: totals.currency,
            subtotal: totals.subtotal,
            total_desi: totals.total_desi,
            free_shipping: shipping_total == Decimal::ZERO && totals.subtotal > Decimal::ZERO,
            shipping_total,
        })
    }

    /// Converts the cart into an order: claims the cart, captures the
    /// (simulated) payment, then runs the transactional order creation with
    /// the cart's price snapshots.
    #[instrument(skip(self, input), fields(cart_id = %cart_id))]
    pub async fn submit(
        &self,
        cart_id: Uuid,
        input: SubmitCheckoutInput,
    ) -> Result<OrderModel, ServiceError> {
        if input.customer_name.trim().is_empty()
            || input.customer_email.trim().is_empty()
            || input.shipping_address.trim().is_empty()
        {
            return Err(ServiceError::ValidationError(
                "Name, email and shipping address are required".to_string(),
            ));
        }

        let cart = Cart::find_by_id(cart_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))?;

        let items = cart
            .find_related(crate::entities::CartItem)
            .all(&*self.db)
            .await?;
        if items.is_empty() {
            return Err(ServiceError::InvalidOperation("Cart is empty".to_string()));
        }

        let totals = cart_totals(cart.region, &items);
        let shipping_total =
            quote_shipping(&self.rates, cart.region, totals.subtotal, totals.total_desi);

        self.record_activity(
            &cart,
            ActivityEventType::CheckoutStart,
            serde_json::json!({ "subtotal": totals.subtotal }),
        )
        .await?;

        // Claim the cart before charging; the conditional update is what
        // makes resubmission safe.
        let claimed = Cart::update_many()
            .col_expr(cart::Column::Status, Expr::value(CartStatus::Converted))
            .col_expr(cart::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(cart::Column::Id.eq(cart_id))
            .filter(cart::Column::Status.eq(CartStatus::Active))
            .exec(&*self.db)
            .await?;
        if claimed.rows_affected == 0 {
            return Err(ServiceError::InvalidOperation(
                "Cart has already been checked out".to_string(),
            ));
        }

        self.event_sender
            .send_or_log(Event::CheckoutStarted { cart_id })
            .await;

        let total_estimate = totals.subtotal + shipping_total;
        if let Err(err) = self.simulate_payment(total_estimate).await {
            self.release_cart(cart_id).await;
            return Err(err);
        }

        let lines = items
            .iter()
            .map(|item| OrderLineInput {
                variant_id: item.variant_id,
                quantity: item.quantity,
                unit_price: unit_price(cart.region, item),
            })
            .collect();

        let order_input = CreateOrderInput {
            region: cart.region,
            customer_name: input.customer_name,
            customer_email: input.customer_email.clone(),
            shipping_address: input.shipping_address,
            billing_address: input
                .billing_address
                .unwrap_or_else(|| "same as shipping".to_string()),
            customer_note: input.customer_note,
            internal_note: None,
            coupon_code: input.coupon_code,
            shipping_total,
            status: Some(OrderStatus::Paid),
            payment_status: Some(PaymentStatus::Paid),
            lines,
        };

        let order = match self.order_service.create_order(order_input).await {
            Ok(order) => order,
            Err(err) => {
                // Release the claim so the customer can retry.
                self.release_cart(cart_id).await;
                return Err(err);
            }
        };

        self.record_activity(
            &cart,
            ActivityEventType::Purchase,
            serde_json::json!({
                "order_id": order.id,
                "total": order.total_amount,
                "currency": order.currency,
            }),
        )
        .await?;

        self.event_sender
            .send_or_log(Event::CheckoutCompleted {
                cart_id,
                order_id: order.id,
            })
            .await;

        info!(%cart_id, order_id = %order.id, "checkout completed");
        Ok(order)
    }

    /// Simulated payment capture: a fixed processing delay and an approval
    /// reference. Stands in for a gateway integration.
    async fn simulate_payment(&self, amount: Decimal) -> Result<String, ServiceError> {
        tokio::time::sleep(Duration::from_millis(250)).await;

        if amount < Decimal::ZERO {
            return Err(ServiceError::PaymentFailed(
                "Charge amount cannot be negative".to_string(),
            ));
        }

        Ok(format!("SIM-{}", Uuid::new_v4().simple()))
    }

    async fn release_cart(&self, cart_id: Uuid) {
        let released = Cart::update_many()
            .col_expr(cart::Column::Status, Expr::value(CartStatus::Active))
            .col_expr(cart::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(cart::Column::Id.eq(cart_id))
            .filter(cart::Column::Status.eq(CartStatus::Converted))
            .exec(&*self.db)
            .await;

        if let Err(err) = released {
            tracing::error!(%cart_id, %err, "failed to release claimed cart after checkout error");
        }
    }

    async fn record_activity(
        &self,
        cart: &cart::Model,
        event_type: ActivityEventType,
        metadata: serde_json::Value,
    ) -> Result<(), ServiceError> {
        activity_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            session_id: Set(Some(cart.session_id.clone())),
            customer_email: Set(cart.customer_email.clone()),
            product_id: Set(None),
            event_type: Set(event_type),
            metadata: Set(Some(metadata)),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;
        Ok(())
    }
}

/// Volumetric shipping estimate: `base + per_desi × total_desi`, free at or
/// above the region's subtotal threshold, zero for an empty cart.
pub fn quote_shipping(
    rates: &ShippingRates,
    region: Region,
    subtotal: Decimal,
    total_desi: Decimal,
) -> Decimal {
    let (base, per_desi, threshold) = match region {
        Region::Tr => (rates.tr_base, rates.tr_per_desi, rates.tr_free_threshold),
        Region::Global => (
            rates.global_base,
            rates.global_per_desi,
            rates.global_free_threshold,
        ),
    };

    if subtotal <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    if subtotal >= threshold {
        return Decimal::ZERO;
    }

    base + per_desi * total_desi
}

/// Input for submitting a checkout
#[derive(Debug, Deserialize)]
pub struct SubmitCheckoutInput {
    pub customer_name: String,
    pub customer_email: String,
    pub shipping_address: String,
    pub billing_address: Option<String>,
    pub customer_note: Option<String>,
    pub coupon_code: Option<String>,
}

/// Shipping estimate for a cart
#[derive(Debug, Serialize)]
pub struct ShippingQuote {
    pub region: Region,
    pub currency: String,
    pub subtotal: Decimal,
    pub total_desi: Decimal,
    pub shipping_total: Decimal,
    pub free_shipping: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn domestic_quote_below_threshold() {
        let rates = ShippingRates::default();
        // base 50 + 5 desi x 10
        assert_eq!(
            quote_shipping(&rates, Region::Tr, dec!(1000), dec!(5)),
            dec!(100)
        );
    }

    #[test]
    fn domestic_quote_is_free_at_threshold() {
        let rates = ShippingRates::default();
        assert_eq!(
            quote_shipping(&rates, Region::Tr, dec!(2500), dec!(5)),
            Decimal::ZERO
        );
        assert_eq!(
            quote_shipping(&rates, Region::Tr, dec!(9000), dec!(12)),
            Decimal::ZERO
        );
    }

    #[test]
    fn global_quote_uses_global_rates() {
        let rates = ShippingRates::default();
        // base 30 + 2 desi x 7
        assert_eq!(
            quote_shipping(&rates, Region::Global, dec!(100), dec!(2)),
            dec!(44)
        );
    }

    #[test]
    fn empty_cart_ships_for_nothing() {
        let rates = ShippingRates::default();
        assert_eq!(
            quote_shipping(&rates, Region::Tr, Decimal::ZERO, Decimal::ZERO),
            Decimal::ZERO
        );
    }
}
