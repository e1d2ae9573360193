use crate::{
    entities::{
        order, order_event, order_item, product_variant, FulfillmentStatus, Order, OrderEvent,
        OrderItem, OrderModel, OrderStatus, PaymentStatus, ProductVariant, Region,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{coupons, fulfillments},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, ModelTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Order lifecycle service.
///
/// Creation is a single transaction over all lines: price re-validation,
/// conditional stock decrements and coupon redemption either all commit or
/// none do. Stock is taken with a guarded decrement (`stock >= qty`) rather
/// than read-then-write, so concurrent checkouts cannot drive a tracked
/// variant negative regardless of isolation level.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Creates an order from explicit lines. All-or-nothing: any failing line
    /// aborts every stock decrement and no order row is written.
    #[instrument(skip(self, input), fields(customer_email = %input.customer_email))]
    pub async fn create_order(&self, input: CreateOrderInput) -> Result<OrderModel, ServiceError> {
        if input.lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "Order must contain at least one line".to_string(),
            ));
        }
        if input.customer_name.trim().is_empty() || input.customer_email.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Customer name and email are required".to_string(),
            ));
        }

        let order_id = Uuid::new_v4();
        let now = Utc::now();
        let txn = self.db.begin().await?;

        let mut subtotal = Decimal::ZERO;
        let mut snapshots = Vec::with_capacity(input.lines.len());

        for line in &input.lines {
            if line.quantity <= 0 {
                return Err(ServiceError::ValidationError(
                    "Line quantity must be positive".to_string(),
                ));
            }

            let variant = ProductVariant::find_by_id(line.variant_id)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Variant {} not found", line.variant_id))
                })?;

            if !variant.is_active {
                return Err(ServiceError::InvalidOperation(format!(
                    "Variant {} is no longer sold",
                    variant.sku
                )));
            }

            // The client's price is a snapshot; the live catalog wins.
            let live_price = match input.region {
                Region::Tr => variant.price_try,
                Region::Global => variant.price_usd,
            };
            if line.unit_price != live_price {
                return Err(ServiceError::PriceChanged(format!(
                    "Price of {} changed from {} to {}",
                    variant.sku, line.unit_price, live_price
                )));
            }

            if variant.track_quantity {
                // Guarded decrement; zero rows affected means someone else
                // took the stock between our read and this write.
                let result = ProductVariant::update_many()
                    .col_expr(
                        product_variant::Column::Stock,
                        Expr::col(product_variant::Column::Stock).sub(line.quantity),
                    )
                    .col_expr(product_variant::Column::UpdatedAt, Expr::value(now))
                    .filter(product_variant::Column::Id.eq(variant.id))
                    .filter(product_variant::Column::Stock.gte(line.quantity))
                    .exec(&txn)
                    .await?;

                if result.rows_affected == 0 {
                    warn!(sku = %variant.sku, requested = line.quantity, "stock exhausted during order creation");
                    return Err(ServiceError::InsufficientStock(format!(
                        "Not enough stock for {}",
                        variant.sku
                    )));
                }
            }

            let title = variant
                .find_related(crate::entities::Product)
                .one(&txn)
                .await?
                .map(|p| p.title)
                .unwrap_or_else(|| variant.sku.clone());

            subtotal += live_price * Decimal::from(line.quantity);
            snapshots.push((line.clone(), variant, title));
        }

        // Coupon redemption shares the transaction: the usage slot and the
        // order commit or roll back together.
        let mut discount_total = Decimal::ZERO;
        let mut coupon_code = None;
        if let Some(code) = &input.coupon_code {
            let (coupon, discount) =
                coupons::redeem_on(&txn, code, Some(&input.customer_email), subtotal).await?;
            discount_total = discount;
            coupon_code = Some(coupon.code);
        }

        let shipping_total = input.shipping_total;
        let total_amount = subtotal - discount_total + shipping_total;
        let status = input.status.unwrap_or(OrderStatus::Pending);
        let payment_status = input.payment_status.unwrap_or(PaymentStatus::Pending);

        let order_number = format!("ART-{}", &order_id.to_string()[..8].to_uppercase());
        let order_row = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            status: Set(status),
            payment_status: Set(payment_status),
            fulfillment_status: Set(FulfillmentStatus::Unfulfilled),
            region: Set(input.region),
            currency: Set(input.region.currency().to_string()),
            subtotal: Set(subtotal),
            discount_total: Set(discount_total),
            shipping_total: Set(shipping_total),
            total_amount: Set(total_amount),
            customer_name: Set(input.customer_name),
            customer_email: Set(input.customer_email),
            shipping_address: Set(input.shipping_address),
            billing_address: Set(input.billing_address),
            customer_note: Set(input.customer_note),
            internal_note: Set(input.internal_note),
            coupon_code: Set(coupon_code.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let order_row = order_row.insert(&txn).await?;

        for (line, variant, title) in &snapshots {
            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                variant_id: Set(variant.id),
                title: Set(title.clone()),
                sku: Set(variant.sku.clone()),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                line_total: Set(line.unit_price * Decimal::from(line.quantity)),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
        }

        append_event(&txn, order_id, "order.created", format!(
            "Order {} created with {} line(s), total {} {}",
            order_number,
            snapshots.len(),
            total_amount,
            order_row.currency
        ))
        .await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderCreated(order_id))
            .await;
        if let Some(code) = coupon_code {
            self.event_sender
                .send_or_log(Event::CouponRedeemed { order_id, code })
                .await;
        }

        info!(%order_id, %order_number, "order created");
        Ok(order_row)
    }

    /// Fetches an order with its lines and status history.
    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderDetails, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        self.load_details(order).await
    }

    /// Fetches an order by its human-facing number.
    pub async fn get_order_by_number(&self, order_number: &str) -> Result<OrderDetails, ServiceError> {
        let order = Order::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_number)))?;

        self.load_details(order).await
    }

    async fn load_details(&self, order: OrderModel) -> Result<OrderDetails, ServiceError> {
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .all(&*self.db)
            .await?;
        let events = OrderEvent::find()
            .filter(order_event::Column::OrderId.eq(order.id))
            .order_by_asc(order_event::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        Ok(OrderDetails {
            order,
            items,
            events,
        })
    }

    /// Lists orders newest-first with an optional status filter.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        page: u64,
        per_page: u64,
        status: Option<OrderStatus>,
    ) -> Result<(Vec<OrderModel>, u64), ServiceError> {
        let mut query = Order::find().order_by_desc(order::Column::CreatedAt);
        if let Some(status) = status {
            query = query.filter(order::Column::Status.eq(status));
        }

        let paginator = query.paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((orders, total))
    }

    /// Applies status / payment-status / note changes. Status must move
    /// forward along the lifecycle or into a terminal state.
    #[instrument(skip(self, input))]
    pub async fn update_order(
        &self,
        order_id: Uuid,
        input: UpdateOrderInput,
    ) -> Result<OrderModel, ServiceError> {
        let txn = self.db.begin().await?;

        let order = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let old_status = order.status;
        let old_payment = order.payment_status;
        let mut active: order::ActiveModel = order.into();
        let mut status_change = None;

        if let Some(next) = input.status {
            if next != old_status {
                if !old_status.can_transition_to(next) {
                    return Err(ServiceError::InvalidStatus(format!(
                        "{} -> {} is not a legal transition",
                        old_status, next
                    )));
                }
                active.status = Set(next);
                status_change = Some((old_status, next));
            }
        }

        if let Some(next) = input.payment_status {
            let legal = matches!(
                (old_payment, next),
                (PaymentStatus::Pending, PaymentStatus::Paid)
                    | (PaymentStatus::Paid, PaymentStatus::Refunded)
            );
            if next != old_payment {
                if !legal {
                    return Err(ServiceError::InvalidStatus(format!(
                        "payment {} -> {} is not a legal transition",
                        old_payment, next
                    )));
                }
                active.payment_status = Set(next);
            }
        }

        if let Some(note) = input.internal_note {
            active.internal_note = Set(Some(note));
        }

        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        if let Some((from, to)) = status_change {
            append_event(
                &txn,
                order_id,
                "order.status_changed",
                format!("Status changed from {} to {}", from, to),
            )
            .await?;
        }

        txn.commit().await?;

        if let Some((from, to)) = status_change {
            self.event_sender
                .send_or_log(Event::OrderStatusChanged {
                    order_id,
                    old_status: from.to_string(),
                    new_status: to.to_string(),
                })
                .await;
        }

        Ok(updated)
    }

    /// Cancels an order and restocks tracked quantities that were never
    /// shipped. Terminal orders cannot be cancelled again.
    #[instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        reason: Option<String>,
    ) -> Result<OrderModel, ServiceError> {
        let txn = self.db.begin().await?;

        let order = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.status.is_terminal() {
            return Err(ServiceError::InvalidStatus(format!(
                "Order is already {}",
                order.status
            )));
        }

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&txn)
            .await?;
        let shipped = fulfillments::fulfilled_quantities(&txn, order_id).await?;

        for item in &items {
            let unshipped = item.quantity - shipped.get(&item.id).copied().unwrap_or(0);
            if unshipped > 0 {
                restock_variant(&txn, item.variant_id, unshipped).await?;
            }
        }

        let old_status = order.status;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::Cancelled);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        append_event(
            &txn,
            order_id,
            "order.cancelled",
            match &reason {
                Some(reason) => format!("Order cancelled: {}", reason),
                None => "Order cancelled".to_string(),
            },
        )
        .await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: old_status.to_string(),
                new_status: OrderStatus::Cancelled.to_string(),
            })
            .await;
        self.event_sender
            .send_or_log(Event::OrderCancelled(order_id))
            .await;

        Ok(updated)
    }
}

/// Appends a row to the order's status history.
pub(crate) async fn append_event<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    kind: &str,
    message: String,
) -> Result<(), ServiceError> {
    order_event::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_id: Set(order_id),
        kind: Set(kind.to_string()),
        message: Set(message),
        created_at: Set(Utc::now()),
    }
    .insert(conn)
    .await?;
    Ok(())
}

/// Adds quantity back to a tracked variant's stock.
pub(crate) async fn restock_variant<C: ConnectionTrait>(
    conn: &C,
    variant_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    ProductVariant::update_many()
        .col_expr(
            product_variant::Column::Stock,
            Expr::col(product_variant::Column::Stock).add(quantity),
        )
        .col_expr(product_variant::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(product_variant::Column::Id.eq(variant_id))
        .filter(product_variant::Column::TrackQuantity.eq(true))
        .exec(conn)
        .await?;
    Ok(())
}

/// One requested order line
#[derive(Debug, Clone, Deserialize)]
pub struct OrderLineInput {
    pub variant_id: Uuid,
    pub quantity: i32,
    /// Price the buyer saw; rejected if the live catalog disagrees.
    pub unit_price: Decimal,
}

/// Input for creating an order
#[derive(Debug, Deserialize)]
pub struct CreateOrderInput {
    pub region: Region,
    pub customer_name: String,
    pub customer_email: String,
    pub shipping_address: String,
    pub billing_address: String,
    pub customer_note: Option<String>,
    pub internal_note: Option<String>,
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub shipping_total: Decimal,
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub lines: Vec<OrderLineInput>,
}

/// Status / note changes applied by the admin panel
#[derive(Debug, Deserialize)]
pub struct UpdateOrderInput {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub internal_note: Option<String>,
}

/// Order with lines and status history
#[derive(Debug, Serialize)]
pub struct OrderDetails {
    pub order: OrderModel,
    pub items: Vec<order_item::Model>,
    pub events: Vec<order_event::Model>,
}
