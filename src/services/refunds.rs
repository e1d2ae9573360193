use crate::{
    entities::{
        order, order_item, refund, refund_item, Order, OrderItem, OrderStatus, PaymentStatus,
        Refund, RefundModel,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::orders::{append_event, restock_variant},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Refund service.
///
/// The refundable remainder (`total_amount − Σ prior refunds`) is computed
/// inside the transaction and caps the accepted amount, so an order can never
/// be refunded past what was charged. When the running total reaches the
/// order amount, the order and its payment flip to REFUNDED.
#[derive(Clone)]
pub struct RefundService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl RefundService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Records a refund against an order, optionally restocking the
    /// referenced lines.
    #[instrument(skip(self, input), fields(amount = %input.amount))]
    pub async fn create_refund(
        &self,
        order_id: Uuid,
        input: CreateRefundInput,
    ) -> Result<RefundModel, ServiceError> {
        if input.amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Refund amount must be positive".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let order_row = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order_row.payment_status == PaymentStatus::Pending {
            return Err(ServiceError::InvalidOperation(
                "Order has no captured payment to refund".to_string(),
            ));
        }

        let prior: Decimal = Refund::find()
            .filter(refund::Column::OrderId.eq(order_id))
            .all(&txn)
            .await?
            .iter()
            .map(|r| r.amount)
            .sum();

        let remainder = order_row.total_amount - prior;
        if input.amount > remainder {
            return Err(ServiceError::InvalidOperation(format!(
                "Refund of {} exceeds the refundable remainder of {}",
                input.amount, remainder
            )));
        }

        let items: HashMap<Uuid, order_item::Model> = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&txn)
            .await?
            .into_iter()
            .map(|item| (item.id, item))
            .collect();

        for line in &input.items {
            let item = items.get(&line.order_item_id).ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "Order item {} does not belong to this order",
                    line.order_item_id
                ))
            })?;
            if line.quantity <= 0 || line.quantity > item.quantity {
                return Err(ServiceError::ValidationError(format!(
                    "Refund quantity for {} must be between 1 and {}",
                    item.sku, item.quantity
                )));
            }
        }

        let now = Utc::now();
        let refund_id = Uuid::new_v4();
        let refund_row = refund::ActiveModel {
            id: Set(refund_id),
            order_id: Set(order_id),
            amount: Set(input.amount),
            reason: Set(input.reason.clone()),
            restocked: Set(input.restock_items),
            created_at: Set(now),
        }
        .insert(&txn)
        .await?;

        for line in &input.items {
            refund_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                refund_id: Set(refund_id),
                order_item_id: Set(line.order_item_id),
                quantity: Set(line.quantity),
            }
            .insert(&txn)
            .await?;

            if input.restock_items {
                // `items` lookup can't miss here, the loop above verified it.
                if let Some(item) = items.get(&line.order_item_id) {
                    restock_variant(&txn, item.variant_id, line.quantity).await?;
                }
            }
        }

        let refunded_to_date = prior + input.amount;
        let fully_refunded = refunded_to_date >= order_row.total_amount;

        if fully_refunded {
            let mut active: order::ActiveModel = order_row.into();
            active.status = Set(OrderStatus::Refunded);
            active.payment_status = Set(PaymentStatus::Refunded);
            active.updated_at = Set(now);
            active.update(&txn).await?;
        }

        append_event(
            &txn,
            order_id,
            "order.refunded",
            format!(
                "Refund of {} recorded ({} of {} refunded to date){}",
                input.amount,
                refunded_to_date,
                remainder + prior,
                if fully_refunded {
                    "; order fully refunded"
                } else {
                    ""
                }
            ),
        )
        .await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::RefundCreated {
                order_id,
                refund_id,
                amount: input.amount,
            })
            .await;

        info!(%order_id, %refund_id, fully_refunded, "refund recorded");
        Ok(refund_row)
    }

    /// All refunds recorded for an order, oldest first.
    pub async fn list_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<RefundWithItems>, ServiceError> {
        let refunds = Refund::find()
            .filter(refund::Column::OrderId.eq(order_id))
            .order_by_asc(refund::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let ids: Vec<Uuid> = refunds.iter().map(|r| r.id).collect();
        let mut items_by_refund: HashMap<Uuid, Vec<refund_item::Model>> = HashMap::new();
        if !ids.is_empty() {
            for item in crate::entities::RefundItem::find()
                .filter(refund_item::Column::RefundId.is_in(ids))
                .all(&*self.db)
                .await?
            {
                items_by_refund.entry(item.refund_id).or_default().push(item);
            }
        }

        Ok(refunds
            .into_iter()
            .map(|refund| {
                let items = items_by_refund.remove(&refund.id).unwrap_or_default();
                RefundWithItems { refund, items }
            })
            .collect())
    }
}

/// One refunded line
#[derive(Debug, Clone, Deserialize)]
pub struct RefundLineInput {
    pub order_item_id: Uuid,
    pub quantity: i32,
}

/// Input for recording a refund
#[derive(Debug, Deserialize)]
pub struct CreateRefundInput {
    pub amount: Decimal,
    pub reason: Option<String>,
    #[serde(default)]
    pub items: Vec<RefundLineInput>,
    #[serde(default)]
    pub restock_items: bool,
}

/// Refund with its covered lines
#[derive(Debug, Serialize)]
pub struct RefundWithItems {
    pub refund: RefundModel,
    pub items: Vec<refund_item::Model>,
}
