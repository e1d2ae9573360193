use crate::{
    entities::{
        fulfillment, fulfillment_item, order, order_item, Fulfillment, FulfillmentItem,
        FulfillmentModel, FulfillmentStatus, Order, OrderItem, OrderStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::orders::append_event,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Fulfillment service.
///
/// An order may ship in several parcels. Each call records one parcel; the
/// order-level fulfillment status is recomputed from the running totals of
/// shipped vs ordered quantities per line, so a partial shipment never marks
/// the whole order fulfilled.
#[derive(Clone)]
pub struct FulfillmentService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl FulfillmentService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Records a shipment of some or all of an order's lines.
    #[instrument(skip(self, input))]
    pub async fn create_fulfillment(
        &self,
        order_id: Uuid,
        input: CreateFulfillmentInput,
    ) -> Result<FulfillmentModel, ServiceError> {
        if input.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "Fulfillment must cover at least one line".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let order_row = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order_row.status.is_terminal() {
            return Err(ServiceError::InvalidStatus(format!(
                "Cannot fulfill a {} order",
                order_row.status
            )));
        }

        let items: HashMap<Uuid, order_item::Model> = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&txn)
            .await?
            .into_iter()
            .map(|item| (item.id, item))
            .collect();
        let mut shipped = fulfilled_quantities(&txn, order_id).await?;

        let now = Utc::now();
        let fulfillment_id = Uuid::new_v4();

        for line in &input.items {
            let item = items.get(&line.order_item_id).ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "Order item {} does not belong to this order",
                    line.order_item_id
                ))
            })?;

            if line.quantity <= 0 {
                return Err(ServiceError::ValidationError(
                    "Fulfillment quantity must be positive".to_string(),
                ));
            }

            let already = shipped.get(&item.id).copied().unwrap_or(0);
            if already + line.quantity > item.quantity {
                return Err(ServiceError::ValidationError(format!(
                    "Line {} has {} of {} shipped; cannot ship {} more",
                    item.sku,
                    already,
                    item.quantity,
                    line.quantity
                )));
            }

            *shipped.entry(item.id).or_insert(0) += line.quantity;
        }

        let fulfillment_row = fulfillment::ActiveModel {
            id: Set(fulfillment_id),
            order_id: Set(order_id),
            tracking_company: Set(input.tracking_company.clone()),
            tracking_number: Set(input.tracking_number.clone()),
            tracking_url: Set(input.tracking_url.clone()),
            shipped_at: Set(now),
            created_at: Set(now),
        }
        .insert(&txn)
        .await?;

        for line in &input.items {
            fulfillment_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                fulfillment_id: Set(fulfillment_id),
                order_item_id: Set(line.order_item_id),
                quantity: Set(line.quantity),
            }
            .insert(&txn)
            .await?;
        }

        let derived = derive_status(&items, &shipped);

        let old_status = order_row.status;
        let mut active: order::ActiveModel = order_row.into();
        active.fulfillment_status = Set(derived);
        if old_status.can_transition_to(OrderStatus::Shipped) {
            active.status = Set(OrderStatus::Shipped);
        }
        active.updated_at = Set(now);
        active.update(&txn).await?;

        let tracking = match (&input.tracking_company, &input.tracking_number) {
            (Some(company), Some(number)) => format!(" ({} {})", company, number),
            (None, Some(number)) => format!(" ({})", number),
            _ => String::new(),
        };
        append_event(
            &txn,
            order_id,
            "order.fulfilled",
            format!(
                "Shipment of {} line(s) recorded{}; order is now {}",
                input.items.len(),
                tracking,
                derived
            ),
        )
        .await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::FulfillmentCreated {
                order_id,
                fulfillment_id,
                notify_customer: input.notify_customer,
            })
            .await;

        info!(%order_id, %fulfillment_id, status = %derived, "fulfillment recorded");
        Ok(fulfillment_row)
    }

    /// All shipments recorded for an order, oldest first.
    pub async fn list_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<FulfillmentWithItems>, ServiceError> {
        let fulfillments = Fulfillment::find()
            .filter(fulfillment::Column::OrderId.eq(order_id))
            .order_by_asc(fulfillment::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let ids: Vec<Uuid> = fulfillments.iter().map(|f| f.id).collect();
        let mut items_by_fulfillment: HashMap<Uuid, Vec<fulfillment_item::Model>> = HashMap::new();
        if !ids.is_empty() {
            for item in FulfillmentItem::find()
                .filter(fulfillment_item::Column::FulfillmentId.is_in(ids))
                .all(&*self.db)
                .await?
            {
                items_by_fulfillment
                    .entry(item.fulfillment_id)
                    .or_default()
                    .push(item);
            }
        }

        Ok(fulfillments
            .into_iter()
            .map(|fulfillment| {
                let items = items_by_fulfillment
                    .remove(&fulfillment.id)
                    .unwrap_or_default();
                FulfillmentWithItems { fulfillment, items }
            })
            .collect())
    }
}

/// Total shipped quantity per order line across every fulfillment.
pub(crate) async fn fulfilled_quantities<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<HashMap<Uuid, i32>, ServiceError> {
    let fulfillment_ids: Vec<Uuid> = Fulfillment::find()
        .filter(fulfillment::Column::OrderId.eq(order_id))
        .all(conn)
        .await?
        .into_iter()
        .map(|f| f.id)
        .collect();

    let mut totals = HashMap::new();
    if fulfillment_ids.is_empty() {
        return Ok(totals);
    }

    for item in FulfillmentItem::find()
        .filter(fulfillment_item::Column::FulfillmentId.is_in(fulfillment_ids))
        .all(conn)
        .await?
    {
        *totals.entry(item.order_item_id).or_insert(0) += item.quantity;
    }

    Ok(totals)
}

/// Order-level fulfillment status from per-line shipped totals.
fn derive_status(
    items: &HashMap<Uuid, order_item::Model>,
    shipped: &HashMap<Uuid, i32>,
) -> FulfillmentStatus {
    let any_shipped = shipped.values().any(|&qty| qty > 0);
    let all_shipped = items
        .values()
        .all(|item| shipped.get(&item.id).copied().unwrap_or(0) >= item.quantity);

    if all_shipped && !items.is_empty() {
        FulfillmentStatus::Fulfilled
    } else if any_shipped {
        FulfillmentStatus::PartiallyFulfilled
    } else {
        FulfillmentStatus::Unfulfilled
    }
}

/// One fulfilled line
#[derive(Debug, Clone, Deserialize)]
pub struct FulfillmentLineInput {
    pub order_item_id: Uuid,
    pub quantity: i32,
}

/// Input for recording a shipment
#[derive(Debug, Deserialize)]
pub struct CreateFulfillmentInput {
    pub items: Vec<FulfillmentLineInput>,
    pub tracking_company: Option<String>,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
    #[serde(default)]
    pub notify_customer: bool,
}

/// Fulfillment with its covered lines
#[derive(Debug, Serialize)]
pub struct FulfillmentWithItems {
    pub fulfillment: FulfillmentModel,
    pub items: Vec<fulfillment_item::Model>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(quantity: i32) -> order_item::Model {
        order_item::Model {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            variant_id: Uuid::new_v4(),
            title: "Harbor Mist".to_string(),
            sku: "HM-50x70".to_string(),
            quantity,
            unit_price: dec!(1500),
            line_total: dec!(1500) * rust_decimal::Decimal::from(quantity),
            created_at: Utc::now(),
        }
    }

    fn map(items: Vec<order_item::Model>) -> HashMap<Uuid, order_item::Model> {
        items.into_iter().map(|i| (i.id, i)).collect()
    }

    #[test]
    fn nothing_shipped_is_unfulfilled() {
        let items = map(vec![item(2), item(1)]);
        assert_eq!(
            derive_status(&items, &HashMap::new()),
            FulfillmentStatus::Unfulfilled
        );
    }

    #[test]
    fn partial_coverage_is_partially_fulfilled() {
        let items = map(vec![item(2), item(1)]);
        let first = *items.keys().next().expect("at least one item");
        let shipped = HashMap::from([(first, 1)]);
        assert_eq!(
            derive_status(&items, &shipped),
            FulfillmentStatus::PartiallyFulfilled
        );
    }

    #[test]
    fn full_coverage_is_fulfilled() {
        let items = map(vec![item(2)]);
        let id = *items.keys().next().expect("one item");
        let shipped = HashMap::from([(id, 2)]);
        assert_eq!(derive_status(&items, &shipped), FulfillmentStatus::Fulfilled);
    }
}
