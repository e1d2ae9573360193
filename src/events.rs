use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Domain events emitted by the service layer after a state change commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Cart events
    CartCreated(Uuid),
    CartItemAdded { cart_id: Uuid, variant_id: Uuid },
    CartItemRemoved { cart_id: Uuid, item_id: Uuid },
    CartCleared(Uuid),

    // Checkout events
    CheckoutStarted { cart_id: Uuid },
    CheckoutCompleted { cart_id: Uuid, order_id: Uuid },

    // Order events
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderCancelled(Uuid),

    // Promotion events
    CouponRedeemed { order_id: Uuid, code: String },

    // Fulfillment events
    FulfillmentCreated {
        order_id: Uuid,
        fulfillment_id: Uuid,
        notify_customer: bool,
    },

    // Refund events
    RefundCreated {
        order_id: Uuid,
        refund_id: Uuid,
        amount: Decimal,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, surfacing channel failures to the caller.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event and logs instead of failing when the channel is closed.
    /// State changes have already committed by the time events fire, so a
    /// dropped event must not fail the request.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event.clone()).await {
            warn!(?event, "event dropped: {}", e);
        }
    }
}

/// Drains the event channel. Events are logged; the customer notification for
/// fulfillments is a placeholder until an email provider is wired up.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    info!("Event processor started");

    while let Some(event) = receiver.recv().await {
        match &event {
            Event::FulfillmentCreated {
                order_id,
                notify_customer: true,
                ..
            } => {
                // TODO: deliver the shipment-confirmation email once a mail
                // provider is configured; for now the intent is only logged.
                info!(%order_id, "customer shipment notification queued (no-op)");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "order status changed");
            }
            _ => {
                info!(?event, "domain event");
            }
        }
    }

    error!("Event channel closed; processor exiting");
}
