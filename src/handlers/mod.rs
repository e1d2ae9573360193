pub mod activity;
pub mod analytics;
pub mod auth;
pub mod carts;
pub mod checkout;
pub mod common;
pub mod coupons;
pub mod orders;
pub mod products;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use std::sync::Arc;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<crate::services::CatalogService>,
    pub cart: Arc<crate::services::CartService>,
    pub checkout: Arc<crate::services::CheckoutService>,
    pub coupons: Arc<crate::services::CouponService>,
    pub orders: Arc<crate::services::OrderService>,
    pub fulfillments: Arc<crate::services::FulfillmentService>,
    pub refunds: Arc<crate::services::RefundService>,
    pub activity: Arc<crate::services::ActivityService>,
    pub analytics: Arc<crate::services::AnalyticsService>,
}

impl AppServices {
    /// Builds the service container shared by every handler.
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, config: &AppConfig) -> Self {
        let catalog = Arc::new(crate::services::CatalogService::new(db_pool.clone()));
        let cart = Arc::new(crate::services::CartService::new(
            db_pool.clone(),
            event_sender.clone(),
        ));
        let coupons = Arc::new(crate::services::CouponService::new(db_pool.clone()));
        let orders = Arc::new(crate::services::OrderService::new(
            db_pool.clone(),
            event_sender.clone(),
        ));
        let checkout = Arc::new(crate::services::CheckoutService::new(
            db_pool.clone(),
            event_sender.clone(),
            orders.clone(),
            config.shipping.clone(),
        ));
        let fulfillments = Arc::new(crate::services::FulfillmentService::new(
            db_pool.clone(),
            event_sender.clone(),
        ));
        let refunds = Arc::new(crate::services::RefundService::new(
            db_pool.clone(),
            event_sender,
        ));
        let activity = Arc::new(crate::services::ActivityService::new(db_pool.clone()));
        let analytics = Arc::new(crate::services::AnalyticsService::new(db_pool));

        Self {
            catalog,
            cart,
            checkout,
            coupons,
            orders,
            fulfillments,
            refunds,
            activity,
            analytics,
        }
    }
}
