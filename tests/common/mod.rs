//! Shared fixture: an in-memory SQLite database with the full schema and the
//! service container wired the same way `main` does it.

use atelier_api::{
    config::{AppConfig, ShippingRates},
    db::{establish_connection_with_config, run_migrations, DbConfig},
    entities::{product, product_variant, ProductModel, ProductVariantModel},
    events::EventSender,
    handlers::AppServices,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub services: AppServices,
    // Held so send_or_log never sees a closed channel during a test.
    _event_rx: mpsc::Receiver<atelier_api::events::Event>,
}

impl TestApp {
    pub async fn new() -> Self {
        // A single pooled connection keeps every query on the same
        // in-memory SQLite database.
        let db = establish_connection_with_config(&DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            acquire_timeout: Duration::from_secs(5),
        })
        .await
        .expect("connect to in-memory sqlite");

        run_migrations(&db).await.expect("run migrations");
        let db = Arc::new(db);

        let (tx, rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(tx));

        let services = AppServices::new(db.clone(), event_sender, &test_config());

        Self {
            db,
            services,
            _event_rx: rx,
        }
    }

    pub async fn seed_product(&self, title: &str, slug: &str) -> ProductModel {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            title: Set(title.to_string()),
            slug: Set(slug.to_string()),
            description: Set(None),
            artist: Set(Some("Test Artist".to_string())),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("insert product")
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn seed_variant(
        &self,
        product_id: Uuid,
        sku: &str,
        price_try: Decimal,
        price_usd: Decimal,
        desi: Decimal,
        stock: i32,
        track_quantity: bool,
    ) -> ProductVariantModel {
        let now = Utc::now();
        product_variant::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            sku: Set(sku.to_string()),
            size: Set("50x70".to_string()),
            material: Set("canvas".to_string()),
            price_try: Set(price_try),
            price_usd: Set(price_usd),
            desi: Set(desi),
            weight_kg: Set(None),
            stock: Set(stock),
            track_quantity: Set(track_quantity),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("insert variant")
    }

    pub async fn reload_variant(&self, variant_id: Uuid) -> ProductVariantModel {
        use sea_orm::EntityTrait;
        atelier_api::entities::ProductVariant::find_by_id(variant_id)
            .one(&*self.db)
            .await
            .expect("query variant")
            .expect("variant exists")
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: "integration-test-secret-0123456789abcdef".to_string(),
        jwt_expiration_secs: 3600,
        host: "127.0.0.1".to_string(),
        port: 0,
        environment: "test".to_string(),
        log_level: "warn".to_string(),
        log_json: false,
        auto_migrate: true,
        cors_allowed_origins: None,
        db_max_connections: 1,
        db_min_connections: 1,
        db_connect_timeout_secs: 5,
        db_acquire_timeout_secs: 5,
        event_channel_capacity: 256,
        shipping: ShippingRates::default(),
    }
}
