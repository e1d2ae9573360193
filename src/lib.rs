//! Atelier API Library
//!
//! Commerce backend for an art print storefront: catalog, cart, checkout,
//! order lifecycle, fulfillment, refunds, coupons and analytics.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod services;

use axum::{extract::State, response::Json, routing::get, Router};
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};
use std::sync::Arc;

// App state definition
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub auth: auth::AuthService,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

/// Full v1 API surface. Storefront routes are anonymous; the order, coupon
/// and analytics surfaces check the admin bearer token per handler.
pub fn api_v1_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        // Storefront
        .nest("/products", handlers::products::products_routes())
        .nest("/carts", handlers::carts::carts_routes())
        .nest("/checkout", handlers::checkout::checkout_routes())
        .nest("/campaigns", handlers::coupons::campaigns_routes())
        .nest("/events", handlers::activity::events_routes())
        // Back office
        .nest("/auth", handlers::auth::auth_routes())
        .nest("/orders", handlers::orders::orders_routes())
        .nest("/coupons", handlers::coupons::coupons_routes())
        .nest("/analytics", handlers::analytics::analytics_routes())
}

async fn api_status() -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");
    Json(json!({
        "status": "ok",
        "service": "atelier-api",
        "version": version,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn health_check(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, errors::ServiceError> {
    let db_status = match state.db.ping().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    Ok(Json(json!({
        "status": db_status,
        "checks": {
            "database": db_status,
        },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}
