use crate::auth::AdminClaims;
use crate::handlers::common::{
    created_response, map_service_error, success_response, PaginatedResponse, PaginationParams,
};
use crate::{
    entities::OrderStatus,
    services::{
        fulfillments::CreateFulfillmentInput,
        orders::{CreateOrderInput, UpdateOrderInput},
        refunds::CreateRefundInput,
    },
    AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

/// Creates the router for the admin order surface. Every route requires an
/// admin bearer token.
pub fn orders_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/:id", get(get_order).patch(update_order))
        .route("/by-number/:order_number", get(get_order_by_number))
        .route("/:id/cancel", post(cancel_order))
        .route("/:id/fulfill", post(fulfill_order))
        .route("/:id/fulfillments", get(list_fulfillments))
        .route("/:id/refund", post(refund_order))
        .route("/:id/refunds", get(list_refunds))
}

/// Create an order from explicit lines (admin / phone orders)
async fn create_order(
    _admin: AdminClaims,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOrderInput>,
) -> Result<impl axum::response::IntoResponse, crate::errors::ApiError> {
    let order = state
        .services
        .orders
        .create_order(payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(order))
}

/// List orders with optional status filter
async fn list_orders(
    _admin: AdminClaims,
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<OrderListFilter>,
) -> Result<impl axum::response::IntoResponse, crate::errors::ApiError> {
    let (orders, total) = state
        .services
        .orders
        .list_orders(pagination.page, pagination.per_page, filter.status)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(PaginatedResponse::new(
        orders,
        pagination.page,
        pagination.per_page,
        total,
    )))
}

/// Get an order with lines and history
async fn get_order(
    _admin: AdminClaims,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, crate::errors::ApiError> {
    let details = state
        .services
        .orders
        .get_order(id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(details))
}

/// Get an order by its human-facing number
async fn get_order_by_number(
    _admin: AdminClaims,
    State(state): State<Arc<AppState>>,
    Path(order_number): Path<String>,
) -> Result<impl axum::response::IntoResponse, crate::errors::ApiError> {
    let details = state
        .services
        .orders
        .get_order_by_number(&order_number)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(details))
}

/// Apply status / payment / note changes
async fn update_order(
    _admin: AdminClaims,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderInput>,
) -> Result<impl axum::response::IntoResponse, crate::errors::ApiError> {
    let order = state
        .services
        .orders
        .update_order(id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(order))
}

/// Cancel an order, restocking unshipped tracked lines
async fn cancel_order(
    _admin: AdminClaims,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    payload: Option<Json<CancelOrderRequest>>,
) -> Result<impl axum::response::IntoResponse, crate::errors::ApiError> {
    let reason = payload.and_then(|Json(body)| body.reason);

    let order = state
        .services
        .orders
        .cancel_order(id, reason)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(order))
}

/// Record a shipment for some or all lines
async fn fulfill_order(
    _admin: AdminClaims,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateFulfillmentInput>,
) -> Result<impl axum::response::IntoResponse, crate::errors::ApiError> {
    let fulfillment = state
        .services
        .fulfillments
        .create_fulfillment(id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(fulfillment))
}

/// List shipments recorded for an order
async fn list_fulfillments(
    _admin: AdminClaims,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, crate::errors::ApiError> {
    let fulfillments = state
        .services
        .fulfillments
        .list_for_order(id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(fulfillments))
}

/// Record a refund, optionally restocking
async fn refund_order(
    _admin: AdminClaims,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RefundRequest>,
) -> Result<impl axum::response::IntoResponse, crate::errors::ApiError> {
    let input = CreateRefundInput {
        amount: payload.amount,
        reason: payload.reason,
        items: payload.items,
        restock_items: payload.restock_items,
    };

    let refund = state
        .services
        .refunds
        .create_refund(id, input)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(refund))
}

/// List refunds recorded for an order
async fn list_refunds(
    _admin: AdminClaims,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, crate::errors::ApiError> {
    let refunds = state
        .services
        .refunds
        .list_for_order(id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(refunds))
}

// Request DTOs

#[derive(Debug, Deserialize)]
pub struct OrderListFilter {
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Deserialize)]
pub struct CancelOrderRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub amount: rust_decimal::Decimal,
    pub reason: Option<String>,
    #[serde(default)]
    pub items: Vec<crate::services::refunds::RefundLineInput>,
    #[serde(default)]
    pub restock_items: bool,
}
