use crate::auth::AdminClaims;
use crate::handlers::common::{
    created_response, map_service_error, success_response, PaginatedResponse, PaginationParams,
};
use crate::{services::coupons::CreateCouponInput, AppState};
use axum::{
    extract::{Json, Query, State},
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Admin coupon management routes
pub fn coupons_routes() -> Router<Arc<AppState>> {
    Router::new().route("/", post(create_coupon).get(list_coupons))
}

/// Public campaign listing routes
pub fn campaigns_routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(list_campaigns))
}

/// Create a coupon (admin)
async fn create_coupon(
    _admin: AdminClaims,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateCouponInput>,
) -> Result<impl axum::response::IntoResponse, crate::errors::ApiError> {
    let coupon = state
        .services
        .coupons
        .create_coupon(payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(coupon))
}

/// List coupons (admin)
async fn list_coupons(
    _admin: AdminClaims,
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl axum::response::IntoResponse, crate::errors::ApiError> {
    let (coupons, total) = state
        .services
        .coupons
        .list_coupons(pagination.page, pagination.per_page)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(PaginatedResponse::new(
        coupons,
        pagination.page,
        pagination.per_page,
        total,
    )))
}

/// Campaigns currently inside their window, with coupon codes attached
async fn list_campaigns(
    State(state): State<Arc<AppState>>,
) -> Result<impl axum::response::IntoResponse, crate::errors::ApiError> {
    let campaigns = state
        .services
        .coupons
        .list_active_campaigns()
        .await
        .map_err(map_service_error)?;

    Ok(success_response(campaigns))
}
