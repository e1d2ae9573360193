use crate::handlers::common::{created_response, map_service_error, success_response, validate_input};
use crate::{services::checkout::SubmitCheckoutInput, AppState};
use axum::{
    extract::{Json, State},
    routing::post,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Creates the router for checkout endpoints
pub fn checkout_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/quote", post(quote_shipping))
        .route("/validate-coupon", post(validate_coupon))
        .route("/submit", post(submit_checkout))
}

/// Shipping estimate for a cart
async fn quote_shipping(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<QuoteRequest>,
) -> Result<impl axum::response::IntoResponse, crate::errors::ApiError> {
    let quote = state
        .services
        .checkout
        .quote(payload.cart_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(quote))
}

/// Validate a coupon code for a prospective checkout
async fn validate_coupon(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ValidateCouponRequest>,
) -> Result<impl axum::response::IntoResponse, crate::errors::ApiError> {
    validate_input(&payload)?;

    let summary = state
        .services
        .coupons
        .validate_coupon(&payload.code, payload.customer_email.as_deref())
        .await
        .map_err(map_service_error)?;

    Ok(success_response(summary))
}

/// Convert a cart into a paid order
async fn submit_checkout(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SubmitCheckoutRequest>,
) -> Result<impl axum::response::IntoResponse, crate::errors::ApiError> {
    validate_input(&payload)?;

    let input = SubmitCheckoutInput {
        customer_name: payload.customer_name,
        customer_email: payload.customer_email,
        shipping_address: payload.shipping_address,
        billing_address: payload.billing_address,
        customer_note: payload.customer_note,
        coupon_code: payload.coupon_code,
    };

    let order = state
        .services
        .checkout
        .submit(payload.cart_id, input)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(order))
}

// Request DTOs

#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub cart_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ValidateCouponRequest {
    #[validate(length(min = 1))]
    pub code: String,
    #[validate(email)]
    pub customer_email: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitCheckoutRequest {
    pub cart_id: Uuid,
    #[validate(length(min = 1))]
    pub customer_name: String,
    #[validate(email)]
    pub customer_email: String,
    #[validate(length(min = 1))]
    pub shipping_address: String,
    pub billing_address: Option<String>,
    pub customer_note: Option<String>,
    pub coupon_code: Option<String>,
}
