use crate::handlers::common::{created_response, map_service_error};
use crate::{
    entities::ActivityEventType,
    errors::ApiError,
    services::activity::RecordActivityInput,
    AppState,
};
use axum::{
    extract::{Json, State},
    routing::post,
    Router,
};
use std::sync::Arc;

/// Storefront behavior-event routes
pub fn events_routes() -> Router<Arc<AppState>> {
    Router::new().route("/", post(record_event))
}

/// Append a behavior event. PURCHASE rows are written by checkout only;
/// the public endpoint rejects them.
async fn record_event(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RecordActivityInput>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    if payload.event_type == ActivityEventType::Purchase {
        return Err(ApiError::ValidationError(
            "PURCHASE events are recorded by checkout".to_string(),
        ));
    }

    let row = state
        .services
        .activity
        .record(payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(row))
}
