use crate::auth::AdminClaims;
use crate::handlers::common::{map_service_error, success_response};
use crate::{services::analytics::StatsPeriod, AppState};
use axum::{
    extract::{Query, State},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;

/// Admin analytics routes
pub fn analytics_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/stats", get(stats))
        .route("/abandoned", get(abandoned_carts))
}

/// Funnel, revenue, top products and daily series for a period
async fn stats(
    _admin: AdminClaims,
    State(state): State<Arc<AppState>>,
    Query(params): Query<StatsQuery>,
) -> Result<impl axum::response::IntoResponse, crate::errors::ApiError> {
    let stats = state
        .services
        .analytics
        .stats(params.period.unwrap_or(StatsPeriod::SevenDays))
        .await
        .map_err(map_service_error)?;

    Ok(success_response(stats))
}

/// Sessions that carted but never purchased in the lookback window
async fn abandoned_carts(
    _admin: AdminClaims,
    State(state): State<Arc<AppState>>,
) -> Result<impl axum::response::IntoResponse, crate::errors::ApiError> {
    let sessions = state
        .services
        .analytics
        .abandoned_carts()
        .await
        .map_err(map_service_error)?;

    Ok(success_response(sessions))
}

#[derive(Debug, Deserialize)]
struct StatsQuery {
    period: Option<StatsPeriod>,
}
