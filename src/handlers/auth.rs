use crate::{errors::ApiError, AppState};
use axum::{
    extract::{Json, State},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Admin auth routes
pub fn auth_routes() -> Router<Arc<AppState>> {
    Router::new().route("/token", post(issue_token))
}

/// Bootstrap token mint: exchanges the configured shared secret for a
/// short-lived admin bearer token.
async fn issue_token(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    if !state.auth.bootstrap_secret_matches(&payload.shared_secret) {
        return Err(ApiError::Unauthorized);
    }

    let token = state
        .auth
        .issue_token(&payload.email)
        .map_err(|_| ApiError::Unauthorized)?;

    Ok(Json(TokenResponse { token }))
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub email: String,
    pub shared_secret: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}
