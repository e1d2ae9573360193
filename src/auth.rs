use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::ApiError;
use crate::AppState;

const ISSUER: &str = "atelier-api";
const ADMIN_ROLE: &str = "admin";

/// Claim structure for admin JWT tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (operator email)
    pub sub: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

/// Authentication configuration
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_expiration: Duration,
}

impl AuthConfig {
    pub fn new(jwt_secret: String, token_expiration: Duration) -> Self {
        Self {
            jwt_secret,
            token_expiration,
        }
    }
}

/// Issues and validates bearer tokens for the back-office surface. The
/// storefront is anonymous; only admin routes go through this.
#[derive(Clone, Debug)]
pub struct AuthService {
    config: AuthConfig,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Issues an admin token for the given operator identity.
    pub fn issue_token(&self, subject: &str) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            role: ADMIN_ROLE.to_string(),
            iat: now.timestamp(),
            exp: (now + chrono::Duration::seconds(self.config.token_expiration.as_secs() as i64))
                .timestamp(),
            iss: ISSUER.to_string(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
    }

    /// Validates a bearer token and returns its claims.
    pub fn validate_token(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
    }

    /// Constant credential for the bootstrap token mint.
    pub fn bootstrap_secret_matches(&self, candidate: &str) -> bool {
        // Admin bootstrap uses the configured secret itself as the shared
        // credential; real operator identities come from the issued tokens.
        candidate == self.config.jwt_secret
    }
}

/// Extractor for admin-gated handlers. Rejects with 401 when the bearer token
/// is missing, malformed, expired, or not an admin token.
#[derive(Debug, Clone)]
pub struct AdminClaims(pub Claims);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminClaims {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or(ApiError::Unauthorized)?;

        let claims = state
            .auth
            .validate_token(token)
            .map_err(|_| ApiError::Unauthorized)?;

        if claims.role != ADMIN_ROLE {
            return Err(ApiError::Unauthorized);
        }

        Ok(AdminClaims(claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AuthService {
        AuthService::new(AuthConfig::new(
            "unit-test-secret-0123456789abcdefghijklmn".to_string(),
            Duration::from_secs(3600),
        ))
    }

    #[test]
    fn issued_tokens_validate() {
        let auth = service();
        let token = auth.issue_token("ops@example.com").expect("issue");
        let claims = auth.validate_token(&token).expect("validate");
        assert_eq!(claims.sub, "ops@example.com");
        assert_eq!(claims.role, "admin");
        assert_eq!(claims.iss, "atelier-api");
    }

    #[test]
    fn foreign_tokens_are_rejected() {
        let auth = service();
        let other = AuthService::new(AuthConfig::new(
            "a-different-secret-0123456789abcdefghijk".to_string(),
            Duration::from_secs(3600),
        ));
        let token = other.issue_token("ops@example.com").expect("issue");
        assert!(auth.validate_token(&token).is_err());
    }

    #[test]
    fn garbage_tokens_are_rejected() {
        assert!(service().validate_token("not.a.jwt").is_err());
    }
}
