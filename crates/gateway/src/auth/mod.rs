//! Handshake credential verification
//!
//! Tokens are issued elsewhere; the gateway only verifies them.

pub mod jwt;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use huddle_shared::UserId;

use crate::error::ApiError;
use crate::state::AppState;

pub use jwt::{Claims, JwtError, JwtVerifier, TokenType};

/// Role granted to administrators
pub const ADMIN_ROLE: &str = "admin";

/// Identity resolved from a verified credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedIdentity {
    pub user_id: UserId,
    pub role: String,
}

impl AuthenticatedIdentity {
    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }
}

/// Validates a bearer credential presented at handshake
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<AuthenticatedIdentity, JwtError>;
}

/// Extract a bearer token from the `Authorization` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Bearer-authenticated caller of an HTTP route
#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(ApiError::Unauthorized)?;
        state.verifier.verify(token).map_err(|e| {
            tracing::warn!(error = %e, "Rejected bearer token");
            ApiError::InvalidToken
        })
    }
}
