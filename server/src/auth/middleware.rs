//! Authentication extractor.
//!
//! When `AUTH_SECRET` is configured, requests must carry it as a bearer
//! token. Without a secret every caller is anonymous.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::error::AppError;
use crate::AppState;

/// Caller allowed to mutate lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthUser {
    /// Presented the configured secret
    Token,
    /// No secret is configured
    Anonymous,
}

impl AuthUser {
    /// Check an `Authorization` header value against the configured secret.
    pub fn authorize(header: Option<&str>, secret: Option<&str>) -> Result<Self, AppError> {
        let Some(secret) = secret else {
            return Ok(AuthUser::Anonymous);
        };

        let token = header
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(AppError::Unauthorized)?;

        if token == secret {
            Ok(AuthUser::Token)
        } else {
            tracing::debug!("Rejected bearer token");
            Err(AppError::Unauthorized)
        }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        AuthUser::authorize(header, state.config.auth_secret.as_deref())
    }
}
