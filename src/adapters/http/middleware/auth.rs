//! Authentication middleware and extractors for axum.
//!
//! This module provides:
//! - `JwtValidator` - HS256 bearer token validation
//! - `auth_middleware` - Layer that validates Bearer tokens and injects
//!   the account into request extensions
//! - `RequireAccount` - Extractor that requires authentication
//!
//! ```text
//! Request → auth_middleware → injects AuthenticatedAccount into extensions
//!                                      ↓
//!                              Handler → RequireAccount extractor reads from extensions
//! ```
//!
//! The webhook route is NOT behind this middleware; webhook requests
//! authenticate with the provider signature instead.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::domain::foundation::AccountId;

/// Account identity established by the auth middleware.
#[derive(Debug, Clone)]
pub struct AuthenticatedAccount {
    pub account_id: AccountId,
}

/// Claims this service reads from access tokens.
#[derive(Debug, Deserialize)]
struct Claims {
    /// Account ID the token was issued for.
    sub: String,
    #[allow(dead_code)]
    exp: usize,
}

/// HS256 bearer token validator.
pub struct JwtValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    pub fn new(secret: &SecretString) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Validate a token and extract the account it was issued for.
    pub fn validate(&self, token: &str) -> Result<AuthenticatedAccount, AuthRejection> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|_| AuthRejection::InvalidToken)?;

        let account_id = data
            .claims
            .sub
            .parse::<AccountId>()
            .map_err(|_| AuthRejection::InvalidToken)?;

        Ok(AuthenticatedAccount { account_id })
    }
}

/// Auth middleware state.
pub type AuthState = Arc<JwtValidator>;

/// Authentication middleware that validates Bearer tokens.
///
/// 1. Extracts the Bearer token from the Authorization header
/// 2. Validates it with `JwtValidator`
/// 3. On success, injects `AuthenticatedAccount` into request extensions
/// 4. On missing token, continues without injecting (handlers enforce
///    authentication via `RequireAccount`)
/// 5. On invalid token, returns 401 Unauthorized
pub async fn auth_middleware(
    State(validator): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    match token {
        Some(token) => match validator.validate(token) {
            Ok(account) => {
                request.extensions_mut().insert(account);
                next.run(request).await
            }
            Err(rejection) => rejection.into_response(),
        },
        None => next.run(request).await,
    }
}

/// Extractor that requires an authenticated account.
///
/// Returns 401 Unauthorized if the auth middleware did not establish an
/// identity for this request.
#[derive(Debug, Clone)]
pub struct RequireAccount(pub AuthenticatedAccount);

impl<S> axum::extract::FromRequestParts<S> for RequireAccount
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut axum::http::request::Parts,
        _state: &'life1 S,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            parts
                .extensions
                .get::<AuthenticatedAccount>()
                .cloned()
                .map(RequireAccount)
                .ok_or(AuthRejection::Unauthenticated)
        })
    }
}

/// Rejection type for authentication failures.
#[derive(Debug, Clone)]
pub enum AuthRejection {
    /// No valid authentication token was provided.
    Unauthenticated,
    /// A token was provided but failed validation.
    InvalidToken,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let (message, code) = match self {
            AuthRejection::Unauthenticated => ("Authentication required", "UNAUTHENTICATED"),
            AuthRejection::InvalidToken => ("Invalid token", "INVALID_TOKEN"),
        };

        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": message,
                "code": code
            })),
        )
            .into_response()
    }
}
