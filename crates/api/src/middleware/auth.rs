//! JWT authentication and internal-caller extractors.
//!
//! Provides JWT encoding/decoding plus an `AuthUser` Axum extractor that
//! validates the Authorization header on customer routes, and an
//! `InternalCaller` extractor guarding the notification queue routes.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use ecomm_common::error::AppError;
use ecomm_common::types::{Actor, INTERNAL_TOKEN_HEADER};

use crate::state::AppState;

/// JWT claims stored in the token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject: the user's numeric ID
    pub sub: String,
    /// Recipient address for the user's order notifications
    pub email: String,
    #[serde(default)]
    pub is_admin: bool,
    /// Expiration time (UNIX timestamp)
    pub exp: i64,
    /// Issued at (UNIX timestamp)
    pub iat: i64,
}

/// Authenticated user extracted from JWT token.
///
/// Use as an Axum extractor on protected routes:
/// ```ignore
/// async fn handler(auth: AuthUser) -> impl IntoResponse {
///     // auth.user_id is the authenticated user's ID
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub email: String,
    pub is_admin: bool,
    pub claims: Claims,
}

impl AuthUser {
    /// The identity order operations run as.
    pub fn actor(&self) -> Actor {
        Actor {
            user_id: self.user_id,
            email: self.email.clone(),
        }
    }

    /// Read access: owners and admins.
    pub fn can_view(&self, owner_id: i64) -> bool {
        self.is_admin || self.user_id == owner_id
    }
}

/// Encode a JWT token for a user.
pub fn encode_jwt(
    user_id: i64,
    email: &str,
    is_admin: bool,
    secret: &str,
    expiry_hours: u64,
) -> Result<String, AppError> {
    let now = Utc::now();
    let exp = now + Duration::hours(expiry_hours as i64);

    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        is_admin,
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Auth(format!("Failed to encode JWT: {}", e)))?;

    Ok(token)
}

/// Decode and validate a JWT token.
pub fn decode_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| AppError::Auth(format!("Invalid token: {}", e)))?;

    Ok(token_data.claims)
}

/// Extracts and validates the JWT from the `Authorization: Bearer <token>` header.
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let secret = state.config.jwt_secret.clone();

        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        async move {
            let token = auth_header
                .as_deref()
                .and_then(|auth| auth.strip_prefix("Bearer "))
                .ok_or_else(|| {
                    AppError::Auth(
                        "Missing or invalid Authorization header. Use 'Bearer <JWT>'".to_string(),
                    )
                })?;

            let claims = decode_jwt(token, &secret)?;
            let user_id = claims
                .sub
                .parse::<i64>()
                .map_err(|_| AppError::Auth("Invalid user ID in token".to_string()))?;
            if claims.email.trim().is_empty() {
                return Err(AppError::Auth("Token carries no email".to_string()));
            }

            Ok(AuthUser {
                user_id,
                email: claims.email.clone(),
                is_admin: claims.is_admin,
                claims,
            })
        }
    }
}

/// A trusted service calling the `/internal` queue routes.
///
/// Requires `X-Internal-Token` to match the configured token. With no token
/// configured every request is refused.
#[derive(Debug, Clone, Copy)]
pub struct InternalCaller;

impl FromRequestParts<AppState> for InternalCaller {
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let expected = state.config.internal_api_token.clone();
        let provided = parts
            .headers
            .get(INTERNAL_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        async move {
            let Some(expected) = expected else {
                return Err(AppError::Forbidden(
                    "Internal routes are disabled".to_string(),
                ));
            };

            match provided {
                Some(token) if tokens_match(&token, &expected) => Ok(InternalCaller),
                Some(_) => Err(AppError::Auth("Invalid internal token".to_string())),
                None => Err(AppError::Auth(
                    "Missing X-Internal-Token header".to_string(),
                )),
            }
        }
    }
}

/// Compare without short-circuiting on the first differing byte.
fn tokens_match(provided: &str, expected: &str) -> bool {
    let (a, b) = (provided.as_bytes(), expected.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
