//! Session token validation for the upgrade boundary.
//!
//! Tokens are issued elsewhere; this module only checks them. They are read
//! from the `chirm_token` cookie, then an `Authorization: Bearer` header,
//! then a `token` query parameter.

use axum::http::{header, HeaderMap, Uri};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Cookie carrying the session token.
pub const TOKEN_COOKIE: &str = "chirm_token";

/// Authentication errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// No token was presented.
    #[error("unauthorized")]
    MissingToken,
    /// The token failed signature or expiry checks.
    #[error("invalid token")]
    InvalidToken,
}

/// Claims carried by a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub is_owner: bool,
    pub exp: u64,
    pub iat: u64,
}

/// Validates a raw token and returns its claims.
pub trait TokenValidator: Send + Sync {
    fn validate(&self, token: &str) -> Result<Claims, AuthError>;
}

/// HS256 JWT validator.
pub struct JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp"]);
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

impl TokenValidator for JwtValidator {
    fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "Token verification failed");
            AuthError::InvalidToken
        })?;
        if data.claims.user_id.is_empty() {
            return Err(AuthError::InvalidToken);
        }
        Ok(data.claims)
    }
}

/// Find the session token on a request.
pub fn extract_token(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    cookie_token(headers)
        .or_else(|| bearer_token(headers))
        .or_else(|| query_token(uri))
        .filter(|t| !t.is_empty())
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == TOKEN_COOKIE)
        .map(|(_, value)| value.to_string())
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
}

fn query_token(uri: &Uri) -> Option<String> {
    uri.query()?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| *name == "token")
        .map(|(_, value)| value.to_string())
}

/// Validate the request's token with `validator`.
pub fn authenticate(
    validator: &dyn TokenValidator,
    headers: &HeaderMap,
    uri: &Uri,
) -> Result<Claims, AuthError> {
    let token = extract_token(headers, uri).ok_or(AuthError::MissingToken)?;
    validator.validate(&token)
}
