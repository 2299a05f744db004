// src/utils/jwt.rs

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{Config, TWO_FACTOR_CODE_TTL_SECS, TWO_FACTOR_MAX_RESENDS},
    error::AppError,
};

/// What a token may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Grants access to protected routes.
    Access,
    /// Exchanged for a new access token.
    Refresh,
    /// Issued after the password check; only valid on the 2FA routes.
    TwoFactor,
}

/// JWT Claims structure.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Claims {
    /// Subject - Stores the User ID (as string).
    pub sub: String,
    pub kind: TokenKind,
    /// Pending login this token belongs to (two-factor tokens only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<Uuid>,
    /// Expiration time as Unix timestamp.
    pub exp: usize,
}

impl Claims {
    pub fn user_id(&self) -> Result<i64, AppError> {
        self.sub
            .parse::<i64>()
            .map_err(|_| AppError::AuthError("Invalid token".to_string()))
    }
}

#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
}

/// A two-factor token outlives a single code so that resends can extend it.
pub const TWO_FACTOR_TOKEN_TTL_SECS: u64 =
    TWO_FACTOR_CODE_TTL_SECS as u64 * (TWO_FACTOR_MAX_RESENDS as u64 + 1);

/// Signs a new JWT for the user.
pub fn sign_jwt(
    id: i64,
    kind: TokenKind,
    attempt: Option<Uuid>,
    secret: &str,
    expiration_seconds: u64,
) -> Result<String, AppError> {
    // Calculate expiration: current time + expiration_seconds
    let expiration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .as_secs() as usize
        + expiration_seconds as usize;

    let claims = Claims {
        sub: id.to_string(),
        kind,
        attempt,
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Issues the access/refresh pair handed out after a completed login.
pub fn issue_token_pair(id: i64, config: &Config) -> Result<TokenPair, AppError> {
    Ok(TokenPair {
        access_token: sign_jwt(id, TokenKind::Access, None, &config.jwt_secret, config.jwt_expiration)?,
        refresh_token: sign_jwt(
            id,
            TokenKind::Refresh,
            None,
            &config.jwt_secret,
            config.refresh_expiration,
        )?,
        token_type: "Bearer",
    })
}

/// Verifies and decodes a JWT string.
///
/// Returns the `Claims` if valid, otherwise returns an `AppError`.
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthError("Invalid token".to_string()))?;

    Ok(token_data.claims)
}

fn bearer_claims(parts: &Parts, config: &Config, kind: TokenKind) -> Result<Claims, AppError> {
    let auth_header = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let token = match auth_header {
        Some(header) if header.starts_with("Bearer ") => &header[7..],
        _ => return Err(AppError::AuthError("Missing bearer token".to_string())),
    };

    let claims = verify_jwt(token, &config.jwt_secret)?;
    if claims.kind != kind {
        return Err(AppError::AuthError("Invalid token".to_string()));
    }
    Ok(claims)
}

/// Extractor: the authenticated caller, from an `Authorization: Bearer <access token>`.
/// Rejects with 401 when the header is missing, malformed, expired, or not an access token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Config: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = Config::from_ref(state);
        let claims = bearer_claims(parts, &config, TokenKind::Access)?;
        Ok(AuthUser {
            id: claims.user_id()?,
        })
    }
}

/// Extractor: a login waiting for its second factor, from a two-factor token.
#[derive(Debug, Clone)]
pub struct PendingLogin {
    pub user_id: i64,
    pub attempt_id: Uuid,
}

impl<S> FromRequestParts<S> for PendingLogin
where
    S: Send + Sync,
    Config: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = Config::from_ref(state);
        let claims = bearer_claims(parts, &config, TokenKind::TwoFactor)?;
        let attempt_id = claims.attempt.ok_or(AppError::NoPendingSession)?;
        Ok(PendingLogin {
            user_id: claims.user_id()?,
            attempt_id,
        })
    }
}
