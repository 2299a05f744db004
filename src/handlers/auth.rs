// src/handlers/auth.rs

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, AppJson, AppPath, LoginRejection},
    models::{
        two_factor::{PendingTwoFactor, ResendOutcome, TwoFactorOutcome, VerifyCodeRequest},
        user::{
            LoginRequest, NewAccount, PasswordResetConfirmRequest, PasswordResetRequest,
            RefreshRequest, RegisterRequest, User, normalize_email,
        },
    },
    state::AppState,
    store::StoreError,
    utils::{
        email::{Message, notify},
        hash::{hash_password_blocking, verify_dummy_password_blocking, verify_password_blocking},
        jwt::{
            PendingLogin, TWO_FACTOR_TOKEN_TTL_SECS, TokenKind, issue_token_pair, sign_jwt,
            verify_jwt,
        },
        otp::generate_code,
        token::{TokenPurpose, decode_uid, encode_uid},
    },
};

/// Registers a new, inactive account and emails a verification link.
///
/// The password confirmation is checked before any other field so a mismatch
/// is always reported as such.
pub async fn register(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.password != payload.confirm_password {
        return Err(AppError::PasswordMismatch);
    }
    payload.validate()?;

    let email = normalize_email(&payload.email);
    if state.users.find_by_email(&email).await?.is_some() {
        return Err(AppError::EmailTaken);
    }

    let password_hash = hash_password_blocking(payload.password).await?;

    let user = state
        .users
        .create_account(NewAccount {
            email,
            password_hash,
            full_name: payload.full_name.unwrap_or_default().trim().to_string(),
            contact: payload.contact.unwrap_or_default().trim().to_string(),
        })
        .await
        .map_err(|e| match e {
            // Lost a race with a concurrent registration.
            StoreError::Duplicate => AppError::EmailTaken,
            other => other.into(),
        })?;

    let token = state
        .tokens
        .make_token(&user, TokenPurpose::VerifyEmail, Utc::now());
    let link = format!(
        "{}/verify-email/{}/{}",
        state.config.public_base_url,
        encode_uid(user.id),
        token
    );
    notify(state.mailer.as_ref(), &user.email, Message::verify_email(&link)).await;

    tracing::info!(user_id = user.id, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User registered successfully. Check your email to verify your account."
        })),
    ))
}

/// Looks up the user behind a `{uid}/{token}` link and checks the token.
async fn user_for_link(
    state: &AppState,
    uid: &str,
    token: &str,
    purpose: TokenPurpose,
) -> Result<User, AppError> {
    let Some(id) = decode_uid(uid) else {
        return Err(AppError::InvalidToken);
    };
    let user = state
        .users
        .find_by_id(id)
        .await?
        .ok_or(AppError::InvalidToken)?;

    if !state.tokens.check_token(&user, purpose, token, Utc::now()) {
        return Err(AppError::InvalidToken);
    }
    Ok(user)
}

pub async fn verify_email(
    State(state): State<AppState>,
    AppPath((uid, token)): AppPath<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let user = user_for_link(&state, &uid, &token, TokenPurpose::VerifyEmail).await?;
    state.users.set_active(user.id, true).await?;

    tracing::info!(user_id = user.id, "Email verified");

    Ok(Json(json!({
        "message": "Email verified successfully. You can now log in."
    })))
}

/// First factor: email and password.
///
/// Unknown email, wrong password and an unverified account all come back as
/// `InvalidCredentials`; the reason is kept for logging only.
pub async fn check_credentials(
    state: &AppState,
    email: &str,
    password: &str,
) -> Result<User, AppError> {
    let Some(user) = state.users.find_by_email(&normalize_email(email)).await? else {
        verify_dummy_password_blocking(password.to_string()).await?;
        return Err(AppError::InvalidCredentials(LoginRejection::UnknownEmail));
    };

    let valid = verify_password_blocking(password.to_string(), user.password.clone()).await?;
    if !valid {
        tracing::info!(user_id = user.id, "Wrong password");
        return Err(AppError::InvalidCredentials(LoginRejection::WrongPassword));
    }
    if !user.is_active {
        tracing::info!(user_id = user.id, "Login attempt on unverified account");
        return Err(AppError::InvalidCredentials(LoginRejection::Inactive));
    }
    Ok(user)
}

/// Login step 1. Emails a one-time code and returns a two-factor token that
/// only the `/2fa` routes accept.
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let user = check_credentials(&state, &payload.email, &payload.password).await?;

    let attempt_id = Uuid::new_v4();
    let code = generate_code();
    state
        .two_factor
        .put(PendingTwoFactor::issue(user.id, attempt_id, code.clone(), Utc::now()))
        .await?;

    notify(state.mailer.as_ref(), &user.email, Message::login_code(&code)).await;

    let two_factor_token = sign_jwt(
        user.id,
        TokenKind::TwoFactor,
        Some(attempt_id),
        &state.config.jwt_secret,
        TWO_FACTOR_TOKEN_TTL_SECS,
    )?;

    Ok(Json(json!({
        "message": "2FA code sent to email",
        "two_factor_token": two_factor_token,
    })))
}

/// Login step 2. On success returns the access/refresh pair and whether the
/// profile still needs filling in.
pub async fn verify_2fa(
    State(state): State<AppState>,
    pending: PendingLogin,
    AppJson(payload): AppJson<VerifyCodeRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let outcome = state
        .two_factor
        .verify(
            pending.user_id,
            pending.attempt_id,
            payload.code.trim(),
            Utc::now(),
        )
        .await?;

    match outcome {
        TwoFactorOutcome::NoPending => return Err(AppError::NoPendingSession),
        TwoFactorOutcome::Expired => return Err(AppError::CodeExpired),
        TwoFactorOutcome::Locked => {
            tracing::warn!(user_id = pending.user_id, "2FA locked after too many attempts");
            return Err(AppError::TooManyAttempts);
        }
        TwoFactorOutcome::Mismatch => return Err(AppError::InvalidCode),
        TwoFactorOutcome::Verified => {}
    }

    let profile = state.users.profile(pending.user_id).await?;
    let tokens = issue_token_pair(pending.user_id, &state.config)?;

    tracing::info!(user_id = pending.user_id, "Login completed");

    Ok(Json(json!({
        "message": "Login successful",
        "profile_complete": profile.is_complete(),
        "access_token": tokens.access_token,
        "refresh_token": tokens.refresh_token,
        "token_type": tokens.token_type,
    })))
}

pub async fn resend_code(
    State(state): State<AppState>,
    pending: PendingLogin,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .users
        .find_by_id(pending.user_id)
        .await?
        .ok_or(AppError::NoPendingSession)?;

    let code = generate_code();
    let outcome = state
        .two_factor
        .resend(pending.user_id, pending.attempt_id, code.clone(), Utc::now())
        .await?;

    match outcome {
        ResendOutcome::NoPending => Err(AppError::NoPendingSession),
        ResendOutcome::Expired => Err(AppError::CodeExpired),
        ResendOutcome::Locked => Err(AppError::TooManyAttempts),
        ResendOutcome::LimitReached => Err(AppError::ResendLimitReached),
        ResendOutcome::Resent => {
            notify(state.mailer.as_ref(), &user.email, Message::resent_login_code(&code)).await;
            Ok(Json(json!({
                "message": "A new 2FA code has been sent to your email."
            })))
        }
    }
}

/// Always answers the same way, whether or not the email belongs to an account.
/// The mail is sent in the background.
pub async fn password_reset_request(
    State(state): State<AppState>,
    AppJson(payload): AppJson<PasswordResetRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let email = normalize_email(&payload.email);
    match state.users.find_by_email(&email).await? {
        Some(user) if user.is_active => {
            let token = state
                .tokens
                .make_token(&user, TokenPurpose::ResetPassword, Utc::now());
            let link = format!(
                "{}/password-reset-confirm/{}/{}",
                state.config.public_base_url,
                encode_uid(user.id),
                token
            );
            // Delivery happens off the request so the response time does not
            // depend on whether the account exists.
            let mailer = state.mailer.clone();
            let recipient = user.email.clone();
            tokio::spawn(async move {
                notify(mailer.as_ref(), &recipient, Message::reset_password(&link)).await;
            });
            tracing::info!(user_id = user.id, "Password reset requested");
        }
        _ => tracing::debug!("Password reset requested for unknown or inactive account"),
    }

    Ok(Json(json!({
        "message": "If an account with that email exists, a password reset link has been sent."
    })))
}

pub async fn password_reset_confirm(
    State(state): State<AppState>,
    AppPath((uid, token)): AppPath<(String, String)>,
    AppJson(payload): AppJson<PasswordResetConfirmRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = user_for_link(&state, &uid, &token, TokenPurpose::ResetPassword).await?;

    if payload.new_password != payload.confirm_password {
        return Err(AppError::PasswordMismatch);
    }
    payload.validate()?;

    // The new hash changes the token MAC input, so this link and every other
    // outstanding reset link stop working.
    let password_hash = hash_password_blocking(payload.new_password).await?;
    state.users.set_password(user.id, &password_hash).await?;

    tracing::info!(user_id = user.id, "Password reset");

    Ok(Json(json!({
        "message": "Password has been reset successfully."
    })))
}

/// Exchanges a refresh token for a fresh access token.
pub async fn refresh(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let claims = verify_jwt(&payload.refresh_token, &state.config.jwt_secret)?;
    if claims.kind != TokenKind::Refresh {
        return Err(AppError::AuthError("Invalid token".to_string()));
    }

    let user_id = claims.user_id()?;
    let user = state
        .users
        .find_by_id(user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or(AppError::AuthError("Invalid token".to_string()))?;

    let access_token = sign_jwt(
        user.id,
        TokenKind::Access,
        None,
        &state.config.jwt_secret,
        state.config.jwt_expiration,
    )?;

    Ok(Json(json!({
        "access_token": access_token,
        "token_type": "Bearer",
    })))
}
