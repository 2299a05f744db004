// src/handlers/profile.rs

use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;
use validator::Validate;

use crate::{
    error::{AppError, AppJson, AppPath},
    models::{
        interaction::TransactionEntry,
        user::{ProfileResponse, PublicProfileResponse, UpdateProfileRequest},
    },
    state::AppState,
    utils::jwt::AuthUser,
};

/// The caller's own profile, including the completeness flag used for UI routing.
pub async fn get_profile(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .users
        .find_by_id(auth.id)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;
    let profile = state.users.profile(auth.id).await?;

    Ok(Json(ProfileResponse::new(&user, &profile)))
}

/// Partial update: absent fields are left untouched.
pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    AppJson(mut payload): AppJson<UpdateProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    payload.full_name = payload.full_name.map(|s| s.trim().to_string());
    payload.contact = payload.contact.map(|s| s.trim().to_string());

    let user = state
        .users
        .find_by_id(auth.id)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;
    let profile = state.users.update_profile(auth.id, payload).await?;

    Ok(Json(json!({
        "message": "Profile updated successfully",
        "profile": ProfileResponse::new(&user, &profile),
    })))
}

/// Anyone may view an activated user's public profile.
pub async fn public_profile(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .users
        .find_by_id(id)
        .await?
        .filter(|u| u.is_active)
        .ok_or(AppError::NotFound("User not found".to_string()))?;
    let profile = state.users.profile(user.id).await?;
    let active_listings = state.listings.count_active_listings(user.id).await?;

    Ok(Json(PublicProfileResponse {
        id: user.id,
        full_name: profile.full_name,
        profile_picture: profile.profile_picture,
        active_listings,
    }))
}

/// Orders the caller placed or received, newest first.
pub async fn transactions(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let items: Vec<TransactionEntry> = state
        .listings
        .orders_for_user(auth.id)
        .await?
        .into_iter()
        .map(|order| TransactionEntry::for_user(order, auth.id))
        .collect();

    Ok(Json(json!({ "items": items })))
}
