// src/handlers/listing.rs

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde_json::json;
use validator::Validate;

use crate::{
    config::RELATED_LISTINGS_LIMIT,
    error::{AppError, AppJson, AppPath, AppQuery},
    models::listing::{
        CreateListingRequest, Listing, ListingFilter, ListingQuery, ListingStatus, NewListing,
        UpdateListingRequest, UpdateStatusRequest,
    },
    state::AppState,
    utils::{html::clean_html, jwt::AuthUser},
};

/// Header carrying the caller's campus; scopes search and is stamped onto new listings.
pub const CAMPUS_HEADER: &str = "x-campus";

const MAX_CAMPUS_LEN: usize = 100;

fn campus_from(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CAMPUS_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Loads a listing that has not been soft-deleted.
pub(crate) async fn active_listing(state: &AppState, id: i64) -> Result<Listing, AppError> {
    state
        .listings
        .find_listing(id)
        .await?
        .filter(|l| l.is_active)
        .ok_or(AppError::NotFound("Listing not found".to_string()))
}

/// Loads an active listing and checks the caller owns it.
async fn owned_listing(state: &AppState, id: i64, user_id: i64) -> Result<Listing, AppError> {
    let listing = active_listing(state, id).await?;
    if listing.seller_id != user_id {
        tracing::info!(listing_id = id, user_id, "Rejected change to listing by non-owner");
        return Err(AppError::Forbidden("You do not own this listing".to_string()));
    }
    Ok(listing)
}

/// Search listings.
/// Only active, available listings are returned, newest first.
pub async fn list_listings(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppQuery(query): AppQuery<ListingQuery>,
) -> Result<impl IntoResponse, AppError> {
    let filter = ListingFilter::from_query(query, campus_from(&headers));
    let items = state.listings.search(&filter).await?;

    Ok(Json(json!({
        "items": items,
        "limit": filter.limit,
        "offset": filter.offset,
    })))
}

/// Create a listing owned by the caller.
pub async fn create_listing(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    AppJson(mut payload): AppJson<CreateListingRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.trim_fields();
    payload.validate()?;

    let campus = campus_from(&headers).unwrap_or_default();
    if campus.chars().count() > MAX_CAMPUS_LEN {
        return Err(AppError::BadRequest(format!(
            "Campus must be at most {MAX_CAMPUS_LEN} characters"
        )));
    }

    let listing = state
        .listings
        .create_listing(NewListing {
            seller_id: auth.id,
            title: payload.title,
            description: clean_html(&payload.description),
            price: payload.price.round_dp(2),
            category: payload.category,
            condition: payload.condition,
            listing_type: payload.listing_type,
            campus,
            image_urls: payload.image_urls,
        })
        .await?;

    tracing::info!(listing_id = listing.id, seller_id = auth.id, "Listing created");

    Ok((StatusCode::CREATED, Json(listing)))
}

pub async fn get_listing(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(active_listing(&state, id).await?))
}

/// Owner-only partial update.
pub async fn update_listing(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(id): AppPath<i64>,
    AppJson(mut payload): AppJson<UpdateListingRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.trim_fields();
    payload.validate()?;
    if payload.is_empty() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }

    owned_listing(&state, id, auth.id).await?;

    payload.description = payload.description.as_deref().map(clean_html);
    payload.price = payload.price.map(|p| p.round_dp(2));

    let listing = state.listings.update_listing(id, payload).await?;
    Ok(Json(listing))
}

/// Owner-only soft delete. Orders and reviews keep referencing the row.
pub async fn delete_listing(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(id): AppPath<i64>,
) -> Result<impl IntoResponse, AppError> {
    owned_listing(&state, id, auth.id).await?;
    state.listings.deactivate_listing(id).await?;

    tracing::info!(listing_id = id, "Listing deactivated");

    Ok(StatusCode::NO_CONTENT)
}

pub async fn related_listings(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<impl IntoResponse, AppError> {
    let listing = active_listing(&state, id).await?;
    let items = state
        .listings
        .related(&listing, RELATED_LISTINGS_LIMIT)
        .await?;

    Ok(Json(json!({ "items": items })))
}

/// Owner-only status change. Any listed status may follow any other.
pub async fn update_status(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(id): AppPath<i64>,
    AppJson(payload): AppJson<UpdateStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    owned_listing(&state, id, auth.id).await?;

    let status: ListingStatus = payload.status.trim().parse().map_err(|_| {
        let allowed: Vec<&str> = ListingStatus::ALL.iter().map(|s| s.as_str()).collect();
        AppError::BadRequest(format!("Invalid status. Choose from: {}", allowed.join(", ")))
    })?;

    let listing = state.listings.set_status(id, status).await?;

    Ok(Json(json!({
        "success": true,
        "status": listing.status,
    })))
}
