// src/handlers/interaction.rs

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use validator::Validate;

use crate::{
    error::{AppError, AppJson, AppPath},
    handlers::listing::active_listing,
    models::interaction::{CreateOfferRequest, CreateReportRequest, CreateReviewRequest},
    state::AppState,
    store::StoreError,
    utils::{html::clean_html, jwt::AuthUser},
};

/// Flips the (caller, listing) wishlist entry.
pub async fn toggle_wishlist(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(id): AppPath<i64>,
) -> Result<impl IntoResponse, AppError> {
    active_listing(&state, id).await?;
    let wishlisted = state.listings.toggle_wishlist(auth.id, id).await?;

    Ok(Json(json!({
        "success": true,
        "wishlisted": wishlisted,
    })))
}

pub async fn list_wishlist(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let items = state.listings.wishlist(auth.id).await?;
    Ok(Json(json!({ "items": items })))
}

pub async fn report_listing(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(id): AppPath<i64>,
    AppJson(mut payload): AppJson<CreateReportRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.trim_fields();
    payload.validate()?;
    active_listing(&state, id).await?;

    let report = state
        .listings
        .add_report(
            id,
            auth.id,
            payload.reason,
            clean_html(payload.details.as_deref().unwrap_or_default()),
        )
        .await?;

    tracing::info!(listing_id = id, reporter_id = auth.id, reason = %report.reason, "Listing reported");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "report_id": report.id,
        })),
    ))
}

pub async fn review_listing(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(id): AppPath<i64>,
    AppJson(payload): AppJson<CreateReviewRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    active_listing(&state, id).await?;

    let review = state
        .listings
        .add_review(
            id,
            auth.id,
            payload.rating,
            clean_html(payload.comment.as_deref().unwrap_or_default()),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "review_id": review.id,
        })),
    ))
}

/// Places an order at the listing's current price and reserves the listing.
/// A listing that is no longer available answers 409; sellers cannot order
/// their own listings.
pub async fn order_listing(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(id): AppPath<i64>,
) -> Result<impl IntoResponse, AppError> {
    let listing = active_listing(&state, id).await?;
    if listing.seller_id == auth.id {
        return Err(AppError::Forbidden(
            "You cannot order your own listing".to_string(),
        ));
    }

    let order = state
        .listings
        .place_order(id, auth.id)
        .await
        .map_err(|e| match e {
            StoreError::NotFound => AppError::NotFound("Listing not found".to_string()),
            other => other.into(),
        })?;

    tracing::info!(
        order_id = order.id,
        listing_id = id,
        buyer_id = auth.id,
        seller_id = order.seller_id,
        "Order placed"
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Order request placed",
            "order_id": order.id,
        })),
    ))
}

pub async fn offer_listing(
    State(state): State<AppState>,
    auth: AuthUser,
    AppPath(id): AppPath<i64>,
    AppJson(payload): AppJson<CreateOfferRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    active_listing(&state, id).await?;

    let offer = state
        .listings
        .add_offer(
            id,
            auth.id,
            payload.amount.round_dp(2),
            clean_html(payload.message.as_deref().unwrap_or_default()),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Offer sent to seller",
            "offer_id": offer.id,
        })),
    ))
}
