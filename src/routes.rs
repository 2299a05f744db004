// src/routes.rs

use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    routing::{get, patch, post},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{auth, interaction, listing, profile},
    state::AppState,
};

/// Assembles the main application router.
///
/// * Auth flow (register, verify, two-step login, password reset, refresh).
/// * Profiles, listings and listing interactions.
/// * Global Trace and CORS layers.
///
/// Authentication is enforced per handler by the `AuthUser` / `PendingLogin`
/// extractors, so public and protected methods can share a path.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(cors_origin(&state.config.public_base_url))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(listing::CAMPUS_HEADER),
        ]);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/verify-email/{uid}/{token}", get(auth::verify_email))
        .route("/login", post(auth::login))
        .route("/2fa", post(auth::verify_2fa))
        .route("/2fa/resend", post(auth::resend_code))
        .route("/password-reset", post(auth::password_reset_request))
        .route(
            "/password-reset-confirm/{uid}/{token}",
            post(auth::password_reset_confirm),
        )
        .route("/token/refresh", post(auth::refresh));

    let profile_routes = Router::new()
        .route(
            "/profile",
            get(profile::get_profile).put(profile::update_profile),
        )
        .route("/profile/transactions", get(profile::transactions))
        .route("/users/{id}", get(profile::public_profile))
        .route("/wishlist", get(interaction::list_wishlist));

    let listing_routes = Router::new()
        .route(
            "/listings",
            get(listing::list_listings).post(listing::create_listing),
        )
        .route(
            "/listings/{id}",
            get(listing::get_listing)
                .patch(listing::update_listing)
                .delete(listing::delete_listing),
        )
        .route("/listings/{id}/related", get(listing::related_listings))
        .route("/listings/{id}/status", patch(listing::update_status))
        .route("/listings/{id}/wishlist", post(interaction::toggle_wishlist))
        .route("/listings/{id}/report", post(interaction::report_listing))
        .route("/listings/{id}/review", post(interaction::review_listing))
        .route("/listings/{id}/order", post(interaction::order_listing))
        .route("/listings/{id}/offer", post(interaction::offer_listing));

    Router::new()
        .merge(auth_routes)
        .merge(profile_routes)
        .merge(listing_routes)
        // Global Middleware (applied from outside in)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

fn cors_origin(base_url: &str) -> HeaderValue {
    url::Url::parse(base_url)
        .ok()
        .and_then(|u| HeaderValue::from_str(&u.origin().ascii_serialization()).ok())
        .unwrap_or_else(|| HeaderValue::from_static("http://localhost:3000"))
}
