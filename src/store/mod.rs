// src/store/mod.rs
//
// Persistence ports. Handlers only see these traits; `postgres` backs them with
// sqlx, `memory` with in-process maps for tests and local runs.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    interaction::{Offer, Order, Report, Review},
    listing::{Listing, ListingFilter, ListingStatus, NewListing, UpdateListingRequest},
    two_factor::{PendingTwoFactor, ResendOutcome, TwoFactorOutcome},
    user::{NewAccount, Profile, UpdateProfileRequest, User},
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique constraint was violated.
    #[error("record already exists")]
    Duplicate,
    #[error("record not found")]
    NotFound,
    /// The row exists but is in a state that forbids the operation.
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            // Postgres error code for unique violation is 23505
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                StoreError::Duplicate
            }
            _ => StoreError::Unavailable(err.to_string()),
        }
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Creates an inactive user and its profile atomically.
    /// Fails with `Duplicate` when the email is taken.
    async fn create_account(&self, account: NewAccount) -> Result<User, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError>;

    async fn set_active(&self, id: i64, active: bool) -> Result<(), StoreError>;

    async fn set_password(&self, id: i64, password_hash: &str) -> Result<(), StoreError>;

    async fn profile(&self, user_id: i64) -> Result<Profile, StoreError>;

    async fn update_profile(
        &self,
        user_id: i64,
        update: UpdateProfileRequest,
    ) -> Result<Profile, StoreError>;
}

#[async_trait]
pub trait ListingStore: Send + Sync {
    async fn create_listing(&self, listing: NewListing) -> Result<Listing, StoreError>;

    /// Looks a listing up by id, soft-deleted ones included.
    async fn find_listing(&self, id: i64) -> Result<Option<Listing>, StoreError>;

    /// Active, available listings matching the filter, newest first.
    async fn search(&self, filter: &ListingFilter) -> Result<Vec<Listing>, StoreError>;

    /// Up to `limit` other visible listings in the same category, by ascending id.
    async fn related(&self, listing: &Listing, limit: i64) -> Result<Vec<Listing>, StoreError>;

    async fn update_listing(
        &self,
        id: i64,
        changes: UpdateListingRequest,
    ) -> Result<Listing, StoreError>;

    async fn deactivate_listing(&self, id: i64) -> Result<(), StoreError>;

    async fn set_status(&self, id: i64, status: ListingStatus) -> Result<Listing, StoreError>;

    async fn count_active_listings(&self, seller_id: i64) -> Result<i64, StoreError>;

    /// Adds the pair when absent, removes it when present.
    /// Returns whether the listing is wishlisted afterwards.
    async fn toggle_wishlist(&self, user_id: i64, listing_id: i64) -> Result<bool, StoreError>;

    /// Active listings on the user's wishlist, most recently saved first.
    async fn wishlist(&self, user_id: i64) -> Result<Vec<Listing>, StoreError>;

    async fn add_review(
        &self,
        listing_id: i64,
        reviewer_id: i64,
        rating: i16,
        comment: String,
    ) -> Result<Review, StoreError>;

    async fn add_report(
        &self,
        listing_id: i64,
        reporter_id: i64,
        reason: String,
        details: String,
    ) -> Result<Report, StoreError>;

    async fn add_offer(
        &self,
        listing_id: i64,
        buyer_id: i64,
        amount: rust_decimal::Decimal,
        message: String,
    ) -> Result<Offer, StoreError>;

    /// Moves an available listing to reserved and records the order, as one
    /// atomic step. `Conflict` when the listing is no longer available,
    /// `NotFound` when it does not exist or was deleted.
    async fn place_order(&self, listing_id: i64, buyer_id: i64) -> Result<Order, StoreError>;

    /// Orders where the user is buyer or seller, newest first.
    async fn orders_for_user(&self, user_id: i64) -> Result<Vec<Order>, StoreError>;
}

#[async_trait]
pub trait TwoFactorStore: Send + Sync {
    /// Stores a pending login, replacing any previous one for the same user.
    async fn put(&self, pending: PendingTwoFactor) -> Result<(), StoreError>;

    async fn get(&self, user_id: i64) -> Result<Option<PendingTwoFactor>, StoreError>;

    /// Checks a submitted code and applies the outcome atomically.
    async fn verify(
        &self,
        user_id: i64,
        attempt_id: Uuid,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<TwoFactorOutcome, StoreError>;

    /// Replaces the code of a pending login, within the resend limit.
    async fn resend(
        &self,
        user_id: i64,
        attempt_id: Uuid,
        code: String,
        now: DateTime<Utc>,
    ) -> Result<ResendOutcome, StoreError>;

    /// Drops every expired entry. Returns how many were removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Periodically drops expired pending logins so abandoned ones do not pile up.
pub fn spawn_two_factor_reaper(
    store: std::sync::Arc<dyn TwoFactorStore>,
    every: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match store.purge_expired(Utc::now()).await {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "Purged expired two-factor codes"),
                Err(e) => tracing::warn!(error = %e, "Failed to purge expired two-factor codes"),
            }
        }
    })
}
