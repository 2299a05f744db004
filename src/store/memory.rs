// src/store/memory.rs

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ListingStore, StoreError, TwoFactorStore, UserStore};
use crate::models::{
    interaction::{Offer, Order, Report, Review},
    listing::{
        Listing, ListingFilter, ListingImage, ListingStatus, NewListing, UpdateListingRequest,
    },
    two_factor::{Disposition, PendingTwoFactor, ResendOutcome, TwoFactorOutcome},
    user::{NewAccount, Profile, UpdateProfileRequest, User},
};

#[derive(Default)]
struct UserData {
    next_id: i64,
    users: BTreeMap<i64, User>,
    profiles: HashMap<i64, Profile>,
}

/// `UserStore` over in-process maps.
#[derive(Default)]
pub struct MemoryUserStore {
    inner: Mutex<UserData>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create_account(&self, account: NewAccount) -> Result<User, StoreError> {
        let mut data = self.inner.lock().await;
        if data.users.values().any(|u| u.email == account.email) {
            return Err(StoreError::Duplicate);
        }
        data.next_id += 1;
        let user = User {
            id: data.next_id,
            email: account.email,
            password: account.password_hash,
            is_active: false,
            created_at: Some(Utc::now()),
        };
        data.profiles.insert(
            user.id,
            Profile {
                user_id: user.id,
                full_name: account.full_name,
                contact: account.contact,
                profile_picture: String::new(),
            },
        );
        data.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let data = self.inner.lock().await;
        Ok(data.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.inner.lock().await.users.get(&id).cloned())
    }

    async fn set_active(&self, id: i64, active: bool) -> Result<(), StoreError> {
        let mut data = self.inner.lock().await;
        let user = data.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        user.is_active = active;
        Ok(())
    }

    async fn set_password(&self, id: i64, password_hash: &str) -> Result<(), StoreError> {
        let mut data = self.inner.lock().await;
        let user = data.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        user.password = password_hash.to_string();
        Ok(())
    }

    async fn profile(&self, user_id: i64) -> Result<Profile, StoreError> {
        let data = self.inner.lock().await;
        data.profiles.get(&user_id).cloned().ok_or(StoreError::NotFound)
    }

    async fn update_profile(
        &self,
        user_id: i64,
        update: UpdateProfileRequest,
    ) -> Result<Profile, StoreError> {
        let mut data = self.inner.lock().await;
        let profile = data.profiles.get_mut(&user_id).ok_or(StoreError::NotFound)?;
        if let Some(full_name) = update.full_name {
            profile.full_name = full_name;
        }
        if let Some(contact) = update.contact {
            profile.contact = contact;
        }
        if let Some(picture) = update.profile_picture {
            profile.profile_picture = picture;
        }
        Ok(profile.clone())
    }
}

#[derive(Default)]
struct ListingData {
    next_listing_id: i64,
    next_image_id: i64,
    next_row_id: i64,
    listings: BTreeMap<i64, Listing>,
    /// (user, listing) -> insertion sequence
    wishlist: HashMap<(i64, i64), i64>,
    reviews: Vec<Review>,
    reports: Vec<Report>,
    offers: Vec<Offer>,
    orders: Vec<Order>,
}

impl ListingData {
    fn next_row(&mut self) -> i64 {
        self.next_row_id += 1;
        self.next_row_id
    }

    fn images_for(&mut self, listing_id: i64, urls: Vec<String>) -> Vec<ListingImage> {
        urls.into_iter()
            .enumerate()
            .map(|(position, url)| {
                self.next_image_id += 1;
                ListingImage {
                    id: self.next_image_id,
                    listing_id,
                    url,
                    is_primary: position == 0,
                    position: position as i32,
                }
            })
            .collect()
    }

    fn active_mut(&mut self, id: i64) -> Result<&mut Listing, StoreError> {
        self.listings
            .get_mut(&id)
            .filter(|l| l.is_active)
            .ok_or(StoreError::NotFound)
    }
}

fn newest_first(a: &Listing, b: &Listing) -> std::cmp::Ordering {
    b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))
}

/// `ListingStore` over in-process maps. One lock guards every table, which
/// makes `place_order` trivially atomic.
#[derive(Default)]
pub struct MemoryListingStore {
    inner: Mutex<ListingData>,
}

impl MemoryListingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ListingStore for MemoryListingStore {
    async fn create_listing(&self, listing: NewListing) -> Result<Listing, StoreError> {
        let mut data = self.inner.lock().await;
        data.next_listing_id += 1;
        let id = data.next_listing_id;
        let images = data.images_for(id, listing.image_urls);
        let now = Utc::now();
        let created = Listing {
            id,
            seller_id: listing.seller_id,
            title: listing.title,
            description: listing.description,
            price: listing.price,
            category: listing.category,
            condition: listing.condition,
            listing_type: listing.listing_type,
            status: ListingStatus::Available,
            campus: listing.campus,
            is_active: true,
            images,
            created_at: now,
            updated_at: now,
        };
        data.listings.insert(id, created.clone());
        Ok(created)
    }

    async fn find_listing(&self, id: i64) -> Result<Option<Listing>, StoreError> {
        Ok(self.inner.lock().await.listings.get(&id).cloned())
    }

    async fn search(&self, filter: &ListingFilter) -> Result<Vec<Listing>, StoreError> {
        let data = self.inner.lock().await;
        let mut found: Vec<Listing> = data
            .listings
            .values()
            .filter(|l| filter.matches(l))
            .cloned()
            .collect();
        found.sort_by(newest_first);
        Ok(found
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .collect())
    }

    async fn related(&self, listing: &Listing, limit: i64) -> Result<Vec<Listing>, StoreError> {
        let data = self.inner.lock().await;
        Ok(data
            .listings
            .values()
            .filter(|l| l.id != listing.id && l.category == listing.category && l.is_visible())
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn update_listing(
        &self,
        id: i64,
        changes: UpdateListingRequest,
    ) -> Result<Listing, StoreError> {
        let mut data = self.inner.lock().await;
        let images = changes.image_urls.map(|urls| data.images_for(id, urls));
        let listing = data.active_mut(id)?;
        if let Some(title) = changes.title {
            listing.title = title;
        }
        if let Some(description) = changes.description {
            listing.description = description;
        }
        if let Some(price) = changes.price {
            listing.price = price;
        }
        if let Some(category) = changes.category {
            listing.category = category;
        }
        if let Some(condition) = changes.condition {
            listing.condition = condition;
        }
        if let Some(listing_type) = changes.listing_type {
            listing.listing_type = listing_type;
        }
        if let Some(images) = images {
            listing.images = images;
        }
        listing.updated_at = Utc::now();
        Ok(listing.clone())
    }

    async fn deactivate_listing(&self, id: i64) -> Result<(), StoreError> {
        let mut data = self.inner.lock().await;
        let listing = data.active_mut(id)?;
        listing.is_active = false;
        listing.updated_at = Utc::now();
        Ok(())
    }

    async fn set_status(&self, id: i64, status: ListingStatus) -> Result<Listing, StoreError> {
        let mut data = self.inner.lock().await;
        let listing = data.active_mut(id)?;
        listing.status = status;
        listing.updated_at = Utc::now();
        Ok(listing.clone())
    }

    async fn count_active_listings(&self, seller_id: i64) -> Result<i64, StoreError> {
        let data = self.inner.lock().await;
        Ok(data
            .listings
            .values()
            .filter(|l| l.seller_id == seller_id && l.is_active)
            .count() as i64)
    }

    async fn toggle_wishlist(&self, user_id: i64, listing_id: i64) -> Result<bool, StoreError> {
        let mut data = self.inner.lock().await;
        if data.wishlist.remove(&(user_id, listing_id)).is_some() {
            return Ok(false);
        }
        let seq = data.next_row();
        data.wishlist.insert((user_id, listing_id), seq);
        Ok(true)
    }

    async fn wishlist(&self, user_id: i64) -> Result<Vec<Listing>, StoreError> {
        let data = self.inner.lock().await;
        let mut saved: Vec<(i64, &Listing)> = data
            .wishlist
            .iter()
            .filter(|((user, _), _)| *user == user_id)
            .filter_map(|((_, listing_id), seq)| {
                data.listings
                    .get(listing_id)
                    .filter(|l| l.is_active)
                    .map(|l| (*seq, l))
            })
            .collect();
        saved.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(saved.into_iter().map(|(_, l)| l.clone()).collect())
    }

    async fn add_review(
        &self,
        listing_id: i64,
        reviewer_id: i64,
        rating: i16,
        comment: String,
    ) -> Result<Review, StoreError> {
        let mut data = self.inner.lock().await;
        let review = Review {
            id: data.next_row(),
            listing_id,
            reviewer_id,
            rating,
            comment,
            created_at: Utc::now(),
        };
        data.reviews.push(review.clone());
        Ok(review)
    }

    async fn add_report(
        &self,
        listing_id: i64,
        reporter_id: i64,
        reason: String,
        details: String,
    ) -> Result<Report, StoreError> {
        let mut data = self.inner.lock().await;
        let report = Report {
            id: data.next_row(),
            listing_id,
            reporter_id,
            reason,
            details,
            created_at: Utc::now(),
        };
        data.reports.push(report.clone());
        Ok(report)
    }

    async fn add_offer(
        &self,
        listing_id: i64,
        buyer_id: i64,
        amount: Decimal,
        message: String,
    ) -> Result<Offer, StoreError> {
        let mut data = self.inner.lock().await;
        let offer = Offer {
            id: data.next_row(),
            listing_id,
            buyer_id,
            amount,
            message,
            created_at: Utc::now(),
        };
        data.offers.push(offer.clone());
        Ok(offer)
    }

    async fn place_order(&self, listing_id: i64, buyer_id: i64) -> Result<Order, StoreError> {
        let mut data = self.inner.lock().await;
        let id = data.next_row();
        let listing = data.active_mut(listing_id)?;
        if listing.status != ListingStatus::Available {
            return Err(StoreError::Conflict(format!(
                "Listing is {} and cannot be ordered",
                listing.status
            )));
        }
        listing.status = ListingStatus::Reserved;
        listing.updated_at = Utc::now();
        let order = Order {
            id,
            listing_id,
            buyer_id,
            seller_id: listing.seller_id,
            amount: listing.price,
            created_at: Utc::now(),
        };
        data.orders.push(order.clone());
        Ok(order)
    }

    async fn orders_for_user(&self, user_id: i64) -> Result<Vec<Order>, StoreError> {
        let data = self.inner.lock().await;
        let mut orders: Vec<Order> = data
            .orders
            .iter()
            .filter(|o| o.buyer_id == user_id || o.seller_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders)
    }
}

/// `TwoFactorStore` over an in-process map keyed by user id.
#[derive(Default)]
pub struct MemoryTwoFactorStore {
    entries: Mutex<HashMap<i64, PendingTwoFactor>>,
}

impl MemoryTwoFactorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TwoFactorStore for MemoryTwoFactorStore {
    async fn put(&self, pending: PendingTwoFactor) -> Result<(), StoreError> {
        self.entries.lock().await.insert(pending.user_id, pending);
        Ok(())
    }

    async fn get(&self, user_id: i64) -> Result<Option<PendingTwoFactor>, StoreError> {
        Ok(self.entries.lock().await.get(&user_id).cloned())
    }

    async fn verify(
        &self,
        user_id: i64,
        attempt_id: Uuid,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<TwoFactorOutcome, StoreError> {
        let mut entries = self.entries.lock().await;
        let Some(pending) = entries
            .get_mut(&user_id)
            .filter(|p| p.attempt_id == attempt_id)
        else {
            return Ok(TwoFactorOutcome::NoPending);
        };
        let (outcome, disposition) = pending.check(code, now);
        if disposition == Disposition::Remove {
            entries.remove(&user_id);
        }
        Ok(outcome)
    }

    async fn resend(
        &self,
        user_id: i64,
        attempt_id: Uuid,
        code: String,
        now: DateTime<Utc>,
    ) -> Result<ResendOutcome, StoreError> {
        let mut entries = self.entries.lock().await;
        let Some(pending) = entries
            .get_mut(&user_id)
            .filter(|p| p.attempt_id == attempt_id)
        else {
            return Ok(ResendOutcome::NoPending);
        };
        let (outcome, disposition) = pending.rotate(code, now);
        if disposition == Disposition::Remove {
            entries.remove(&user_id);
        }
        Ok(outcome)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, p| !p.is_expired(now));
        Ok((before - entries.len()) as u64)
    }
}
