// src/store/postgres.rs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgExecutor, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{ListingStore, StoreError, TwoFactorStore, UserStore};
use crate::{
    config::TWO_FACTOR_CODE_TTL_SECS,
    models::{
        interaction::{Offer, Order, Report, Review},
        listing::{
            Listing, ListingFilter, ListingImage, ListingRow, ListingStatus, NewListing,
            UpdateListingRequest,
        },
        two_factor::{Disposition, PendingTwoFactor, ResendOutcome, TwoFactorOutcome},
        user::{NewAccount, Profile, UpdateProfileRequest, User},
    },
};

const USER_COLUMNS: &str = "id, email, password, is_active, created_at";

/// Listing columns; queries alias `listings` as `l`.
const LISTING_COLUMNS: &str = "l.id, l.seller_id, l.title, l.description, l.price, l.category, \
     l.condition, l.listing_type, l.status, l.campus, l.is_active, l.created_at, l.updated_at";

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create_account(&self, account: NewAccount) -> Result<User, StoreError> {
        let mut tx = self.pool.begin().await?;

        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (email, password, is_active) VALUES ($1, $2, FALSE) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&account.email)
        .bind(&account.password_hash)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO profiles (user_id, full_name, contact, profile_picture) \
             VALUES ($1, $2, $3, '')",
        )
        .bind(user.id)
        .bind(&account.full_name)
        .bind(&account.contact)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn set_active(&self, id: i64, active: bool) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET is_active = $2 WHERE id = $1")
            .bind(id)
            .bind(active)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn set_password(&self, id: i64, password_hash: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET password = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn profile(&self, user_id: i64) -> Result<Profile, StoreError> {
        let profile = sqlx::query_as::<_, Profile>(
            "SELECT user_id, full_name, contact, profile_picture FROM profiles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn update_profile(
        &self,
        user_id: i64,
        update: UpdateProfileRequest,
    ) -> Result<Profile, StoreError> {
        let profile = sqlx::query_as::<_, Profile>(
            r#"
            UPDATE profiles SET
                full_name = COALESCE($2, full_name),
                contact = COALESCE($3, contact),
                profile_picture = COALESCE($4, profile_picture)
            WHERE user_id = $1
            RETURNING user_id, full_name, contact, profile_picture
            "#,
        )
        .bind(user_id)
        .bind(update.full_name)
        .bind(update.contact)
        .bind(update.profile_picture)
        .fetch_one(&self.pool)
        .await?;
        Ok(profile)
    }
}

#[derive(Clone)]
pub struct PgListingStore {
    pool: PgPool,
}

impl PgListingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attaches images to raw rows, keeping row order.
    async fn hydrate<'e, E>(executor: E, rows: Vec<ListingRow>) -> Result<Vec<Listing>, StoreError>
    where
        E: PgExecutor<'e>,
    {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let images = sqlx::query_as::<_, ListingImage>(
            "SELECT id, listing_id, url, is_primary, position FROM listing_images \
             WHERE listing_id = ANY($1) ORDER BY listing_id, position",
        )
        .bind(&ids)
        .fetch_all(executor)
        .await?;

        let mut by_listing: HashMap<i64, Vec<ListingImage>> = HashMap::new();
        for image in images {
            by_listing.entry(image.listing_id).or_default().push(image);
        }

        rows.into_iter()
            .map(|row| {
                let images = by_listing.remove(&row.id).unwrap_or_default();
                row.into_listing(images)
                    .map_err(|e| StoreError::Unavailable(e.to_string()))
            })
            .collect()
    }

    async fn hydrate_one(conn: &mut PgConnection, row: ListingRow) -> Result<Listing, StoreError> {
        Self::hydrate(conn, vec![row])
            .await?
            .pop()
            .ok_or(StoreError::NotFound)
    }
}

async fn insert_images(
    conn: &mut PgConnection,
    listing_id: i64,
    urls: &[String],
) -> Result<(), sqlx::Error> {
    if urls.is_empty() {
        return Ok(());
    }
    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO listing_images (listing_id, url, is_primary, position) ");
    builder.push_values(urls.iter().enumerate(), |mut b, (position, url)| {
        b.push_bind(listing_id)
            .push_bind(url)
            .push_bind(position == 0)
            .push_bind(position as i32);
    });
    builder.build().execute(conn).await?;
    Ok(())
}

/// Escapes LIKE metacharacters so user input matches literally.
fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[async_trait]
impl ListingStore for PgListingStore {
    async fn create_listing(&self, listing: NewListing) -> Result<Listing, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, ListingRow>(&format!(
            r#"
            INSERT INTO listings AS l
                (seller_id, title, description, price, category, condition, listing_type, status, campus)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'available', $8)
            RETURNING {LISTING_COLUMNS}
            "#
        ))
        .bind(listing.seller_id)
        .bind(&listing.title)
        .bind(&listing.description)
        .bind(listing.price)
        .bind(&listing.category)
        .bind(listing.condition.as_str())
        .bind(listing.listing_type.as_str())
        .bind(&listing.campus)
        .fetch_one(&mut *tx)
        .await?;

        insert_images(&mut tx, row.id, &listing.image_urls).await?;
        let created = Self::hydrate_one(&mut tx, row).await?;

        tx.commit().await?;
        Ok(created)
    }

    async fn find_listing(&self, id: i64) -> Result<Option<Listing>, StoreError> {
        let row = sqlx::query_as::<_, ListingRow>(&format!(
            "SELECT {LISTING_COLUMNS} FROM listings l WHERE l.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Self::hydrate(&self.pool, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn search(&self, filter: &ListingFilter) -> Result<Vec<Listing>, StoreError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {LISTING_COLUMNS} FROM listings l WHERE l.is_active AND l.status = 'available'"
        ));

        if let Some(category) = &filter.category {
            builder.push(" AND l.category = ").push_bind(category.clone());
        }
        if let Some(search) = &filter.search {
            let pattern = like_pattern(search);
            builder
                .push(" AND (l.title ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR l.description ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        if let Some(min) = filter.min_price {
            builder.push(" AND l.price >= ").push_bind(min);
        }
        if let Some(max) = filter.max_price {
            builder.push(" AND l.price <= ").push_bind(max);
        }
        if let Some(condition) = filter.condition {
            builder.push(" AND l.condition = ").push_bind(condition.as_str());
        }
        if let Some(listing_type) = filter.listing_type {
            builder.push(" AND l.listing_type = ").push_bind(listing_type.as_str());
        }
        if let Some(campus) = &filter.campus {
            builder.push(" AND l.campus = ").push_bind(campus.clone());
        }

        builder
            .push(" ORDER BY l.created_at DESC, l.id DESC LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);

        let rows = builder
            .build_query_as::<ListingRow>()
            .fetch_all(&self.pool)
            .await?;
        Self::hydrate(&self.pool, rows).await
    }

    async fn related(&self, listing: &Listing, limit: i64) -> Result<Vec<Listing>, StoreError> {
        let rows = sqlx::query_as::<_, ListingRow>(&format!(
            r#"
            SELECT {LISTING_COLUMNS} FROM listings l
            WHERE l.category = $1 AND l.id <> $2 AND l.is_active AND l.status = 'available'
            ORDER BY l.id
            LIMIT $3
            "#
        ))
        .bind(&listing.category)
        .bind(listing.id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Self::hydrate(&self.pool, rows).await
    }

    async fn update_listing(
        &self,
        id: i64,
        changes: UpdateListingRequest,
    ) -> Result<Listing, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, ListingRow>(&format!(
            r#"
            UPDATE listings AS l SET
                title = COALESCE($2, l.title),
                description = COALESCE($3, l.description),
                price = COALESCE($4, l.price),
                category = COALESCE($5, l.category),
                condition = COALESCE($6, l.condition),
                listing_type = COALESCE($7, l.listing_type),
                updated_at = NOW()
            WHERE l.id = $1 AND l.is_active
            RETURNING {LISTING_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(changes.title)
        .bind(changes.description)
        .bind(changes.price)
        .bind(changes.category)
        .bind(changes.condition.map(|c| c.as_str()))
        .bind(changes.listing_type.map(|t| t.as_str()))
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;

        if let Some(urls) = changes.image_urls {
            sqlx::query("DELETE FROM listing_images WHERE listing_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            insert_images(&mut tx, id, &urls).await?;
        }

        let updated = Self::hydrate_one(&mut tx, row).await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn deactivate_listing(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE listings SET is_active = FALSE, updated_at = NOW() WHERE id = $1 AND is_active",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn set_status(&self, id: i64, status: ListingStatus) -> Result<Listing, StoreError> {
        let row = sqlx::query_as::<_, ListingRow>(&format!(
            "UPDATE listings AS l SET status = $2, updated_at = NOW() \
             WHERE l.id = $1 AND l.is_active RETURNING {LISTING_COLUMNS}"
        ))
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;

        Self::hydrate(&self.pool, vec![row])
            .await?
            .pop()
            .ok_or(StoreError::NotFound)
    }

    async fn count_active_listings(&self, seller_id: i64) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM listings WHERE seller_id = $1 AND is_active",
        )
        .bind(seller_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn toggle_wishlist(&self, user_id: i64, listing_id: i64) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM wishlists WHERE user_id = $1 AND listing_id = $2")
            .bind(user_id)
            .bind(listing_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if removed == 0 {
            sqlx::query(
                "INSERT INTO wishlists (user_id, listing_id) VALUES ($1, $2) \
                 ON CONFLICT (user_id, listing_id) DO NOTHING",
            )
            .bind(user_id)
            .bind(listing_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(removed == 0)
    }

    async fn wishlist(&self, user_id: i64) -> Result<Vec<Listing>, StoreError> {
        let rows = sqlx::query_as::<_, ListingRow>(&format!(
            r#"
            SELECT {LISTING_COLUMNS} FROM wishlists w
            JOIN listings l ON l.id = w.listing_id
            WHERE w.user_id = $1 AND l.is_active
            ORDER BY w.created_at DESC, w.id DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Self::hydrate(&self.pool, rows).await
    }

    async fn add_review(
        &self,
        listing_id: i64,
        reviewer_id: i64,
        rating: i16,
        comment: String,
    ) -> Result<Review, StoreError> {
        let review = sqlx::query_as::<_, Review>(
            "INSERT INTO reviews (listing_id, reviewer_id, rating, comment) VALUES ($1, $2, $3, $4) \
             RETURNING id, listing_id, reviewer_id, rating, comment, created_at",
        )
        .bind(listing_id)
        .bind(reviewer_id)
        .bind(rating)
        .bind(comment)
        .fetch_one(&self.pool)
        .await?;
        Ok(review)
    }

    async fn add_report(
        &self,
        listing_id: i64,
        reporter_id: i64,
        reason: String,
        details: String,
    ) -> Result<Report, StoreError> {
        let report = sqlx::query_as::<_, Report>(
            "INSERT INTO reports (listing_id, reporter_id, reason, details) VALUES ($1, $2, $3, $4) \
             RETURNING id, listing_id, reporter_id, reason, details, created_at",
        )
        .bind(listing_id)
        .bind(reporter_id)
        .bind(reason)
        .bind(details)
        .fetch_one(&self.pool)
        .await?;
        Ok(report)
    }

    async fn add_offer(
        &self,
        listing_id: i64,
        buyer_id: i64,
        amount: Decimal,
        message: String,
    ) -> Result<Offer, StoreError> {
        let offer = sqlx::query_as::<_, Offer>(
            "INSERT INTO offers (listing_id, buyer_id, amount, message) VALUES ($1, $2, $3, $4) \
             RETURNING id, listing_id, buyer_id, amount, message, created_at",
        )
        .bind(listing_id)
        .bind(buyer_id)
        .bind(amount)
        .bind(message)
        .fetch_one(&self.pool)
        .await?;
        Ok(offer)
    }

    async fn place_order(&self, listing_id: i64, buyer_id: i64) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Compare-and-set: only one concurrent buyer can see status = 'available'.
        let reserved = sqlx::query_as::<_, (i64, Decimal)>(
            "UPDATE listings SET status = 'reserved', updated_at = NOW() \
             WHERE id = $1 AND is_active AND status = 'available' \
             RETURNING seller_id, price",
        )
        .bind(listing_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((seller_id, price)) = reserved else {
            let status = sqlx::query_scalar::<_, String>(
                "SELECT status FROM listings WHERE id = $1 AND is_active",
            )
            .bind(listing_id)
            .fetch_optional(&mut *tx)
            .await?;
            return Err(match status {
                Some(status) => {
                    StoreError::Conflict(format!("Listing is {status} and cannot be ordered"))
                }
                None => StoreError::NotFound,
            });
        };

        let order = sqlx::query_as::<_, Order>(
            "INSERT INTO orders (listing_id, buyer_id, seller_id, amount) VALUES ($1, $2, $3, $4) \
             RETURNING id, listing_id, buyer_id, seller_id, amount, created_at",
        )
        .bind(listing_id)
        .bind(buyer_id)
        .bind(seller_id)
        .bind(price)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(order)
    }

    async fn orders_for_user(&self, user_id: i64) -> Result<Vec<Order>, StoreError> {
        let orders = sqlx::query_as::<_, Order>(
            "SELECT id, listing_id, buyer_id, seller_id, amount, created_at FROM orders \
             WHERE buyer_id = $1 OR seller_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }
}

const PENDING_COLUMNS: &str = "user_id, attempt_id, code, issued_at, attempts, resends";

#[derive(Clone)]
pub struct PgTwoFactorStore {
    pool: PgPool,
}

impl PgTwoFactorStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Loads and row-locks the entry for this login, if it is still the current one.
    async fn lock_pending(
        conn: &mut PgConnection,
        user_id: i64,
        attempt_id: Uuid,
    ) -> Result<Option<PendingTwoFactor>, sqlx::Error> {
        sqlx::query_as::<_, PendingTwoFactor>(&format!(
            "SELECT {PENDING_COLUMNS} FROM pending_two_factor \
             WHERE user_id = $1 AND attempt_id = $2 FOR UPDATE"
        ))
        .bind(user_id)
        .bind(attempt_id)
        .fetch_optional(conn)
        .await
    }

    async fn apply(
        conn: &mut PgConnection,
        pending: &PendingTwoFactor,
        disposition: Disposition,
    ) -> Result<(), sqlx::Error> {
        match disposition {
            Disposition::Keep => {}
            Disposition::Save => {
                sqlx::query(
                    "UPDATE pending_two_factor SET code = $2, issued_at = $3, attempts = $4, resends = $5 \
                     WHERE user_id = $1",
                )
                .bind(pending.user_id)
                .bind(&pending.code)
                .bind(pending.issued_at)
                .bind(pending.attempts)
                .bind(pending.resends)
                .execute(conn)
                .await?;
            }
            Disposition::Remove => {
                sqlx::query("DELETE FROM pending_two_factor WHERE user_id = $1")
                    .bind(pending.user_id)
                    .execute(conn)
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TwoFactorStore for PgTwoFactorStore {
    async fn put(&self, pending: PendingTwoFactor) -> Result<(), StoreError> {
        sqlx::query(&format!(
            r#"
            INSERT INTO pending_two_factor ({PENDING_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id) DO UPDATE SET
                attempt_id = EXCLUDED.attempt_id,
                code = EXCLUDED.code,
                issued_at = EXCLUDED.issued_at,
                attempts = EXCLUDED.attempts,
                resends = EXCLUDED.resends
            "#
        ))
        .bind(pending.user_id)
        .bind(pending.attempt_id)
        .bind(&pending.code)
        .bind(pending.issued_at)
        .bind(pending.attempts)
        .bind(pending.resends)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, user_id: i64) -> Result<Option<PendingTwoFactor>, StoreError> {
        let pending = sqlx::query_as::<_, PendingTwoFactor>(&format!(
            "SELECT {PENDING_COLUMNS} FROM pending_two_factor WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(pending)
    }

    async fn verify(
        &self,
        user_id: i64,
        attempt_id: Uuid,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<TwoFactorOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;
        let Some(mut pending) = Self::lock_pending(&mut tx, user_id, attempt_id).await? else {
            return Ok(TwoFactorOutcome::NoPending);
        };

        let (outcome, disposition) = pending.check(code, now);
        Self::apply(&mut tx, &pending, disposition).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    async fn resend(
        &self,
        user_id: i64,
        attempt_id: Uuid,
        code: String,
        now: DateTime<Utc>,
    ) -> Result<ResendOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;
        let Some(mut pending) = Self::lock_pending(&mut tx, user_id, attempt_id).await? else {
            return Ok(ResendOutcome::NoPending);
        };

        let (outcome, disposition) = pending.rotate(code, now);
        Self::apply(&mut tx, &pending, disposition).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let cutoff = now - Duration::seconds(TWO_FACTOR_CODE_TTL_SECS);
        let result = sqlx::query("DELETE FROM pending_two_factor WHERE issued_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
