// tests/postgres_store_tests.rs
//
// Runs the sqlx adapters against a real database. Each test is a no-op when
// DATABASE_URL is unset, so the suite still passes on machines without Postgres.

use campus_market::{
    models::{
        listing::{Condition, ListingFilter, ListingType, NewListing},
        two_factor::{PendingTwoFactor, ResendOutcome, TwoFactorOutcome},
        user::NewAccount,
    },
    store::{
        ListingStore, StoreError, TwoFactorStore, UserStore,
        postgres::{PgListingStore, PgTwoFactorStore, PgUserStore},
    },
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, postgres::PgPoolOptions};
use uuid::Uuid;

/// Connects and migrates, or returns `None` when no database is configured.
async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping Postgres store test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing. Make sure DATABASE_URL is set.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    Some(pool)
}

fn account(email: &str) -> NewAccount {
    NewAccount {
        email: email.to_string(),
        password_hash: "hash".to_string(),
        full_name: "Test Student".to_string(),
        contact: "0712345678".to_string(),
    }
}

fn unique_email() -> String {
    format!("pg-{}@campus.edu", &Uuid::new_v4().to_string()[..8])
}

async fn new_user(users: &PgUserStore) -> i64 {
    users.create_account(account(&unique_email())).await.unwrap().id
}

fn new_listing(seller_id: i64, title: &str, category: &str) -> NewListing {
    NewListing {
        seller_id,
        title: title.to_string(),
        description: "Barely used".to_string(),
        price: Decimal::new(4000, 2),
        category: category.to_string(),
        condition: Condition::Good,
        listing_type: ListingType::Sale,
        campus: String::new(),
        image_urls: vec![
            "https://cdn.campus.test/1.jpg".to_string(),
            "https://cdn.campus.test/2.jpg".to_string(),
        ],
    }
}

#[tokio::test]
async fn accounts_come_with_a_profile_and_emails_are_unique() {
    let Some(pool) = test_pool().await else { return };
    let users = PgUserStore::new(pool);
    let email = unique_email();

    let user = users.create_account(account(&email)).await.unwrap();
    assert!(!user.is_active);
    assert_eq!(user.email, email);

    let profile = users.profile(user.id).await.unwrap();
    assert_eq!(profile.full_name, "Test Student");
    assert_eq!(profile.contact, "0712345678");

    assert!(matches!(
        users.create_account(account(&email)).await,
        Err(StoreError::Duplicate)
    ));

    users.set_active(user.id, true).await.unwrap();
    let stored = users.find_by_email(&email).await.unwrap().unwrap();
    assert!(stored.is_active);
}

#[tokio::test]
async fn concurrent_orders_reserve_a_listing_once() {
    let Some(pool) = test_pool().await else { return };
    let users = PgUserStore::new(pool.clone());
    let listings = PgListingStore::new(pool);

    let seller = new_user(&users).await;
    let buyer = new_user(&users).await;
    let listing = listings
        .create_listing(new_listing(seller, "Bike", "Sports"))
        .await
        .unwrap();
    assert_eq!(listing.images.len(), 2);
    assert!(listing.images[0].is_primary);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = listings.clone();
            let listing_id = listing.id;
            tokio::spawn(async move { store.place_order(listing_id, buyer).await })
        })
        .collect();

    let mut placed = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(order) => {
                placed += 1;
                assert_eq!(order.seller_id, seller);
                assert_eq!(order.amount, Decimal::new(4000, 2));
            }
            Err(StoreError::Conflict(_)) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!((placed, conflicts), (1, 7));

    let stored = listings.find_listing(listing.id).await.unwrap().unwrap();
    assert_eq!(stored.status.as_str(), "reserved");
    assert_eq!(listings.orders_for_user(buyer).await.unwrap().len(), 1);
    assert_eq!(listings.orders_for_user(seller).await.unwrap().len(), 1);

    listings.deactivate_listing(listing.id).await.unwrap();
    assert!(matches!(
        listings.place_order(listing.id, buyer).await,
        Err(StoreError::NotFound)
    ));
}

#[tokio::test]
async fn search_matches_like_metacharacters_literally() {
    let Some(pool) = test_pool().await else { return };
    let users = PgUserStore::new(pool.clone());
    let listings = PgListingStore::new(pool);

    let seller = new_user(&users).await;
    let category = format!("cat-{}", Uuid::new_v4());
    let percent = listings
        .create_listing(new_listing(seller, "100% cotton shirt", &category))
        .await
        .unwrap();
    listings
        .create_listing(new_listing(seller, "100 cotton shirt", &category))
        .await
        .unwrap();

    let filter = ListingFilter {
        category: Some(category.clone()),
        search: Some("100%".to_string()),
        limit: 20,
        ..Default::default()
    };
    let found = listings.search(&filter).await.unwrap();
    let ids: Vec<i64> = found.iter().map(|l| l.id).collect();
    assert_eq!(ids, vec![percent.id]);

    let everything = ListingFilter {
        category: Some(category),
        limit: 20,
        ..Default::default()
    };
    assert_eq!(listings.search(&everything).await.unwrap().len(), 2);
}

#[tokio::test]
async fn wishlist_toggles_on_and_off() {
    let Some(pool) = test_pool().await else { return };
    let users = PgUserStore::new(pool.clone());
    let listings = PgListingStore::new(pool);

    let seller = new_user(&users).await;
    let saver = new_user(&users).await;
    let listing = listings
        .create_listing(new_listing(seller, "Lamp", "Furniture"))
        .await
        .unwrap();

    assert!(listings.toggle_wishlist(saver, listing.id).await.unwrap());
    assert_eq!(listings.wishlist(saver).await.unwrap().len(), 1);
    assert!(!listings.toggle_wishlist(saver, listing.id).await.unwrap());
    assert!(listings.wishlist(saver).await.unwrap().is_empty());
}

#[tokio::test]
async fn two_factor_verify_and_resend_share_one_row() {
    let Some(pool) = test_pool().await else { return };
    let users = PgUserStore::new(pool.clone());
    let codes = PgTwoFactorStore::new(pool);

    let user_id = new_user(&users).await;
    let attempt = Uuid::new_v4();
    let now = Utc::now();
    codes
        .put(PendingTwoFactor::issue(user_id, attempt, "111111".to_string(), now))
        .await
        .unwrap();

    assert_eq!(
        codes.verify(user_id, attempt, "999999", now).await.unwrap(),
        TwoFactorOutcome::Mismatch
    );
    assert_eq!(codes.get(user_id).await.unwrap().unwrap().attempts, 1);

    assert_eq!(
        codes
            .resend(user_id, attempt, "222222".to_string(), now)
            .await
            .unwrap(),
        ResendOutcome::Resent
    );
    let pending = codes.get(user_id).await.unwrap().unwrap();
    assert_eq!(pending.resends, 1);
    assert_eq!(pending.attempts, 1);

    assert_eq!(
        codes.verify(user_id, attempt, "111111", now).await.unwrap(),
        TwoFactorOutcome::Mismatch
    );
    assert_eq!(
        codes.verify(user_id, attempt, "222222", now).await.unwrap(),
        TwoFactorOutcome::Verified
    );
    assert!(codes.get(user_id).await.unwrap().is_none());
}

#[tokio::test]
async fn a_new_login_supersedes_and_expired_codes_are_purged() {
    let Some(pool) = test_pool().await else { return };
    let users = PgUserStore::new(pool.clone());
    let codes = PgTwoFactorStore::new(pool);

    let user_id = new_user(&users).await;
    let now = Utc::now();
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    codes
        .put(PendingTwoFactor::issue(user_id, first, "111111".to_string(), now))
        .await
        .unwrap();
    codes
        .put(PendingTwoFactor::issue(user_id, second, "222222".to_string(), now))
        .await
        .unwrap();

    assert_eq!(
        codes.verify(user_id, first, "111111", now).await.unwrap(),
        TwoFactorOutcome::NoPending
    );
    assert_eq!(
        codes
            .resend(user_id, first, "333333".to_string(), now)
            .await
            .unwrap(),
        ResendOutcome::NoPending
    );

    let stale = now - Duration::seconds(400);
    codes
        .put(PendingTwoFactor::issue(user_id, second, "222222".to_string(), stale))
        .await
        .unwrap();
    assert!(codes.purge_expired(now).await.unwrap() >= 1);
    assert!(codes.get(user_id).await.unwrap().is_none());
}
