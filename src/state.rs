// src/state.rs

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::{
    config::Config,
    store::{
        ListingStore, TwoFactorStore, UserStore,
        memory::{MemoryListingStore, MemoryTwoFactorStore, MemoryUserStore},
        postgres::{PgListingStore, PgTwoFactorStore, PgUserStore},
    },
    utils::{email::EmailClient, token::VerificationTokens},
};

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub listings: Arc<dyn ListingStore>,
    pub two_factor: Arc<dyn TwoFactorStore>,
    pub mailer: Arc<dyn EmailClient>,
    pub tokens: VerificationTokens,
    pub config: Config,
}

impl AppState {
    pub fn postgres(pool: PgPool, config: Config, mailer: Arc<dyn EmailClient>) -> Self {
        Self::with_stores(
            Arc::new(PgUserStore::new(pool.clone())),
            Arc::new(PgListingStore::new(pool.clone())),
            Arc::new(PgTwoFactorStore::new(pool)),
            mailer,
            config,
        )
    }

    /// State backed by process memory. Nothing survives a restart.
    pub fn in_memory(config: Config, mailer: Arc<dyn EmailClient>) -> Self {
        Self::with_stores(
            Arc::new(MemoryUserStore::new()),
            Arc::new(MemoryListingStore::new()),
            Arc::new(MemoryTwoFactorStore::new()),
            mailer,
            config,
        )
    }

    pub fn with_stores(
        users: Arc<dyn UserStore>,
        listings: Arc<dyn ListingStore>,
        two_factor: Arc<dyn TwoFactorStore>,
        mailer: Arc<dyn EmailClient>,
        config: Config,
    ) -> Self {
        let tokens = VerificationTokens::new(&config.jwt_secret, config.verification_token_ttl);
        Self {
            users,
            listings,
            two_factor,
            mailer,
            tokens,
            config,
        }
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
