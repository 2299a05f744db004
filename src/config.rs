// src/config.rs

use std::env;

use anyhow::Context;
use dotenvy::dotenv;

/// Lifetime of a pending two-factor code, in seconds.
pub const TWO_FACTOR_CODE_TTL_SECS: i64 = 300;

/// Failed code submissions tolerated before a pending login is locked.
pub const TWO_FACTOR_MAX_ATTEMPTS: u32 = 5;

/// Resends allowed per pending login.
pub const TWO_FACTOR_MAX_RESENDS: u32 = 3;

/// Number of listings returned by the related-listings endpoint.
pub const RELATED_LISTINGS_LIMIT: i64 = 3;

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub api_url: String,
    pub api_token: String,
    pub sender: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL URL. `None` runs the service on in-memory stores.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    /// Access token lifetime in seconds.
    pub jwt_expiration: u64,
    /// Refresh token lifetime in seconds.
    pub refresh_expiration: u64,
    /// Validity window of email verification and password reset links, in seconds.
    pub verification_token_ttl: i64,
    /// Base URL used when building links sent by email.
    pub public_base_url: String,
    pub mail: Option<MailConfig>,
    pub app_addr: String,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());

        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;

        let mail = match env::var("MAIL_API_URL") {
            Ok(api_url) if !api_url.is_empty() => Some(MailConfig {
                api_url,
                api_token: env::var("MAIL_API_TOKEN")
                    .context("MAIL_API_TOKEN must be set when MAIL_API_URL is")?,
                sender: env::var("MAIL_SENDER")
                    .context("MAIL_SENDER must be set when MAIL_API_URL is")?,
                timeout_secs: parse_var("MAIL_TIMEOUT_SECS", 10)?,
            }),
            _ => None,
        };

        Ok(Self {
            database_url,
            jwt_secret,
            jwt_expiration: parse_var("JWT_EXPIRATION", 900)?,
            refresh_expiration: parse_var("JWT_REFRESH_EXPIRATION", 60 * 60 * 24 * 7)?,
            verification_token_ttl: parse_var("VERIFICATION_TOKEN_TTL", 60 * 60 * 24 * 3)?,
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string())
                .trim_end_matches('/')
                .to_string(),
            mail,
            app_addr: env::var("APP_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            rust_log: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{name} has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}
