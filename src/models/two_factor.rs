// src/models/two_factor.rs

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::{TWO_FACTOR_CODE_TTL_SECS, TWO_FACTOR_MAX_ATTEMPTS, TWO_FACTOR_MAX_RESENDS},
    utils::otp::codes_match,
};

/// A login that passed the password check and is waiting for its emailed code.
/// There is at most one per user; a new login replaces it.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct PendingTwoFactor {
    pub user_id: i64,
    /// Identifies the login that created this entry. Two-factor tokens carry it
    /// so a token from a superseded login cannot act on a newer one.
    pub attempt_id: Uuid,
    pub code: String,
    pub issued_at: DateTime<Utc>,
    /// Failed submissions so far. Not reset by a resend.
    pub attempts: i32,
    pub resends: i32,
}

/// Result of submitting a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TwoFactorOutcome {
    NoPending,
    Expired,
    Locked,
    Mismatch,
    Verified,
}

/// Result of asking for a fresh code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResendOutcome {
    NoPending,
    Expired,
    Locked,
    LimitReached,
    Resent,
}

/// What a store must do with the entry after a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Keep,
    Save,
    Remove,
}

impl PendingTwoFactor {
    pub fn issue(user_id: i64, attempt_id: Uuid, code: String, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            attempt_id,
            code,
            issued_at: now,
            attempts: 0,
            resends: 0,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.issued_at > Duration::seconds(TWO_FACTOR_CODE_TTL_SECS)
    }

    pub fn is_locked(&self) -> bool {
        self.attempts >= TWO_FACTOR_MAX_ATTEMPTS as i32
    }

    /// Checks, in order: expiry, lockout, then the code itself in constant time.
    /// A mismatch bumps the attempt counter.
    pub fn check(&mut self, submitted: &str, now: DateTime<Utc>) -> (TwoFactorOutcome, Disposition) {
        if self.is_expired(now) {
            return (TwoFactorOutcome::Expired, Disposition::Remove);
        }
        if self.is_locked() {
            return (TwoFactorOutcome::Locked, Disposition::Keep);
        }
        if codes_match(submitted, &self.code) {
            (TwoFactorOutcome::Verified, Disposition::Remove)
        } else {
            self.attempts += 1;
            (TwoFactorOutcome::Mismatch, Disposition::Save)
        }
    }

    /// Replaces the code and restarts the expiry clock.
    pub fn rotate(&mut self, code: String, now: DateTime<Utc>) -> (ResendOutcome, Disposition) {
        if self.is_expired(now) {
            return (ResendOutcome::Expired, Disposition::Remove);
        }
        if self.is_locked() {
            return (ResendOutcome::Locked, Disposition::Keep);
        }
        if self.resends >= TWO_FACTOR_MAX_RESENDS as i32 {
            return (ResendOutcome::LimitReached, Disposition::Keep);
        }
        self.code = code;
        self.issued_at = now;
        self.resends += 1;
        (ResendOutcome::Resent, Disposition::Save)
    }
}

/// DTO for the second login step.
#[derive(Debug, Deserialize, Validate)]
pub struct VerifyCodeRequest {
    #[validate(length(min = 1, max = 6, message = "Code must be at most 6 characters."))]
    pub code: String,
}
