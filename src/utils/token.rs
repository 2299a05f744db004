// src/utils/token.rs
//
// Stateless tokens for email verification and password reset links.
// A token is `<issued-at, base36>-<mac>`, where the MAC covers the purpose, the
// user id, the current password hash and the activation flag. Changing either
// of the last two (verifying the email, resetting the password) invalidates
// every token issued before, so each link works once without any stored state.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::models::user::User;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    VerifyEmail,
    ResetPassword,
}

impl TokenPurpose {
    fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::VerifyEmail => "verify-email",
            TokenPurpose::ResetPassword => "reset-password",
        }
    }
}

#[derive(Clone)]
pub struct VerificationTokens {
    secret: Vec<u8>,
    ttl_secs: i64,
}

impl std::fmt::Debug for VerificationTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationTokens")
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

impl VerificationTokens {
    pub fn new(secret: &str, ttl_secs: i64) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            ttl_secs,
        }
    }

    pub fn make_token(&self, user: &User, purpose: TokenPurpose, now: DateTime<Utc>) -> String {
        let ts = now.timestamp().max(0) as u64;
        let mac = self.mac(user, purpose, ts).finalize().into_bytes();
        format!("{}-{}", to_base36(ts), URL_SAFE_NO_PAD.encode(mac))
    }

    pub fn check_token(
        &self,
        user: &User,
        purpose: TokenPurpose,
        token: &str,
        now: DateTime<Utc>,
    ) -> bool {
        let Some((ts_part, mac_part)) = token.split_once('-') else {
            return false;
        };
        let Some(ts) = from_base36(ts_part) else {
            return false;
        };
        let Ok(signature) = URL_SAFE_NO_PAD.decode(mac_part) else {
            return false;
        };

        let age = now.timestamp() - ts as i64;
        if age < 0 || age > self.ttl_secs {
            return false;
        }

        self.mac(user, purpose, ts).verify_slice(&signature).is_ok()
    }

    fn mac(&self, user: &User, purpose: TokenPurpose, ts: u64) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC accepts keys of any length");
        mac.update(purpose.as_str().as_bytes());
        mac.update(b"|");
        mac.update(user.id.to_string().as_bytes());
        mac.update(b"|");
        mac.update(user.password.as_bytes());
        mac.update(b"|");
        mac.update(if user.is_active { b"1" } else { b"0" });
        mac.update(b"|");
        mac.update(ts.to_string().as_bytes());
        mac
    }
}

/// Opaque, URL-safe form of a user id for use in links.
pub fn encode_uid(id: i64) -> String {
    URL_SAFE_NO_PAD.encode(id.to_string())
}

pub fn decode_uid(uid: &str) -> Option<i64> {
    let bytes = URL_SAFE_NO_PAD.decode(uid).ok()?;
    String::from_utf8(bytes).ok()?.parse().ok()
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

fn from_base36(s: &str) -> Option<u64> {
    if s.is_empty() || s.len() > 13 {
        return None;
    }
    u64::from_str_radix(s, 36).ok()
}
