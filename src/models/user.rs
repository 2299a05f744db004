// src/models/user.rs

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::utils::html::validate_url_string;

static CONTACT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9][0-9 \-]{0,19}$").expect("static regex"));

/// Represents the 'users' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,

    /// Unique, lowercased email. Doubles as the login name.
    pub email: String,

    /// Argon2 password hash.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub password: String,

    /// False until the email address has been verified.
    pub is_active: bool,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Represents the 'profiles' table. Exactly one per user, created together
/// with the user row.
#[derive(Debug, Clone, Default, FromRow, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: i64,
    pub full_name: String,
    pub contact: String,
    /// URL of the profile picture.
    pub profile_picture: String,
}

impl Profile {
    /// A profile is complete once every field has been filled in.
    pub fn is_complete(&self) -> bool {
        !self.full_name.trim().is_empty()
            && !self.contact.trim().is_empty()
            && !self.profile_picture.trim().is_empty()
    }
}

/// Everything needed to create a user and its profile in one step.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub contact: String,
}

/// Partial profile update. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(max = 100, message = "Full name must be at most 100 characters."))]
    pub full_name: Option<String>,

    #[validate(
        length(max = 20, message = "Contact must be at most 20 characters."),
        regex(path = *CONTACT_RE, message = "Contact must be a phone number.")
    )]
    pub contact: Option<String>,

    #[validate(
        length(max = 500, message = "Picture URL must be at most 500 characters."),
        custom(function = validate_url_string)
    )]
    pub profile_picture: Option<String>,
}

/// The caller's own profile.
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub contact: String,
    pub profile_picture: String,
    pub is_complete: bool,
}

impl ProfileResponse {
    pub fn new(user: &User, profile: &Profile) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            full_name: profile.full_name.clone(),
            contact: profile.contact.clone(),
            profile_picture: profile.profile_picture.clone(),
            is_complete: profile.is_complete(),
        }
    }
}

/// Profile data visible to anyone. Never carries email or contact.
#[derive(Debug, Serialize)]
pub struct PublicProfileResponse {
    pub id: i64,
    pub full_name: String,
    pub profile_picture: String,
    pub active_listings: i64,
}

/// DTO for creating a new user (Registration).
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(
        email(message = "Enter a valid email address."),
        length(max = 254, message = "Email must be at most 254 characters.")
    )]
    pub email: String,
    #[validate(length(
        min = 8,
        max = 128,
        message = "Password length must be between 8 and 128 characters."
    ))]
    pub password: String,
    pub confirm_password: String,
    #[validate(length(max = 100, message = "Full name must be at most 100 characters."))]
    pub full_name: Option<String>,
    #[validate(
        length(max = 20, message = "Contact must be at most 20 characters."),
        regex(path = *CONTACT_RE, message = "Contact must be a phone number.")
    )]
    pub contact: Option<String>,
}

/// DTO for user login.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 254, message = "Email is required."))]
    pub email: String,
    #[validate(length(min = 1, max = 128, message = "Password is required."))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PasswordResetRequest {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PasswordResetConfirmRequest {
    #[validate(length(
        min = 8,
        max = 128,
        message = "Password length must be between 8 and 128 characters."
    ))]
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Emails are compared case-insensitively; they are stored in this form.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
