// src/models/listing.rs

use std::{fmt, str::FromStr};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::utils::html::validate_image_urls;

/// Lifecycle of a listing. Any status may be set from any other by the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Available,
    Reserved,
    Sold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    New,
    LikeNew,
    Good,
    Fair,
    Used,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingType {
    #[default]
    Sale,
    Rent,
}

/// Returned when a stored or submitted value is not a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! text_enum {
    ($ty:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text),+
                }
            }
        }

        impl FromStr for $ty {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($ty::$variant),)+
                    other => Err(UnknownVariant { kind: $kind, value: other.to_string() }),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(ListingStatus, "status", {
    Available => "available",
    Reserved => "reserved",
    Sold => "sold",
});

text_enum!(Condition, "condition", {
    New => "new",
    LikeNew => "like_new",
    Good => "good",
    Fair => "fair",
    Used => "used",
});

text_enum!(ListingType, "listing type", {
    Sale => "sale",
    Rent => "rent",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ListingImage {
    pub id: i64,
    #[serde(skip)]
    pub listing_id: i64,
    pub url: String,
    pub is_primary: bool,
    pub position: i32,
}

/// A marketplace item. Only its seller may change it; deletion only clears
/// `is_active` so orders and reviews keep pointing at a real row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: i64,
    pub seller_id: i64,
    pub title: String,
    pub description: String,
    pub price: Decimal,
    pub category: String,
    pub condition: Condition,
    #[serde(rename = "type")]
    pub listing_type: ListingType,
    pub status: ListingStatus,
    pub campus: String,
    pub is_active: bool,
    pub images: Vec<ListingImage>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Listing {
    /// Whether the listing should show up in search and related results.
    pub fn is_visible(&self) -> bool {
        self.is_active && self.status == ListingStatus::Available
    }
}

/// Raw 'listings' row; enum columns are stored as text.
#[derive(Debug, Clone, FromRow)]
pub struct ListingRow {
    pub id: i64,
    pub seller_id: i64,
    pub title: String,
    pub description: String,
    pub price: Decimal,
    pub category: String,
    pub condition: String,
    pub listing_type: String,
    pub status: String,
    pub campus: String,
    pub is_active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl ListingRow {
    pub fn into_listing(self, images: Vec<ListingImage>) -> Result<Listing, UnknownVariant> {
        Ok(Listing {
            id: self.id,
            seller_id: self.seller_id,
            title: self.title,
            description: self.description,
            price: self.price,
            category: self.category,
            condition: self.condition.parse()?,
            listing_type: self.listing_type.parse()?,
            status: self.status.parse()?,
            campus: self.campus,
            is_active: self.is_active,
            images,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Largest amount a `NUMERIC(12, 2)` column holds.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(3_567_587_327, 232, 0, false, 2);

/// True when the amount, rounded to cents the way it is stored, fits the column.
pub fn fits_amount_column(amount: &Decimal) -> bool {
    amount.round_dp(2) <= MAX_AMOUNT
}

fn validate_price(price: &Decimal) -> Result<(), validator::ValidationError> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(validator::ValidationError::new("negative_price")
            .with_message("Price cannot be negative.".into()));
    }
    if !fits_amount_column(price) {
        return Err(validator::ValidationError::new("price_too_large")
            .with_message("Price must be at most 9999999999.99.".into()));
    }
    Ok(())
}

/// DTO for creating a new listing. The seller comes from the token, never the body.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateListingRequest {
    #[validate(length(min = 1, max = 200, message = "Title length must be between 1 and 200 chars"))]
    pub title: String,

    #[validate(length(min = 1, max = 5000, message = "Description length must be between 1 and 5000 chars"))]
    pub description: String,

    #[validate(custom(function = validate_price))]
    pub price: Decimal,

    #[validate(length(min = 1, max = 100, message = "Category length must be between 1 and 100 chars"))]
    pub category: String,

    pub condition: Condition,

    #[serde(rename = "type", default)]
    pub listing_type: ListingType,

    #[serde(default)]
    #[validate(custom(function = validate_image_urls))]
    pub image_urls: Vec<String>,
}

impl CreateListingRequest {
    /// Trims text fields so blank values fail the length checks.
    pub fn trim_fields(&mut self) {
        self.title = self.title.trim().to_string();
        self.description = self.description.trim().to_string();
        self.category = self.category.trim().to_string();
    }
}

/// DTO for PATCH /listings/{id}. Absent fields are left as they are;
/// `image_urls`, when present, replaces the whole image set.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateListingRequest {
    #[validate(length(min = 1, max = 200, message = "Title length must be between 1 and 200 chars"))]
    pub title: Option<String>,

    #[validate(length(min = 1, max = 5000, message = "Description length must be between 1 and 5000 chars"))]
    pub description: Option<String>,

    #[validate(custom(function = validate_price))]
    pub price: Option<Decimal>,

    #[validate(length(min = 1, max = 100, message = "Category length must be between 1 and 100 chars"))]
    pub category: Option<String>,

    pub condition: Option<Condition>,

    #[serde(rename = "type")]
    pub listing_type: Option<ListingType>,

    #[validate(custom(function = validate_image_urls))]
    pub image_urls: Option<Vec<String>>,
}

impl UpdateListingRequest {
    pub fn trim_fields(&mut self) {
        let trim = |v: &mut Option<String>| {
            if let Some(s) = v {
                *s = s.trim().to_string();
            }
        };
        trim(&mut self.title);
        trim(&mut self.description);
        trim(&mut self.category);
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.price.is_none()
            && self.category.is_none()
            && self.condition.is_none()
            && self.listing_type.is_none()
            && self.image_urls.is_none()
    }
}

/// Listing data as handed to a store, already sanitized.
#[derive(Debug, Clone)]
pub struct NewListing {
    pub seller_id: i64,
    pub title: String,
    pub description: String,
    pub price: Decimal,
    pub category: String,
    pub condition: Condition,
    pub listing_type: ListingType,
    pub campus: String,
    pub image_urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// Query parameters for searching listings. All filters combine with AND.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingQuery {
    pub category: Option<String>,
    /// Case-insensitive substring match on title or description.
    pub search: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub condition: Option<Condition>,
    #[serde(rename = "type")]
    pub listing_type: Option<ListingType>,
    /// Number of items to return (default: 20, max: 100).
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Normalized search filter handed to the store.
#[derive(Debug, Clone, Default)]
pub struct ListingFilter {
    pub category: Option<String>,
    pub search: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub condition: Option<Condition>,
    pub listing_type: Option<ListingType>,
    pub campus: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl ListingFilter {
    pub fn from_query(query: ListingQuery, campus: Option<String>) -> Self {
        let non_blank = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Self {
            category: non_blank(query.category),
            search: non_blank(query.search),
            min_price: query.min_price,
            max_price: query.max_price,
            condition: query.condition,
            listing_type: query.listing_type,
            campus: non_blank(campus),
            limit: query.limit.unwrap_or(20).clamp(1, 100),
            offset: query.offset.unwrap_or(0).max(0),
        }
    }

    /// In-process form of the search predicate. Only visible listings match.
    pub fn matches(&self, listing: &Listing) -> bool {
        if !listing.is_visible() {
            return false;
        }
        if let Some(category) = &self.category {
            if &listing.category != category {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            if !listing.title.to_lowercase().contains(&needle)
                && !listing.description.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        if self.min_price.is_some_and(|min| listing.price < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| listing.price > max) {
            return false;
        }
        if self.condition.is_some_and(|c| listing.condition != c) {
            return false;
        }
        if self.listing_type.is_some_and(|t| listing.listing_type != t) {
            return false;
        }
        if let Some(campus) = &self.campus {
            if &listing.campus != campus {
                return false;
            }
        }
        true
    }
}
