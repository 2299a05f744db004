// src/models/interaction.rs

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::models::listing::fits_amount_column;

/// Represents the 'reviews' table. Append-only.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Review {
    pub id: i64,
    pub listing_id: i64,
    pub reviewer_id: i64,
    pub rating: i16,
    pub comment: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Represents the 'reports' table. Append-only.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    pub listing_id: i64,
    pub reporter_id: i64,
    pub reason: String,
    pub details: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Represents the 'offers' table. An offer is only a proposal; nothing settles it.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Offer {
    pub id: i64,
    pub listing_id: i64,
    pub buyer_id: i64,
    pub amount: Decimal,
    pub message: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Represents the 'orders' table. Seller and amount are copied from the
/// listing when the order is placed.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub listing_id: i64,
    pub buyer_id: i64,
    pub seller_id: i64,
    pub amount: Decimal,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReviewRequest {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5."))]
    pub rating: i16,

    #[validate(length(max = 2000, message = "Comment must be at most 2000 characters."))]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReportRequest {
    #[validate(length(min = 1, max = 100, message = "Reason must be between 1 and 100 characters."))]
    pub reason: String,

    #[validate(length(max = 2000, message = "Details must be at most 2000 characters."))]
    pub details: Option<String>,
}

impl CreateReportRequest {
    pub fn trim_fields(&mut self) {
        self.reason = self.reason.trim().to_string();
    }
}

fn validate_offer_amount(amount: &Decimal) -> Result<(), validator::ValidationError> {
    if *amount <= Decimal::ZERO || !fits_amount_column(amount) {
        return Err(validator::ValidationError::new("offer_amount")
            .with_message("Enter a valid amount.".into()));
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOfferRequest {
    #[validate(custom(function = validate_offer_amount))]
    pub amount: Decimal,

    #[validate(length(max = 1000, message = "Message must be at most 1000 characters."))]
    pub message: Option<String>,
}

/// An order as seen from one of its parties.
#[derive(Debug, Serialize)]
pub struct TransactionEntry {
    #[serde(flatten)]
    pub order: Order,
    /// "buyer" or "seller".
    pub role: &'static str,
}

impl TransactionEntry {
    pub fn for_user(order: Order, user_id: i64) -> Self {
        let role = if order.buyer_id == user_id { "buyer" } else { "seller" };
        Self { order, role }
    }
}
