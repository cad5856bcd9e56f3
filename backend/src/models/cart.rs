use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::book::{Book, BookView};
use crate::errors::HandlerError;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    #[validate(length(min = 1, message = "Book ID is required"))]
    pub book_id: String,
    #[validate(range(min = 1, max = 100, message = "Quantity must be between 1 and 100"))]
    pub quantity: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCartRequest {
    #[validate(range(min = 1, max = 100, message = "Quantity must be between 1 and 100"))]
    pub quantity: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct WishlistRequest {
    #[validate(length(min = 1, message = "Book ID is required"))]
    pub book_id: String,
}

/// Cart line with the referenced book resolved.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub book: BookView,
    pub quantity: u32,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartSummary {
    pub cart: Vec<CartItem>,
    pub total_items: u64,
    pub total_amount: u64,
}

impl CartSummary {
    pub fn new(lines: Vec<(Book, u32, DateTime<Utc>)>) -> Result<Self, HandlerError> {
        let total_items = lines.iter().map(|(_, q, _)| u64::from(*q)).sum();
        let total_amount = lines
            .iter()
            .try_fold(0u64, |acc, (b, q, _)| {
                b.selling_price
                    .checked_mul(u64::from(*q))
                    .and_then(|line| acc.checked_add(line))
            })
            .ok_or_else(|| HandlerError::bad_request("Cart total is too large"))?;
        let cart = lines
            .into_iter()
            .map(|(book, quantity, added_at)| CartItem {
                book: book.view(),
                quantity,
                added_at,
            })
            .collect();
        Ok(Self {
            cart,
            total_items,
            total_amount,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WishlistResponse {
    pub wishlist: Vec<BookView>,
}
