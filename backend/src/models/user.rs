use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::{
    book::{Book, BookStatus},
    order::{sort_orders, Order, OrderSummary, PaymentStatus},
    Pagination,
};
use crate::{
    constants::{MAX_QUANTITY, USER_TABLE},
    errors::HandlerError,
    store::Document,
};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Role::User => write!(f, "user"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub district: String,
    pub province: String,
    pub postal_code: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    /// Book id.
    pub book: String,
    pub quantity: u32,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Derived from the e-mail address, see `utils::create_userid`.
    pub id: String,
    #[serde(default)]
    pub version: u64,
    pub name: String,
    pub email: String,
    /// Scrypt PHC string.
    pub password: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Address,
    #[serde(default)]
    pub avatar: Option<String>,
    pub is_active: bool,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub cart: Vec<CartLine>,
    /// Book ids.
    #[serde(default)]
    pub wishlist: Vec<String>,
    /// Book ids.
    #[serde(default)]
    pub books_listed: Vec<String>,
    /// Book ids.
    #[serde(default)]
    pub books_sold: Vec<String>,
    /// Order ids.
    #[serde(default)]
    pub books_purchased: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for User {
    const TABLE: &'static str = USER_TABLE;

    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn version_mut(&mut self) -> &mut u64 {
        &mut self.version
    }
}

impl User {
    pub fn new(id: String, name: String, email: String, password: String, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id,
            version: 0,
            name,
            email,
            password,
            role,
            phone: None,
            address: Address::default(),
            avatar: None,
            is_active: true,
            is_verified: false,
            cart: Vec::new(),
            wishlist: Vec::new(),
            books_listed: Vec::new(),
            books_sold: Vec::new(),
            books_purchased: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Merges into an existing cart line or appends a new one. A line never
    /// holds more than `MAX_QUANTITY` copies.
    pub fn add_to_cart(&mut self, book_id: &str, quantity: u32) -> Result<(), HandlerError> {
        let existing = self.cart.iter_mut().find(|l| l.book == book_id);
        let current = existing.as_ref().map_or(0, |l| l.quantity);
        let merged = current
            .checked_add(quantity)
            .filter(|q| *q <= MAX_QUANTITY)
            .ok_or_else(|| {
                HandlerError::bad_request(format!("Quantity cannot exceed {}", MAX_QUANTITY))
            })?;
        match existing {
            Some(line) => line.quantity = merged,
            None => self.cart.push(CartLine {
                book: book_id.to_string(),
                quantity: merged,
                added_at: Utc::now(),
            }),
        }
        Ok(())
    }

    pub fn remove_from_cart(&mut self, book_id: &str) -> bool {
        let before = self.cart.len();
        self.cart.retain(|l| l.book != book_id);
        self.cart.len() != before
    }

    /// Returns false when the book was already wishlisted.
    pub fn add_to_wishlist(&mut self, book_id: &str) -> bool {
        if self.wishlist.iter().any(|b| b == book_id) {
            return false;
        }
        self.wishlist.push(book_id.to_string());
        true
    }

    pub fn remove_from_wishlist(&mut self, book_id: &str) -> bool {
        let before = self.wishlist.len();
        self.wishlist.retain(|b| b != book_id);
        self.wishlist.len() != before
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
            phone: self.phone.clone(),
            address: self.address.clone(),
            avatar: self.avatar.clone(),
            is_active: self.is_active,
            is_verified: self.is_verified,
            cart: self.cart.clone(),
            wishlist: self.wishlist.clone(),
            books_listed: self.books_listed.clone(),
            books_sold: self.books_sold.clone(),
            books_purchased: self.books_purchased.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn public_profile(&self) -> PublicUser {
        PublicUser {
            id: self.id.clone(),
            name: self.name.clone(),
            avatar: self.avatar.clone(),
            is_verified: self.is_verified,
            books_listed: self.books_listed.clone(),
            books_sold: self.books_sold.clone(),
            created_at: self.created_at,
        }
    }
}

/// User as returned to its owner and to admins; never carries the password.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub phone: Option<String>,
    pub address: Address,
    pub avatar: Option<String>,
    pub is_active: bool,
    pub is_verified: bool,
    pub cart: Vec<CartLine>,
    pub wishlist: Vec<String>,
    pub books_listed: Vec<String>,
    pub books_sold: Vec<String>,
    pub books_purchased: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub name: String,
    pub avatar: Option<String>,
    pub is_verified: bool,
    pub books_listed: Vec<String>,
    pub books_sold: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublicUserStats {
    pub total_books_listed: usize,
    pub total_books_sold: usize,
    pub active_listing: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublicUserResponse {
    pub user: PublicUser,
    pub stats: PublicUserStats,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserSearchQuery {
    /// At least two characters.
    pub q: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserDirectory {
    pub users: Vec<PublicUser>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_books_listed: usize,
    pub active_listing: usize,
    pub pending_approval: usize,
    pub sold_books: usize,
    pub total_orders: usize,
    pub total_sales: usize,
    /// Paid orders where the user is the seller.
    pub total_earnings: u64,
    /// Paid orders where the user is the buyer.
    pub total_spent: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserDashboard {
    pub stats: DashboardStats,
    pub recent_orders: Vec<OrderSummary>,
    pub recent_sales: Vec<OrderSummary>,
}

impl UserDashboard {
    /// `books` are the user's own listings, `orders` every order the user
    /// takes part in.
    pub fn build(user_id: &str, books: &[Book], orders: Vec<Order>) -> Self {
        let count = |status: BookStatus| books.iter().filter(|b| b.status == status).count();
        let (mut purchases, mut sales): (Vec<Order>, Vec<Order>) =
            orders.into_iter().partition(|o| o.buyer == user_id);
        sales.retain(|o| o.seller == user_id);
        sort_orders(&mut purchases);
        sort_orders(&mut sales);

        let paid_sum = |orders: &[Order]| -> u64 {
            orders
                .iter()
                .filter(|o| o.payment_status == PaymentStatus::Paid)
                .map(|o| o.final_amount)
                .sum()
        };

        Self {
            stats: DashboardStats {
                total_books_listed: books.len(),
                active_listing: count(BookStatus::Approved),
                pending_approval: count(BookStatus::Pending),
                sold_books: count(BookStatus::Sold),
                total_orders: purchases.len(),
                total_sales: sales.len(),
                total_earnings: paid_sum(&sales),
                total_spent: paid_sum(&purchases),
            },
            recent_orders: purchases.iter().take(5).map(OrderSummary::from).collect(),
            recent_sales: sales.iter().take(5).map(OrderSummary::from).collect(),
        }
    }
}
