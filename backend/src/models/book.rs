use core::fmt;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError, ValidationErrors};

use super::{
    user::{Address, User},
    PageQuery,
};
use crate::{constants::BOOK_TABLE, errors::HandlerError, images::Upload, store::Document};

/// Moderation status of a listing.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BookStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Sold,
    Inactive,
}

impl fmt::Display for BookStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let out = match *self {
            BookStatus::Pending => "pending",
            BookStatus::Approved => "approved",
            BookStatus::Rejected => "rejected",
            BookStatus::Sold => "sold",
            BookStatus::Inactive => "inactive",
        };
        write!(f, "{}", out)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, ToSchema)]
pub enum Category {
    Academic,
    Fiction,
    #[serde(rename = "Non-Fiction")]
    NonFiction,
    #[serde(rename = "Self-Help")]
    SelfHelp,
    Biography,
    Science,
    History,
    Romance,
    Mystery,
    Fantasy,
    Comics,
    Children,
    Reference,
    Textbook,
    Professional,
    Religious,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Condition {
    New,
    LikeNew,
    VeryGood,
    Good,
    Fair,
    Poor,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMethod {
    Pickup,
    Delivery,
    Courier,
    Meetup,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub public_id: String,
    pub url: String,
}

/// Seller contact details captured when the listing is created.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SellerInfo {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Address,
}

impl From<&User> for SellerInfo {
    fn from(value: &User) -> Self {
        Self {
            name: value.name.clone(),
            email: value.email.clone(),
            phone: value.phone.clone(),
            address: value.address.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    /// Reviewer id.
    pub user: String,
    pub user_name: String,
    /// 1 to 5.
    pub rating: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RatingSummary {
    pub average: f64,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    /// Ulid
    pub id: String,
    #[serde(default)]
    pub version: u64,
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub isbn: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub publication_year: Option<u32>,
    #[serde(default)]
    pub edition: Option<String>,
    pub language: String,
    pub category: Category,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub pages: Option<u32>,
    pub condition: Condition,
    #[serde(default)]
    pub condition_description: Option<String>,
    #[serde(default)]
    pub original_price: Option<u64>,
    pub selling_price: u64,
    #[serde(default)]
    pub negotiable: bool,
    pub description: String,
    #[serde(default)]
    pub highlights: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub images: Vec<Image>,
    /// Seller's user id.
    pub seller: String,
    pub seller_info: SellerInfo,
    #[serde(default)]
    pub delivery_options: Vec<DeliveryMethod>,
    #[serde(default)]
    pub meetup_locations: Vec<String>,
    #[serde(default)]
    pub reason_for_selling: Option<String>,
    pub status: BookStatus,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub liked_by: Vec<String>,
    #[serde(default)]
    pub reviews: Vec<Review>,
    #[serde(default)]
    pub sold_to: Option<String>,
    #[serde(default)]
    pub sold_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for Book {
    const TABLE: &'static str = BOOK_TABLE;

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

impl Book {
    pub fn new_from_request(seller: &User, req: CreateBookRequest, images: Vec<Image>) -> Self {
        let now = Utc::now();
        Self {
            id: Ulid::new().to_string(),
            version: 0,
            title: req.title.trim().to_string(),
            author: req.author.trim().to_string(),
            isbn: req.isbn,
            publisher: req.publisher,
            publication_year: req.publication_year,
            edition: req.edition,
            language: req.language.unwrap_or_else(|| "English".to_string()),
            category: req.category,
            genre: req.genre,
            pages: req.pages,
            condition: req.condition,
            condition_description: req.condition_description,
            original_price: req.original_price,
            selling_price: req.selling_price,
            negotiable: req.negotiable,
            description: req.description.trim().to_string(),
            highlights: req.highlights,
            tags: req.tags,
            images,
            seller: seller.id.clone(),
            seller_info: SellerInfo::from(seller),
            delivery_options: req.delivery_options,
            meetup_locations: req.meetup_locations,
            reason_for_selling: req.reason_for_selling,
            status: BookStatus::Pending,
            views: 0,
            liked_by: Vec::new(),
            reviews: Vec::new(),
            sold_to: None,
            sold_at: None,
            admin_notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn likes(&self) -> usize {
        self.liked_by.len()
    }

    pub fn rating(&self) -> RatingSummary {
        let count = self.reviews.len();
        let average = if count == 0 {
            0.0
        } else {
            self.reviews.iter().map(|r| r.rating as f64).sum::<f64>() / count as f64
        };
        RatingSummary { average, count }
    }

    /// Flips the caller's like and returns whether the book is now liked.
    pub fn toggle_like(&mut self, user_id: &str) -> bool {
        if let Some(pos) = self.liked_by.iter().position(|u| u == user_id) {
            self.liked_by.remove(pos);
            false
        } else {
            self.liked_by.push(user_id.to_string());
            true
        }
    }

    pub fn add_review(&mut self, reviewer: &User, req: ReviewRequest) -> Result<(), HandlerError> {
        if self.reviews.iter().any(|r| r.user == reviewer.id) {
            return Err(HandlerError::conflict("You have already reviewed this book"));
        }
        self.reviews.push(Review {
            user: reviewer.id.clone(),
            user_name: reviewer.name.clone(),
            rating: req.rating,
            comment: req.comment,
            created_at: Utc::now(),
        });
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Sold listings are immutable.
    pub fn ensure_mutable(&self) -> Result<(), HandlerError> {
        if self.status == BookStatus::Sold {
            return Err(HandlerError::conflict("A sold book cannot be modified"));
        }
        Ok(())
    }

    pub fn ensure_available(&self) -> Result<(), HandlerError> {
        if self.status != BookStatus::Approved {
            return Err(HandlerError::bad_request("Book is not available for purchase"));
        }
        Ok(())
    }

    pub fn moderate(&mut self, status: BookStatus, admin_notes: Option<String>) {
        self.status = status;
        self.admin_notes = admin_notes;
        self.updated_at = Utc::now();
    }

    pub fn mark_sold(&mut self, buyer_id: &str) {
        let now = Utc::now();
        self.status = BookStatus::Sold;
        self.sold_to = Some(buyer_id.to_string());
        self.sold_at = Some(now);
        self.updated_at = now;
    }

    pub fn apply_update(&mut self, patch: UpdateBookRequest) {
        if let Some(v) = patch.title {
            self.title = v.trim().to_string();
        }
        if let Some(v) = patch.author {
            self.author = v.trim().to_string();
        }
        if let Some(v) = patch.isbn {
            self.isbn = Some(v);
        }
        if let Some(v) = patch.publisher {
            self.publisher = Some(v);
        }
        if let Some(v) = patch.publication_year {
            self.publication_year = Some(v);
        }
        if let Some(v) = patch.edition {
            self.edition = Some(v);
        }
        if let Some(v) = patch.language {
            self.language = v;
        }
        if let Some(v) = patch.category {
            self.category = v;
        }
        if let Some(v) = patch.genre {
            self.genre = Some(v);
        }
        if let Some(v) = patch.pages {
            self.pages = Some(v);
        }
        if let Some(v) = patch.condition {
            self.condition = v;
        }
        if let Some(v) = patch.condition_description {
            self.condition_description = Some(v);
        }
        if let Some(v) = patch.original_price {
            self.original_price = Some(v);
        }
        if let Some(v) = patch.selling_price {
            self.selling_price = v;
        }
        if let Some(v) = patch.negotiable {
            self.negotiable = v;
        }
        if let Some(v) = patch.description {
            self.description = v.trim().to_string();
        }
        if let Some(v) = patch.highlights {
            self.highlights = v;
        }
        if let Some(v) = patch.tags {
            self.tags = v;
        }
        if let Some(v) = patch.delivery_options {
            self.delivery_options = v;
        }
        if let Some(v) = patch.meetup_locations {
            self.meetup_locations = v;
        }
        if let Some(v) = patch.reason_for_selling {
            self.reason_for_selling = Some(v);
        }
        self.updated_at = Utc::now();
    }

    /// Case-insensitive match on title, author and description.
    pub fn matches_text(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        needle.split_whitespace().any(|term| {
            self.title.to_lowercase().contains(term)
                || self.author.to_lowercase().contains(term)
                || self.description.to_lowercase().contains(term)
        })
    }

    pub fn view(self) -> BookView {
        let likes = self.likes();
        let rating = self.rating();
        BookView {
            book: self,
            likes,
            rating,
        }
    }
}

/// A book together with its derived like count and rating.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookView {
    #[serde(flatten)]
    pub book: Book,
    pub likes: usize,
    pub rating: RatingSummary,
}

/// Runs the derived rules plus the publication year bound, which depends on
/// the current date.
pub fn validate_listing<V: Validate>(
    payload: &V,
    publication_year: Option<u32>,
) -> Result<(), ValidationErrors> {
    let mut errors = payload.validate().err().unwrap_or_else(ValidationErrors::new);
    if let Some(year) = publication_year {
        if year < 1000 || year > Utc::now().year() as u32 {
            let mut err = ValidationError::new("range");
            err.message =
                Some("Publication year must be between 1000 and the current year".into());
            errors.add("publication_year", err);
        }
    }
    if errors.errors().is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookRequest {
    #[validate(length(min = 1, max = 200, message = "Title is required and must be less than 200 characters"))]
    pub title: String,
    #[validate(length(min = 1, max = 100, message = "Author is required and must be less than 100 characters"))]
    pub author: String,
    pub isbn: Option<String>,
    #[validate(length(max = 100, message = "Publisher name cannot exceed 100 characters"))]
    pub publisher: Option<String>,
    pub publication_year: Option<u32>,
    pub edition: Option<String>,
    pub language: Option<String>,
    pub category: Category,
    pub genre: Option<String>,
    #[validate(range(min = 1, message = "Pages must be at least 1"))]
    pub pages: Option<u32>,
    pub condition: Condition,
    #[validate(length(max = 500, message = "Condition description cannot exceed 500 characters"))]
    pub condition_description: Option<String>,
    #[validate(range(max = 10000000, message = "Original price cannot exceed 10000000"))]
    pub original_price: Option<u64>,
    #[validate(range(max = 10000000, message = "Selling price cannot exceed 10000000"))]
    pub selling_price: u64,
    #[serde(default)]
    pub negotiable: bool,
    #[validate(length(min = 10, max = 2000, message = "Description must be between 10 and 2000 characters"))]
    pub description: String,
    #[serde(default)]
    pub highlights: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub delivery_options: Vec<DeliveryMethod>,
    #[serde(default)]
    pub meetup_locations: Vec<String>,
    pub reason_for_selling: Option<String>,
}

/// Seller editable fields; status and ownership are never patchable.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBookRequest {
    #[validate(length(min = 1, max = 200, message = "Title is required and must be less than 200 characters"))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 100, message = "Author is required and must be less than 100 characters"))]
    pub author: Option<String>,
    pub isbn: Option<String>,
    #[validate(length(max = 100, message = "Publisher name cannot exceed 100 characters"))]
    pub publisher: Option<String>,
    pub publication_year: Option<u32>,
    pub edition: Option<String>,
    pub language: Option<String>,
    pub category: Option<Category>,
    pub genre: Option<String>,
    #[validate(range(min = 1, message = "Pages must be at least 1"))]
    pub pages: Option<u32>,
    pub condition: Option<Condition>,
    #[validate(length(max = 500, message = "Condition description cannot exceed 500 characters"))]
    pub condition_description: Option<String>,
    #[validate(range(max = 10000000, message = "Original price cannot exceed 10000000"))]
    pub original_price: Option<u64>,
    #[validate(range(max = 10000000, message = "Selling price cannot exceed 10000000"))]
    pub selling_price: Option<u64>,
    pub negotiable: Option<bool>,
    #[validate(length(min = 10, max = 2000, message = "Description must be between 10 and 2000 characters"))]
    pub description: Option<String>,
    pub highlights: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub delivery_options: Option<Vec<DeliveryMethod>>,
    pub meetup_locations: Option<Vec<String>>,
    pub reason_for_selling: Option<String>,
}

/// Multipart form accepted when creating a listing.
#[derive(Debug, Default, ToSchema)]
pub struct BookUploadForm {
    /// JSON encoded [`CreateBookRequest`].
    pub book: Option<String>,
    /// Up to 10 image files.
    #[schema(value_type = Vec<String>, format = Binary)]
    pub images: Vec<Upload>,
}

impl BookUploadForm {
    /// Parses the `book` field; the images are passed through untouched.
    pub fn into_parts(self) -> Result<(CreateBookRequest, Vec<Upload>), HandlerError> {
        let text = self
            .book
            .ok_or_else(|| HandlerError::bad_request("Missing `book` form field"))?;
        let listing = serde_json::from_str::<CreateBookRequest>(&text)
            .map_err(|e| HandlerError::bad_request(format!("Invalid book data: {}", e)))?;
        Ok((listing, self.images))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: u8,
    #[validate(length(max = 500, message = "Comment must be less than 500 characters"))]
    pub comment: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModerationRequest {
    pub admin_notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LikeResponse {
    pub liked: bool,
    pub total_likes: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BookSort {
    PriceLow,
    PriceHigh,
    #[default]
    Newest,
    Oldest,
    Popular,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct BookQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub category: Option<Category>,
    pub condition: Option<Condition>,
    pub min_price: Option<u64>,
    pub max_price: Option<u64>,
    /// Matches title, author and description.
    pub search: Option<String>,
    pub sort_by: Option<BookSort>,
    /// Only honoured by seller and admin listings.
    pub status: Option<BookStatus>,
}

impl BookQuery {
    pub fn page_query(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            limit: self.limit,
        }
    }

    pub fn matches(&self, book: &Book) -> bool {
        self.category.map_or(true, |c| book.category == c)
            && self.condition.map_or(true, |c| book.condition == c)
            && self.min_price.map_or(true, |p| book.selling_price >= p)
            && self.max_price.map_or(true, |p| book.selling_price <= p)
            && self.status.map_or(true, |s| book.status == s)
            && self
                .search
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .map_or(true, |s| book.matches_text(s))
    }
}

/// Orders books by the requested key; ties fall back to id for stable pages.
pub fn sort_books(books: &mut [Book], sort: BookSort) {
    books.sort_by(|a, b| {
        let primary = match sort {
            BookSort::PriceLow => a.selling_price.cmp(&b.selling_price),
            BookSort::PriceHigh => b.selling_price.cmp(&a.selling_price),
            BookSort::Newest => b.created_at.cmp(&a.created_at),
            BookSort::Oldest => a.created_at.cmp(&b.created_at),
            BookSort::Popular => b.views.cmp(&a.views),
        };
        primary.then_with(|| b.id.cmp(&a.id))
    });
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookList {
    pub books: Vec<BookView>,
    pub pagination: super::Pagination,
}
