pub const USER_TABLE: &str = "kitabyatra-users";
pub const BOOK_TABLE: &str = "kitabyatra-books";
pub const ORDER_TABLE: &str = "kitabyatra-orders";

pub const TOKEN_AUDIENCE: &str = "kitabyatra";

/// Flat fee charged for `delivery` orders.
pub const DELIVERY_FEE: u64 = 100;

pub const MAX_IMAGES_PER_BOOK: usize = 10;

/// Prices are whole rupees.
pub const MAX_PRICE: u64 = 10_000_000;
/// Upper bound of a cart line or order quantity.
pub const MAX_QUANTITY: u32 = 100;
pub const UPLOAD_URL_PREFIX: &str = "/uploads";
/// Request body cap for multipart listing uploads.
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
