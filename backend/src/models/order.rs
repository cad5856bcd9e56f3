use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::{
    book::{Book, Condition, DeliveryMethod, Image},
    user::Address,
    PageQuery, Pagination,
};
use crate::{
    constants::{DELIVERY_FEE, ORDER_TABLE},
    errors::HandlerError,
    store::Document,
};

/// Order lifecycle. `Delivered` and `Cancelled` are terminal.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Placed,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Position along the fulfilment path; `None` for `Cancelled`.
    fn stage(self) -> Option<u8> {
        match self {
            Self::Placed => Some(0),
            Self::Confirmed => Some(1),
            Self::Processing => Some(2),
            Self::Shipped => Some(3),
            Self::Delivered => Some(4),
            Self::Cancelled => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let out = match *self {
            OrderStatus::Placed => "placed",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", out)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CashOnDelivery,
    OnlinePayment,
    BankTransfer,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let out = match *self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        };
        write!(f, "{}", out)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    #[default]
    NotApplicable,
    Pending,
    Processed,
    Failed,
}

/// Which side of the order a rating comes from.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RatingRole {
    Buyer,
    Seller,
}

/// Book data frozen at order time.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookSnapshot {
    pub title: String,
    pub author: String,
    pub condition: Condition,
    pub images: Vec<Image>,
}

impl From<&Book> for BookSnapshot {
    fn from(value: &Book) -> Self {
        Self {
            title: value.title.clone(),
            author: value.author.clone(),
            condition: value.condition,
            images: value.images.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub status: OrderStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Actor's user id.
    pub updated_by: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PartyRating {
    pub rating: u8,
    pub comment: Option<String>,
    pub rated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderRatings {
    /// Given by the buyer.
    pub buyer_rating: Option<PartyRating>,
    /// Given by the seller.
    pub seller_rating: Option<PartyRating>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderNotes {
    pub buyer: Option<String>,
    pub seller: Option<String>,
    pub admin: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Ulid
    pub id: String,
    #[serde(default)]
    pub version: u64,
    /// "ORD" + epoch millis + 0..999, display only.
    pub order_number: String,
    pub buyer: String,
    pub seller: String,
    pub book: String,
    pub book_details: BookSnapshot,
    pub quantity: u32,
    /// Unit price at order time.
    pub price: u64,
    pub total_amount: u64,
    pub delivery_fee: u64,
    pub final_amount: u64,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
    pub delivery_method: DeliveryMethod,
    #[serde(default)]
    pub delivery_address: Option<Address>,
    #[serde(default)]
    pub meetup_location: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub notes: OrderNotes,
    pub timeline: Vec<TimelineEntry>,
    #[serde(default)]
    pub rating: OrderRatings,
    #[serde(default)]
    pub actual_delivery_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancellation_reason: Option<String>,
    #[serde(default)]
    pub cancelled_by: Option<String>,
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub refund_amount: Option<u64>,
    #[serde(default)]
    pub refund_status: RefundStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for Order {
    const TABLE: &'static str = ORDER_TABLE;

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

pub fn delivery_fee(method: DeliveryMethod) -> u64 {
    match method {
        DeliveryMethod::Delivery => DELIVERY_FEE,
        _ => 0,
    }
}

impl Order {
    /// Builds a `placed` order. Payment always starts `pending`; confirmation
    /// arrives later as a separate payment-status update.
    pub fn place(
        buyer_id: &str,
        book: &Book,
        req: CreateOrderRequest,
        order_number: String,
    ) -> Result<Self, HandlerError> {
        book.ensure_available()?;
        if book.seller == buyer_id {
            return Err(HandlerError::bad_request("Cannot purchase your own book"));
        }

        let quantity = req.quantity.unwrap_or(1);
        let fee = delivery_fee(req.delivery_method);
        let (total_amount, final_amount) = book
            .selling_price
            .checked_mul(u64::from(quantity))
            .and_then(|total| Some((total, total.checked_add(fee)?)))
            .ok_or_else(|| HandlerError::bad_request("Order amount is too large"))?;
        let now = Utc::now();

        Ok(Self {
            id: Ulid::new().to_string(),
            version: 0,
            order_number,
            buyer: buyer_id.to_string(),
            seller: book.seller.clone(),
            book: book.id.clone(),
            book_details: BookSnapshot::from(book),
            quantity,
            price: book.selling_price,
            total_amount,
            delivery_fee: fee,
            final_amount,
            payment_method: req.payment_method,
            payment_status: PaymentStatus::Pending,
            order_status: OrderStatus::Placed,
            delivery_method: req.delivery_method,
            delivery_address: req.delivery_address,
            meetup_location: req.meetup_location,
            tracking_number: None,
            notes: OrderNotes {
                buyer: req.notes,
                ..Default::default()
            },
            timeline: vec![TimelineEntry {
                status: OrderStatus::Placed,
                message: "Order has been placed successfully".to_string(),
                timestamp: now,
                updated_by: buyer_id.to_string(),
            }],
            rating: OrderRatings::default(),
            actual_delivery_date: None,
            cancellation_reason: None,
            cancelled_by: None,
            cancelled_at: None,
            refund_amount: None,
            refund_status: RefundStatus::NotApplicable,
            created_at: now,
            updated_at: now,
        })
    }

    fn push_timeline(&mut self, status: OrderStatus, message: String, actor_id: &str) {
        let now = Utc::now();
        self.timeline.push(TimelineEntry {
            status,
            message,
            timestamp: now,
            updated_by: actor_id.to_string(),
        });
        self.updated_at = now;
    }

    /// Moves the order forward along the fulfilment path. Stages may be
    /// skipped; cancelling goes through [`Order::cancel`].
    pub fn advance(
        &mut self,
        actor_id: &str,
        next: OrderStatus,
        message: Option<String>,
        tracking_number: Option<String>,
    ) -> Result<(), HandlerError> {
        if self.order_status.is_terminal() {
            return Err(HandlerError::conflict(format!(
                "Order is already {}",
                self.order_status
            )));
        }
        let (Some(from), Some(to)) = (self.order_status.stage(), next.stage()) else {
            return Err(HandlerError::bad_request("Invalid order status"));
        };
        if to <= from {
            return Err(HandlerError::bad_request(format!(
                "Cannot move order from {} to {}",
                self.order_status, next
            )));
        }

        self.order_status = next;
        if let Some(tracking) = tracking_number.filter(|t| !t.trim().is_empty()) {
            self.tracking_number = Some(tracking.trim().to_string());
        }
        if next == OrderStatus::Delivered {
            self.actual_delivery_date = Some(Utc::now());
            if self.payment_method == PaymentMethod::CashOnDelivery {
                self.payment_status = PaymentStatus::Paid;
            }
        }
        let message = message.unwrap_or_else(|| format!("Order status updated to {}", next));
        self.push_timeline(next, message, actor_id);
        Ok(())
    }

    pub fn cancel(&mut self, actor_id: &str, reason: Option<String>) -> Result<(), HandlerError> {
        if self.order_status.is_terminal() {
            return Err(HandlerError::conflict(format!(
                "Cannot cancel an order that is already {}",
                self.order_status
            )));
        }

        let now = Utc::now();
        self.order_status = OrderStatus::Cancelled;
        self.cancelled_by = Some(actor_id.to_string());
        self.cancelled_at = Some(now);
        if self.payment_status == PaymentStatus::Paid {
            self.refund_status = RefundStatus::Pending;
            self.refund_amount = Some(self.final_amount);
        }
        let message = match &reason {
            Some(r) => format!("Order cancelled. Reason: {}", r),
            None => "Order cancelled".to_string(),
        };
        self.cancellation_reason = reason;
        self.push_timeline(OrderStatus::Cancelled, message, actor_id);
        Ok(())
    }

    /// Payment confirmation or correction, issued outside the order flow.
    pub fn set_payment_status(&mut self, status: PaymentStatus) {
        self.payment_status = status;
        match status {
            PaymentStatus::Refunded => {
                self.refund_status = RefundStatus::Processed;
                self.refund_amount.get_or_insert(self.final_amount);
            }
            PaymentStatus::Paid
                if self.order_status == OrderStatus::Cancelled
                    && self.refund_status == RefundStatus::NotApplicable =>
            {
                self.refund_status = RefundStatus::Pending;
                self.refund_amount = Some(self.final_amount);
            }
            _ => {}
        }
        self.updated_at = Utc::now();
    }

    /// Each side may rate a delivered order once.
    pub fn add_rating(
        &mut self,
        role: RatingRole,
        rating: u8,
        comment: Option<String>,
    ) -> Result<(), HandlerError> {
        if self.order_status != OrderStatus::Delivered {
            return Err(HandlerError::bad_request("Can only rate completed orders"));
        }
        let slot = match role {
            RatingRole::Buyer => &mut self.rating.buyer_rating,
            RatingRole::Seller => &mut self.rating.seller_rating,
        };
        if slot.is_some() {
            return Err(HandlerError::conflict("You have already rated this order"));
        }
        *slot = Some(PartyRating {
            rating,
            comment,
            rated_at: Utc::now(),
        });
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "Book ID is required"))]
    pub book_id: String,
    #[validate(range(min = 1, max = 100, message = "Quantity must be between 1 and 100"))]
    pub quantity: Option<u32>,
    pub payment_method: PaymentMethod,
    pub delivery_method: DeliveryMethod,
    pub delivery_address: Option<Address>,
    pub meetup_location: Option<String>,
    #[validate(length(max = 500, message = "Notes must be less than 500 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    pub message: Option<String>,
    pub tracking_number: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CancelOrderRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RatingRequest {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: u8,
    #[validate(length(max = 500, message = "Comment must be less than 500 characters"))]
    pub comment: Option<String>,
    /// Side the caller is rating from.
    #[serde(rename = "type")]
    pub role: RatingRole,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusRequest {
    pub payment_status: PaymentStatus,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct OrderQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
}

impl OrderQuery {
    pub fn page_query(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            limit: self.limit,
        }
    }

    pub fn matches(&self, order: &Order) -> bool {
        self.status.map_or(true, |s| order.order_status == s)
            && self.payment_status.map_or(true, |s| order.payment_status == s)
    }
}

/// Newest first, ties broken by id.
pub fn sort_orders(orders: &mut [Order]) {
    orders.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderList {
    pub orders: Vec<Order>,
    pub pagination: Pagination,
}

/// Compact order row for dashboards.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub id: String,
    pub order_number: String,
    pub buyer: String,
    pub seller: String,
    pub book_title: String,
    pub total_amount: u64,
    pub final_amount: u64,
    pub order_status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&Order> for OrderSummary {
    fn from(value: &Order) -> Self {
        Self {
            id: value.id.clone(),
            order_number: value.order_number.clone(),
            buyer: value.buyer.clone(),
            seller: value.seller.clone(),
            book_title: value.book_details.title.clone(),
            total_amount: value.total_amount,
            final_amount: value.final_amount,
            order_status: value.order_status,
            payment_status: value.payment_status,
            created_at: value.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        book::{tests::sample_request, BookStatus},
        user::{Role, User},
    };

    fn approved_book() -> Book {
        let seller = User::new(
            "seller".to_string(),
            "Seller".to_string(),
            "seller@example.com".to_string(),
            "hash".to_string(),
            Role::User,
        );
        let mut book = Book::new_from_request(&seller, sample_request(), Vec::new());
        book.status = BookStatus::Approved;
        book
    }

    fn request(payment: PaymentMethod, delivery: DeliveryMethod, qty: u32) -> CreateOrderRequest {
        CreateOrderRequest {
            book_id: String::new(),
            quantity: Some(qty),
            payment_method: payment,
            delivery_method: delivery,
            delivery_address: None,
            meetup_location: None,
            notes: None,
        }
    }

    fn placed(payment: PaymentMethod) -> Order {
        Order::place(
            "buyer",
            &approved_book(),
            request(payment, DeliveryMethod::Pickup, 1),
            "ORD1".to_string(),
        )
        .unwrap()
    }

    #[test]
    fn amounts_include_flat_delivery_fee() {
        let book = approved_book();
        for (method, fee) in [
            (DeliveryMethod::Delivery, 100),
            (DeliveryMethod::Pickup, 0),
            (DeliveryMethod::Courier, 0),
            (DeliveryMethod::Meetup, 0),
        ] {
            let o = Order::place(
                "buyer",
                &book,
                request(PaymentMethod::OnlinePayment, method, 3),
                "ORD".to_string(),
            )
            .unwrap();
            assert_eq!(o.total_amount, 250 * 3);
            assert_eq!(o.final_amount, 250 * 3 + fee);
            assert_eq!(o.payment_status, PaymentStatus::Pending);
            assert_eq!(o.order_status, OrderStatus::Placed);
            assert_eq!(o.timeline.len(), 1);
        }
    }

    #[test]
    fn cannot_buy_unapproved_or_own_book() {
        let mut book = approved_book();
        let req = request(PaymentMethod::CashOnDelivery, DeliveryMethod::Pickup, 1);
        assert!(Order::place("seller", &book, req.clone(), "O".to_string()).is_err());
        book.status = BookStatus::Pending;
        assert!(Order::place("buyer", &book, req, "O".to_string()).is_err());
    }

    #[test]
    fn overflowing_amount_is_rejected() {
        let mut book = approved_book();
        book.selling_price = u64::MAX / 2 + 1;
        let req = request(PaymentMethod::CashOnDelivery, DeliveryMethod::Pickup, 2);
        let err = Order::place("buyer", &book, req, "O".to_string()).unwrap_err();
        assert!(matches!(err, HandlerError::BadRequest(_)));

        book.selling_price = u64::MAX;
        let req = request(PaymentMethod::CashOnDelivery, DeliveryMethod::Delivery, 1);
        assert!(Order::place("buyer", &book, req, "O".to_string()).is_err());
    }

    #[test]
    fn forward_moves_only() {
        let mut o = placed(PaymentMethod::OnlinePayment);
        o.advance("seller", OrderStatus::Shipped, None, Some("TRK1".to_string()))
            .unwrap();
        assert_eq!(o.tracking_number.as_deref(), Some("TRK1"));
        let err = o
            .advance("seller", OrderStatus::Confirmed, None, None)
            .unwrap_err();
        assert!(matches!(err, HandlerError::BadRequest(_)));
        assert!(o.advance("seller", OrderStatus::Cancelled, None, None).is_err());
        assert_eq!(o.timeline.len(), 2);
    }

    #[test]
    fn delivering_cod_marks_paid() {
        let mut o = placed(PaymentMethod::CashOnDelivery);
        o.advance("seller", OrderStatus::Delivered, None, None).unwrap();
        assert_eq!(o.payment_status, PaymentStatus::Paid);
        assert!(o.actual_delivery_date.is_some());

        let mut o = placed(PaymentMethod::BankTransfer);
        o.advance("seller", OrderStatus::Delivered, None, None).unwrap();
        assert_eq!(o.payment_status, PaymentStatus::Pending);
    }

    #[test]
    fn terminal_states_reject_changes() {
        let mut o = placed(PaymentMethod::OnlinePayment);
        o.advance("seller", OrderStatus::Delivered, None, None).unwrap();
        assert!(matches!(
            o.cancel("buyer", None),
            Err(HandlerError::Conflict(_))
        ));
        assert!(matches!(
            o.advance("seller", OrderStatus::Delivered, None, None),
            Err(HandlerError::Conflict(_))
        ));

        let mut o = placed(PaymentMethod::OnlinePayment);
        o.cancel("buyer", Some("changed my mind".to_string())).unwrap();
        assert_eq!(o.order_status, OrderStatus::Cancelled);
        assert!(matches!(
            o.cancel("buyer", None),
            Err(HandlerError::Conflict(_))
        ));
    }

    #[test]
    fn cancel_from_each_open_state() {
        for status in [
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipped,
        ] {
            let mut o = placed(PaymentMethod::CashOnDelivery);
            o.advance("seller", status, None, None).unwrap();
            o.cancel("seller", Some("out of stock".to_string())).unwrap();
            assert_eq!(o.order_status, OrderStatus::Cancelled);
            assert_eq!(o.cancelled_by.as_deref(), Some("seller"));
            assert_eq!(o.refund_status, RefundStatus::NotApplicable);
            let last = o.timeline.last().unwrap();
            assert_eq!(last.message, "Order cancelled. Reason: out of stock");
        }
    }

    #[test]
    fn cancelling_paid_order_opens_refund() {
        let mut o = placed(PaymentMethod::OnlinePayment);
        o.set_payment_status(PaymentStatus::Paid);
        o.cancel("buyer", None).unwrap();
        assert_eq!(o.refund_status, RefundStatus::Pending);
        assert_eq!(o.refund_amount, Some(o.final_amount));

        o.set_payment_status(PaymentStatus::Refunded);
        assert_eq!(o.refund_status, RefundStatus::Processed);
    }

    #[test]
    fn ratings_are_write_once_per_role() {
        let mut o = placed(PaymentMethod::OnlinePayment);
        assert!(matches!(
            o.add_rating(RatingRole::Buyer, 5, None),
            Err(HandlerError::BadRequest(_))
        ));
        o.advance("seller", OrderStatus::Delivered, None, None).unwrap();
        o.add_rating(RatingRole::Buyer, 5, Some("great".to_string()))
            .unwrap();
        assert!(matches!(
            o.add_rating(RatingRole::Buyer, 1, None),
            Err(HandlerError::Conflict(_))
        ));
        o.add_rating(RatingRole::Seller, 4, None).unwrap();
        assert_eq!(o.rating.buyer_rating.as_ref().unwrap().rating, 5);
    }
}
