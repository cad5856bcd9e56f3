//! Capability checks for the authenticated caller.
//!
//! Handlers ask `actor.require(Permission::...)` instead of comparing roles
//! inline, so every ownership and role rule lives here.

use crate::{
    errors::HandlerError,
    models::{
        book::{Book, BookStatus},
        order::{Order, RatingRole},
        user::{Role, User},
    },
};

/// The authenticated caller, resolved from the bearer token against the
/// user store on every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: Role,
    pub name: String,
    pub email: String,
}

impl From<&User> for Actor {
    fn from(value: &User) -> Self {
        Self {
            id: value.id.clone(),
            role: value.role,
            name: value.name.clone(),
            email: value.email.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Permission<'a> {
    /// Read a listing regardless of moderation status.
    ViewBook(&'a Book),
    EditBook(&'a Book),
    /// Put a book in the cart or wishlist, or order it.
    BuyBook(&'a Book),
    ViewOrder(&'a Order),
    UpdateOrderStatus(&'a Order),
    CancelOrder(&'a Order),
    RateOrder(&'a Order, RatingRole),
    Moderate,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn can(&self, permission: Permission<'_>) -> bool {
        match permission {
            Permission::ViewBook(book) | Permission::EditBook(book) => {
                self.is_admin() || book.seller == self.id
            }
            Permission::BuyBook(book) => book.seller != self.id,
            Permission::ViewOrder(order) | Permission::CancelOrder(order) => {
                self.is_admin() || order.buyer == self.id || order.seller == self.id
            }
            Permission::UpdateOrderStatus(order) => self.is_admin() || order.seller == self.id,
            Permission::RateOrder(order, role) => match role {
                RatingRole::Buyer => order.buyer == self.id,
                RatingRole::Seller => order.seller == self.id,
            },
            Permission::Moderate => self.is_admin(),
        }
    }

    pub fn require(&self, permission: Permission<'_>) -> Result<(), HandlerError> {
        if self.can(permission) {
            return Ok(());
        }
        let message = match permission {
            Permission::ViewBook(_) => "Not authorized to view this book",
            Permission::EditBook(_) => "Not authorized to modify this book",
            Permission::BuyBook(_) => "Cannot purchase your own book",
            Permission::ViewOrder(_) => "Not authorized to view this order",
            Permission::UpdateOrderStatus(_) => "Not authorized to update this order",
            Permission::CancelOrder(_) => "Not authorized to cancel this order",
            Permission::RateOrder(..) => "Not authorized to rate this order",
            Permission::Moderate => "Admin access required",
        };
        Err(HandlerError::forbidden(message))
    }
}

/// Approved listings are public; anything else is only visible to its seller
/// and to admins. Callers report invisible books as not found.
pub fn book_visible(actor: Option<&Actor>, book: &Book) -> bool {
    book.status == BookStatus::Approved
        || actor.is_some_and(|a| a.can(Permission::ViewBook(book)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::book::tests::sample_request;

    fn actor(id: &str, role: Role) -> Actor {
        Actor {
            id: id.to_string(),
            role,
            name: id.to_string(),
            email: format!("{id}@example.com"),
        }
    }

    fn book() -> Book {
        let seller = User::new(
            "seller".to_string(),
            "Seller".to_string(),
            "seller@example.com".to_string(),
            "h".to_string(),
            Role::User,
        );
        Book::new_from_request(&seller, sample_request(), Vec::new())
    }

    #[test]
    fn pending_book_visibility() {
        let b = book();
        assert!(!book_visible(None, &b));
        assert!(!book_visible(Some(&actor("other", Role::User)), &b));
        assert!(book_visible(Some(&actor("seller", Role::User)), &b));
        assert!(book_visible(Some(&actor("root", Role::Admin)), &b));

        let mut approved = b;
        approved.status = BookStatus::Approved;
        assert!(book_visible(None, &approved));
    }

    #[test]
    fn edit_requires_owner_or_admin() {
        let b = book();
        let err = actor("other", Role::User)
            .require(Permission::EditBook(&b))
            .unwrap_err();
        assert!(matches!(err, HandlerError::Forbidden(_)));
        assert!(actor("root", Role::Admin)
            .require(Permission::EditBook(&b))
            .is_ok());
        assert!(!actor("seller", Role::User).can(Permission::BuyBook(&b)));
        assert!(!actor("seller", Role::User).can(Permission::Moderate));
    }

    #[test]
    fn denial_messages_name_the_action() {
        let b = book();
        let other = actor("other", Role::User);
        let err = other.require(Permission::ViewBook(&b)).unwrap_err();
        assert_eq!(err.to_string(), "Not authorized to view this book");
        let err = other.require(Permission::EditBook(&b)).unwrap_err();
        assert_eq!(err.to_string(), "Not authorized to modify this book");
    }
}
