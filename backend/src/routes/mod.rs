use crate::{
    errors::HandlerError,
    models::{book::Book, order::Order, user::User},
    state::AppState,
};

pub mod admin;
pub mod auth;
pub mod book;
pub mod cart;
pub mod order;
pub mod user;
pub mod wishlist;

pub type HandlerResult<T> = Result<T, HandlerError>;

pub(crate) async fn load_book(state: &AppState, id: &str) -> HandlerResult<Book> {
    state
        .db
        .get::<Book>(id)
        .await?
        .ok_or_else(|| HandlerError::not_found("Book not found"))
}

pub(crate) async fn load_user(state: &AppState, id: &str) -> HandlerResult<User> {
    state
        .db
        .get::<User>(id)
        .await?
        .ok_or_else(|| HandlerError::not_found("User not found"))
}

pub(crate) async fn load_order(state: &AppState, id: &str) -> HandlerResult<Order> {
    state
        .db
        .get::<Order>(id)
        .await?
        .ok_or_else(|| HandlerError::not_found("Order not found"))
}
