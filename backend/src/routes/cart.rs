use std::sync::Arc;

use axum::extract::{Json, Path, State};
use lambda_http::tracing;
use utoipa_axum::{router::OpenApiRouter, routes};
use validator::Validate;

use super::{load_book, load_user, HandlerResult};
use crate::{
    errors::HandlerError,
    models::{
        book::{Book, BookStatus},
        cart::{AddToCartRequest, CartSummary, UpdateCartRequest},
        ApiResponse, PlainSuccessResponse,
    },
    permissions::{Actor, Permission},
    state::AppState,
};

pub fn router() -> OpenApiRouter<Arc<AppState>> {
    OpenApiRouter::new()
        .routes(routes!(get_cart, add_to_cart, clear_cart))
        .routes(routes!(update_cart_item, remove_from_cart))
        .routes(routes!(move_to_wishlist))
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Cart",
    responses(
        (status = OK, description = "Cart with totals; unavailable books are dropped", body = CartSummary),
        (status = UNAUTHORIZED, description = "Missing or invalid token", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn get_cart(
    actor: Actor,
    State(state): State<Arc<AppState>>,
) -> HandlerResult<ApiResponse<CartSummary>> {
    let mut user = load_user(&state, &actor.id).await?;

    let mut lines = Vec::with_capacity(user.cart.len());
    for line in &user.cart {
        if let Some(book) = state.db.get::<Book>(&line.book).await? {
            if book.status == BookStatus::Approved {
                lines.push((book, line.quantity, line.added_at));
            }
        }
    }

    if lines.len() != user.cart.len() {
        user.cart
            .retain(|l| lines.iter().any(|(book, _, _)| book.id == l.book));
        user.touch();
        // Pruning is an optimisation; the response is correct either way.
        if let Err(e) = state.db.save(&mut user).await {
            tracing::warn!("Failed to prune cart of {}: {}", user.id, e);
        }
    }

    Ok(ApiResponse::ok(CartSummary::new(lines)?))
}

#[utoipa::path(
    post,
    path = "/",
    tag = "Cart",
    request_body = AddToCartRequest,
    responses(
        (status = OK, description = "Book added to cart", body = PlainSuccessResponse),
        (status = BAD_REQUEST, description = "Book unavailable or own listing", body = HandlerError),
        (status = NOT_FOUND, description = "Book not found", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn add_to_cart(
    actor: Actor,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AddToCartRequest>,
) -> HandlerResult<ApiResponse<()>> {
    payload.validate()?;
    let book = load_book(&state, &payload.book_id).await?;
    book.ensure_available()?;
    if !actor.can(Permission::BuyBook(&book)) {
        return Err(HandlerError::bad_request("Cannot add your own book to cart"));
    }

    let mut user = load_user(&state, &actor.id).await?;
    user.add_to_cart(&book.id, payload.quantity.unwrap_or(1))?;
    user.touch();
    state.db.save(&mut user).await?;

    Ok(ApiResponse::message("Book added to cart successfully"))
}

#[utoipa::path(
    put,
    path = "/{bookId}",
    tag = "Cart",
    params(
        ("bookId" = String, Path, description = "Book ID", format = Ulid),
    ),
    request_body = UpdateCartRequest,
    responses(
        (status = OK, description = "Quantity updated", body = PlainSuccessResponse),
        (status = BAD_REQUEST, description = "Quantity below 1", body = HandlerError),
        (status = NOT_FOUND, description = "Book not in cart", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn update_cart_item(
    actor: Actor,
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<String>,
    Json(payload): Json<UpdateCartRequest>,
) -> HandlerResult<ApiResponse<()>> {
    payload.validate()?;
    let mut user = load_user(&state, &actor.id).await?;

    let line = user
        .cart
        .iter_mut()
        .find(|l| l.book == book_id)
        .ok_or_else(|| HandlerError::not_found("Book not found in cart"))?;
    line.quantity = payload.quantity;
    user.touch();
    state.db.save(&mut user).await?;

    Ok(ApiResponse::message("Cart item updated successfully"))
}

#[utoipa::path(
    delete,
    path = "/{bookId}",
    tag = "Cart",
    params(
        ("bookId" = String, Path, description = "Book ID", format = Ulid),
    ),
    responses(
        (status = OK, description = "Book removed", body = PlainSuccessResponse),
        (status = NOT_FOUND, description = "Book not in cart", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn remove_from_cart(
    actor: Actor,
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<String>,
) -> HandlerResult<ApiResponse<()>> {
    let mut user = load_user(&state, &actor.id).await?;
    if !user.remove_from_cart(&book_id) {
        return Err(HandlerError::not_found("Book not found in cart"));
    }
    user.touch();
    state.db.save(&mut user).await?;

    Ok(ApiResponse::message("Book removed from cart successfully"))
}

#[utoipa::path(
    delete,
    path = "/",
    tag = "Cart",
    responses(
        (status = OK, description = "Cart emptied", body = PlainSuccessResponse),
    ),
    security(("http-jwt" = [])),
)]
async fn clear_cart(
    actor: Actor,
    State(state): State<Arc<AppState>>,
) -> HandlerResult<ApiResponse<()>> {
    let mut user = load_user(&state, &actor.id).await?;
    if !user.cart.is_empty() {
        user.cart.clear();
        user.touch();
        state.db.save(&mut user).await?;
    }
    Ok(ApiResponse::message("Cart cleared successfully"))
}

/// Cart and wishlist live on the same user document, so the move is one write.
#[utoipa::path(
    post,
    path = "/{bookId}/move-to-wishlist",
    tag = "Cart",
    params(
        ("bookId" = String, Path, description = "Book ID", format = Ulid),
    ),
    responses(
        (status = OK, description = "Book moved", body = PlainSuccessResponse),
        (status = NOT_FOUND, description = "Book not in cart", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn move_to_wishlist(
    actor: Actor,
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<String>,
) -> HandlerResult<ApiResponse<()>> {
    let mut user = load_user(&state, &actor.id).await?;
    if !user.remove_from_cart(&book_id) {
        return Err(HandlerError::not_found("Book not found in cart"));
    }
    user.add_to_wishlist(&book_id);
    user.touch();
    state.db.save(&mut user).await?;

    Ok(ApiResponse::message("Book moved to wishlist successfully"))
}
