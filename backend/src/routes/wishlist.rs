use std::sync::Arc;

use axum::extract::{Json, Path, State};
use utoipa_axum::{router::OpenApiRouter, routes};
use validator::Validate;

use super::{load_book, load_user, HandlerResult};
use crate::{
    errors::HandlerError,
    models::{
        book::{Book, BookStatus},
        cart::{WishlistRequest, WishlistResponse},
        ApiResponse, PlainSuccessResponse,
    },
    permissions::{Actor, Permission},
    state::AppState,
};

pub fn router() -> OpenApiRouter<Arc<AppState>> {
    OpenApiRouter::new()
        .routes(routes!(get_wishlist, add_to_wishlist, clear_wishlist))
        .routes(routes!(remove_from_wishlist))
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Wishlist",
    responses(
        (status = OK, description = "Wishlisted books that are still available", body = WishlistResponse),
        (status = UNAUTHORIZED, description = "Missing or invalid token", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn get_wishlist(
    actor: Actor,
    State(state): State<Arc<AppState>>,
) -> HandlerResult<ApiResponse<WishlistResponse>> {
    let user = load_user(&state, &actor.id).await?;

    let mut wishlist = Vec::with_capacity(user.wishlist.len());
    for id in &user.wishlist {
        if let Some(book) = state.db.get::<Book>(id).await? {
            if book.status == BookStatus::Approved {
                wishlist.push(book.view());
            }
        }
    }

    Ok(ApiResponse::ok(WishlistResponse { wishlist }))
}

#[utoipa::path(
    post,
    path = "/",
    tag = "Wishlist",
    request_body = WishlistRequest,
    responses(
        (status = OK, description = "Book wishlisted", body = PlainSuccessResponse),
        (status = BAD_REQUEST, description = "Unavailable, own listing or already wishlisted", body = HandlerError),
        (status = NOT_FOUND, description = "Book not found", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn add_to_wishlist(
    actor: Actor,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<WishlistRequest>,
) -> HandlerResult<ApiResponse<()>> {
    payload.validate()?;
    let book = load_book(&state, &payload.book_id).await?;
    if book.status != BookStatus::Approved {
        return Err(HandlerError::bad_request("Book is not available"));
    }
    if !actor.can(Permission::BuyBook(&book)) {
        return Err(HandlerError::bad_request(
            "Cannot add your own book to wishlist",
        ));
    }

    let mut user = load_user(&state, &actor.id).await?;
    if !user.add_to_wishlist(&book.id) {
        return Err(HandlerError::bad_request("Book already in wishlist"));
    }
    user.touch();
    state.db.save(&mut user).await?;

    Ok(ApiResponse::message("Book added to wishlist successfully"))
}

#[utoipa::path(
    delete,
    path = "/{bookId}",
    tag = "Wishlist",
    params(
        ("bookId" = String, Path, description = "Book ID", format = Ulid),
    ),
    responses(
        (status = OK, description = "Book removed", body = PlainSuccessResponse),
        (status = BAD_REQUEST, description = "Book not in wishlist", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn remove_from_wishlist(
    actor: Actor,
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<String>,
) -> HandlerResult<ApiResponse<()>> {
    let mut user = load_user(&state, &actor.id).await?;
    if !user.remove_from_wishlist(&book_id) {
        return Err(HandlerError::bad_request("Book not in wishlist"));
    }
    user.touch();
    state.db.save(&mut user).await?;

    Ok(ApiResponse::message("Book removed from wishlist successfully"))
}

#[utoipa::path(
    delete,
    path = "/",
    tag = "Wishlist",
    responses(
        (status = OK, description = "Wishlist emptied", body = PlainSuccessResponse),
    ),
    security(("http-jwt" = [])),
)]
async fn clear_wishlist(
    actor: Actor,
    State(state): State<Arc<AppState>>,
) -> HandlerResult<ApiResponse<()>> {
    let mut user = load_user(&state, &actor.id).await?;
    if !user.wishlist.is_empty() {
        user.wishlist.clear();
        user.touch();
        state.db.save(&mut user).await?;
    }
    Ok(ApiResponse::message("Wishlist cleared successfully"))
}
