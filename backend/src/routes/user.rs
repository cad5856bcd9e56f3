use std::sync::Arc;

use axum::extract::{Path, Query, State};
use utoipa_axum::{router::OpenApiRouter, routes};

use super::{book::book_page, load_user, HandlerResult};
use crate::{
    errors::HandlerError,
    models::{
        admin::user_matches,
        book::{Book, BookList, BookQuery, BookStatus},
        order::Order,
        paginate,
        user::{
            PublicUserResponse, PublicUserStats, Role, User, UserDashboard, UserDirectory,
            UserSearchQuery,
        },
        ApiResponse, PageQuery, DEFAULT_PAGE_SIZE,
    },
    permissions::Actor,
    state::AppState,
};

const SELLER_PAGE_SIZE: u32 = 12;

pub fn router() -> OpenApiRouter<Arc<AppState>> {
    OpenApiRouter::new()
        .routes(routes!(search_users))
        .routes(routes!(dashboard))
        .routes(routes!(get_user))
        .routes(routes!(get_user_books))
}

#[utoipa::path(
    get,
    path = "/search",
    tag = "Users",
    params(UserSearchQuery),
    responses(
        (status = OK, description = "Active users matching name or e-mail", body = UserDirectory),
        (status = BAD_REQUEST, description = "Query shorter than 2 characters", body = HandlerError),
    ),
)]
async fn search_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserSearchQuery>,
) -> HandlerResult<ApiResponse<UserDirectory>> {
    let needle = query.q.as_deref().map(str::trim).unwrap_or_default();
    if needle.chars().count() < 2 {
        return Err(HandlerError::bad_request(
            "Search query must be at least 2 characters long",
        ));
    }

    let mut users = state.db.list::<User>().await?;
    users.retain(|u| u.role == Role::User && u.is_active && user_matches(u, needle));
    users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));

    let (page, limit) = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .resolve(DEFAULT_PAGE_SIZE);
    let (users, pagination) = paginate(users, page, limit);
    Ok(ApiResponse::ok(UserDirectory {
        users: users.iter().map(User::public_profile).collect(),
        pagination,
    }))
}

#[utoipa::path(
    get,
    path = "/dashboard",
    tag = "Users",
    responses(
        (status = OK, description = "Caller's listing, purchase and sales figures", body = UserDashboard),
        (status = UNAUTHORIZED, description = "Missing or invalid token", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn dashboard(
    actor: Actor,
    State(state): State<Arc<AppState>>,
) -> HandlerResult<ApiResponse<UserDashboard>> {
    let mut books = state.db.list::<Book>().await?;
    books.retain(|b| b.seller == actor.id);
    let mut orders = state.db.list::<Order>().await?;
    orders.retain(|o| o.buyer == actor.id || o.seller == actor.id);

    Ok(ApiResponse::ok(UserDashboard::build(&actor.id, &books, orders)))
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Users",
    params(
        ("id" = String, Path, description = "User ID"),
    ),
    responses(
        (status = OK, description = "Public profile and listing stats", body = PublicUserResponse),
        (status = NOT_FOUND, description = "User not found", body = HandlerError),
    ),
)]
async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> HandlerResult<ApiResponse<PublicUserResponse>> {
    let user = load_user(&state, &id).await?;

    let mut active_listing = 0;
    for book_id in &user.books_listed {
        if let Some(book) = state.db.get::<Book>(book_id).await? {
            if book.status == BookStatus::Approved {
                active_listing += 1;
            }
        }
    }

    Ok(ApiResponse::ok(PublicUserResponse {
        stats: PublicUserStats {
            total_books_listed: user.books_listed.len(),
            total_books_sold: user.books_sold.len(),
            active_listing,
        },
        user: user.public_profile(),
    }))
}

#[utoipa::path(
    get,
    path = "/{id}/books",
    tag = "Users",
    params(
        ("id" = String, Path, description = "User ID"),
        BookQuery,
    ),
    responses(
        (status = OK, description = "The user's approved listings", body = BookList),
    ),
)]
async fn get_user_books(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<BookQuery>,
) -> HandlerResult<ApiResponse<BookList>> {
    let query = BookQuery {
        status: Some(BookStatus::Approved),
        ..query
    };
    let mut books = state.db.list::<Book>().await?;
    books.retain(|b| b.seller == id);
    Ok(ApiResponse::ok(book_page(books, &query, SELLER_PAGE_SIZE)))
}
