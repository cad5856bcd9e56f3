use std::sync::Arc;

use axum::extract::{Json, Path, Query, State};
use lambda_http::tracing;
use utoipa_axum::{router::OpenApiRouter, routes};

use super::{
    book::{book_page, remove_book},
    load_book, load_order, load_user,
    order::{change_status, order_page},
    HandlerResult,
};
use crate::{
    errors::HandlerError,
    models::{
        admin::{AdminDashboard, AdminUserDetail, UserList, UserListQuery, UserStatusRequest},
        book::{Book, BookList, BookQuery, BookStatus, BookView, ModerationRequest},
        order::{
            sort_orders, Order, OrderList, OrderQuery, OrderSummary, PaymentStatusRequest,
            UpdateOrderStatusRequest,
        },
        paginate,
        user::{Role, User, UserProfile},
        ApiResponse, PlainSuccessResponse, DEFAULT_PAGE_SIZE,
    },
    middlewares::auth::AdminActor,
    state::AppState,
    store::Transaction,
};

pub fn router() -> OpenApiRouter<Arc<AppState>> {
    OpenApiRouter::new()
        .routes(routes!(dashboard))
        .routes(routes!(list_users))
        .routes(routes!(get_user, delete_user))
        .routes(routes!(set_user_status))
        .routes(routes!(pending_books))
        .routes(routes!(list_books))
        .routes(routes!(approve_book))
        .routes(routes!(reject_book))
        .routes(routes!(delete_book))
        .routes(routes!(list_orders))
        .routes(routes!(update_order_status))
        .routes(routes!(update_payment_status))
}

#[utoipa::path(
    get,
    path = "/dashboard",
    tag = "Admin",
    responses(
        (status = OK, description = "Platform totals and recent activity", body = AdminDashboard),
        (status = UNAUTHORIZED, description = "Missing or invalid token", body = HandlerError),
        (status = FORBIDDEN, description = "Not an admin", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn dashboard(
    _admin: AdminActor,
    State(state): State<Arc<AppState>>,
) -> HandlerResult<ApiResponse<AdminDashboard>> {
    let users = state.db.list::<User>().await?;
    let books = state.db.list::<Book>().await?;
    let orders = state.db.list::<Order>().await?;
    Ok(ApiResponse::ok(AdminDashboard::build(users, books, orders)))
}

#[utoipa::path(
    get,
    path = "/users",
    tag = "Admin",
    params(UserListQuery),
    responses(
        (status = OK, description = "Regular accounts, newest first", body = UserList),
        (status = FORBIDDEN, description = "Not an admin", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn list_users(
    _admin: AdminActor,
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserListQuery>,
) -> HandlerResult<ApiResponse<UserList>> {
    let mut users = state.db.list::<User>().await?;
    users.retain(|u| query.matches(u));
    users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));

    let (page, limit) = query.page_query().resolve(DEFAULT_PAGE_SIZE);
    let (users, pagination) = paginate(users, page, limit);
    Ok(ApiResponse::ok(UserList {
        users: users.iter().map(User::profile).collect(),
        pagination,
    }))
}

#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "Admin",
    params(
        ("id" = String, Path, description = "User ID"),
    ),
    responses(
        (status = OK, description = "Profile with listings, purchases and sales", body = AdminUserDetail),
        (status = NOT_FOUND, description = "User not found", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn get_user(
    _admin: AdminActor,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> HandlerResult<ApiResponse<AdminUserDetail>> {
    let user = load_user(&state, &id).await?;

    let mut listings = state.db.list::<Book>().await?;
    listings.retain(|b| b.seller == user.id);
    listings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));

    let mut orders = state.db.list::<Order>().await?;
    orders.retain(|o| o.buyer == user.id || o.seller == user.id);
    sort_orders(&mut orders);
    let (purchases, sales): (Vec<Order>, Vec<Order>) =
        orders.into_iter().partition(|o| o.buyer == user.id);

    Ok(ApiResponse::ok(AdminUserDetail {
        user: user.profile(),
        listings: listings.into_iter().map(Book::view).collect(),
        purchases: purchases.iter().map(OrderSummary::from).collect(),
        sales: sales.iter().map(OrderSummary::from).collect(),
    }))
}

#[utoipa::path(
    put,
    path = "/users/{id}/status",
    tag = "Admin",
    params(
        ("id" = String, Path, description = "User ID"),
    ),
    request_body = UserStatusRequest,
    responses(
        (status = OK, description = "Account (de)activated", body = UserProfile),
        (status = BAD_REQUEST, description = "Target is an admin", body = HandlerError),
        (status = NOT_FOUND, description = "User not found", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn set_user_status(
    AdminActor(admin): AdminActor,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<UserStatusRequest>,
) -> HandlerResult<ApiResponse<UserProfile>> {
    let mut user = load_user(&state, &id).await?;
    if user.role == Role::Admin {
        return Err(HandlerError::bad_request("Cannot change status of admin user"));
    }

    user.is_active = payload.is_active;
    user.touch();
    state.db.save(&mut user).await?;

    let verb = if user.is_active { "activated" } else { "deactivated" };
    tracing::info!("User {} {} by {}", user.id, verb, admin.id);
    Ok(ApiResponse::ok(user.profile()).with_message(format!("User {} successfully", verb)))
}

/// Removes the account only; listings and orders keep their references.
#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "Admin",
    params(
        ("id" = String, Path, description = "User ID"),
    ),
    responses(
        (status = OK, description = "User deleted", body = PlainSuccessResponse),
        (status = BAD_REQUEST, description = "Target is an admin", body = HandlerError),
        (status = NOT_FOUND, description = "User not found", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn delete_user(
    AdminActor(admin): AdminActor,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> HandlerResult<ApiResponse<()>> {
    let user = load_user(&state, &id).await?;
    if user.role == Role::Admin {
        return Err(HandlerError::bad_request("Cannot delete admin user"));
    }

    state.db.commit(Transaction::new().delete(&user)?).await?;
    tracing::info!("User {} deleted by {}", user.id, admin.id);
    Ok(ApiResponse::message("User deleted successfully"))
}

#[utoipa::path(
    get,
    path = "/books/pending",
    tag = "Admin",
    params(BookQuery),
    responses(
        (status = OK, description = "Listings awaiting moderation, newest first", body = BookList),
        (status = FORBIDDEN, description = "Not an admin", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn pending_books(
    _admin: AdminActor,
    State(state): State<Arc<AppState>>,
    Query(query): Query<BookQuery>,
) -> HandlerResult<ApiResponse<BookList>> {
    let query = BookQuery {
        status: Some(BookStatus::Pending),
        ..query
    };
    let books = state.db.list::<Book>().await?;
    Ok(ApiResponse::ok(book_page(books, &query, DEFAULT_PAGE_SIZE)))
}

#[utoipa::path(
    get,
    path = "/books",
    tag = "Admin",
    params(BookQuery),
    responses(
        (status = OK, description = "Every listing, any status", body = BookList),
        (status = FORBIDDEN, description = "Not an admin", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn list_books(
    _admin: AdminActor,
    State(state): State<Arc<AppState>>,
    Query(query): Query<BookQuery>,
) -> HandlerResult<ApiResponse<BookList>> {
    let books = state.db.list::<Book>().await?;
    Ok(ApiResponse::ok(book_page(books, &query, DEFAULT_PAGE_SIZE)))
}

async fn moderate(
    state: &AppState,
    admin: &AdminActor,
    id: &str,
    status: BookStatus,
    payload: Option<Json<ModerationRequest>>,
) -> HandlerResult<BookView> {
    let mut book = load_book(state, id).await?;
    let notes = payload.and_then(|Json(p)| p.admin_notes);
    book.moderate(status, notes);
    state.db.save(&mut book).await?;

    tracing::info!("Book {} marked {} by {}", book.id, status, admin.0.id);
    Ok(book.view())
}

#[utoipa::path(
    put,
    path = "/books/{id}/approve",
    tag = "Admin",
    params(
        ("id" = String, Path, description = "Book ID", format = Ulid),
    ),
    request_body = ModerationRequest,
    responses(
        (status = OK, description = "Book approved", body = BookView),
        (status = NOT_FOUND, description = "Book not found", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn approve_book(
    admin: AdminActor,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Option<Json<ModerationRequest>>,
) -> HandlerResult<ApiResponse<BookView>> {
    let book = moderate(&state, &admin, &id, BookStatus::Approved, payload).await?;
    Ok(ApiResponse::ok(book).with_message("Book approved successfully"))
}

#[utoipa::path(
    put,
    path = "/books/{id}/reject",
    tag = "Admin",
    params(
        ("id" = String, Path, description = "Book ID", format = Ulid),
    ),
    request_body = ModerationRequest,
    responses(
        (status = OK, description = "Book rejected", body = BookView),
        (status = NOT_FOUND, description = "Book not found", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn reject_book(
    admin: AdminActor,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Option<Json<ModerationRequest>>,
) -> HandlerResult<ApiResponse<BookView>> {
    let book = moderate(&state, &admin, &id, BookStatus::Rejected, payload).await?;
    Ok(ApiResponse::ok(book).with_message("Book rejected successfully"))
}

#[utoipa::path(
    delete,
    path = "/books/{id}",
    tag = "Admin",
    params(
        ("id" = String, Path, description = "Book ID", format = Ulid),
    ),
    responses(
        (status = OK, description = "Book deleted", body = PlainSuccessResponse),
        (status = NOT_FOUND, description = "Book not found", body = HandlerError),
        (status = CONFLICT, description = "Book already sold", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn delete_book(
    _admin: AdminActor,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> HandlerResult<ApiResponse<()>> {
    let book = load_book(&state, &id).await?;
    remove_book(&state, book).await?;
    Ok(ApiResponse::message("Book deleted successfully"))
}

#[utoipa::path(
    get,
    path = "/orders",
    tag = "Admin",
    params(OrderQuery),
    responses(
        (status = OK, description = "Every order, newest first", body = OrderList),
        (status = FORBIDDEN, description = "Not an admin", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn list_orders(
    _admin: AdminActor,
    State(state): State<Arc<AppState>>,
    Query(query): Query<OrderQuery>,
) -> HandlerResult<ApiResponse<OrderList>> {
    let orders = state.db.list::<Order>().await?;
    Ok(ApiResponse::ok(order_page(orders, &query)))
}

#[utoipa::path(
    put,
    path = "/orders/{id}/status",
    tag = "Admin",
    params(
        ("id" = String, Path, description = "Order ID", format = Ulid),
    ),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = OK, description = "Status updated", body = Order),
        (status = BAD_REQUEST, description = "Backward or repeated transition", body = HandlerError),
        (status = NOT_FOUND, description = "Order not found", body = HandlerError),
        (status = CONFLICT, description = "Order already completed or cancelled", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn update_order_status(
    AdminActor(admin): AdminActor,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> HandlerResult<ApiResponse<Order>> {
    let order = load_order(&state, &id).await?;
    let status = payload.status;
    let order = change_status(&state, &admin, order, payload).await?;
    Ok(ApiResponse::ok(order).with_message(format!("Order status updated to {}", status)))
}

#[utoipa::path(
    put,
    path = "/orders/{id}/payment-status",
    tag = "Admin",
    params(
        ("id" = String, Path, description = "Order ID", format = Ulid),
    ),
    request_body = PaymentStatusRequest,
    responses(
        (status = OK, description = "Payment status updated", body = Order),
        (status = NOT_FOUND, description = "Order not found", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn update_payment_status(
    AdminActor(admin): AdminActor,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<PaymentStatusRequest>,
) -> HandlerResult<ApiResponse<Order>> {
    let mut order = load_order(&state, &id).await?;
    order.set_payment_status(payload.payment_status);
    state.db.save(&mut order).await?;

    tracing::info!(
        "Payment of order {} set to {} by {}",
        order.id,
        order.payment_status,
        admin.id
    );
    Ok(ApiResponse::ok(order).with_message("Payment status updated successfully"))
}
