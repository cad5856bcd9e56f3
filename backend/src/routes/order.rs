use std::sync::Arc;

use axum::extract::{Json, Path, Query, State};
use lambda_http::tracing;
use utoipa_axum::{router::OpenApiRouter, routes};
use validator::Validate;

use super::{load_book, load_order, load_user, HandlerResult};
use crate::{
    errors::HandlerError,
    models::{
        book::{Book, BookStatus},
        order::{
            sort_orders, CancelOrderRequest, CreateOrderRequest, Order, OrderList, OrderQuery,
            OrderStatus, RatingRequest, UpdateOrderStatusRequest,
        },
        paginate,
        user::User,
        ApiResponse, DEFAULT_PAGE_SIZE,
    },
    permissions::{Actor, Permission},
    state::AppState,
    store::Transaction,
    utils::order_number,
};

pub fn router() -> OpenApiRouter<Arc<AppState>> {
    OpenApiRouter::new()
        .routes(routes!(create_order, my_orders))
        .routes(routes!(my_sales))
        .routes(routes!(get_order, update_order_status))
        .routes(routes!(cancel_order))
        .routes(routes!(rate_order))
}

pub(crate) fn order_page(mut orders: Vec<Order>, query: &OrderQuery) -> OrderList {
    orders.retain(|o| query.matches(o));
    sort_orders(&mut orders);
    let (page, limit) = query.page_query().resolve(DEFAULT_PAGE_SIZE);
    let (orders, pagination) = paginate(orders, page, limit);
    OrderList { orders, pagination }
}

/// Applies a status change and, on delivery, marks the book sold and records
/// the sale on the seller, all in one commit.
///
/// A delivered order still completes when its book or seller document is gone.
/// Admins may delete a user without touching their listings, and a seller may
/// delete a listing with an open order. The handover has happened by then and
/// the order keeps its own `bookDetails` snapshot, so only the missing side of
/// the cascade is skipped.
pub(crate) async fn change_status(
    state: &AppState,
    actor: &Actor,
    mut order: Order,
    req: UpdateOrderStatusRequest,
) -> HandlerResult<Order> {
    actor.require(Permission::UpdateOrderStatus(&order))?;

    if req.status == OrderStatus::Cancelled {
        order.cancel(&actor.id, req.message)?;
        state.db.save(&mut order).await?;
        tracing::info!("Order {} cancelled by {}", order.id, actor.id);
        return Ok(order);
    }

    let from = order.order_status;
    order.advance(&actor.id, req.status, req.message, req.tracking_number)?;

    let mut book: Option<Book> = None;
    let mut seller: Option<User> = None;
    if order.order_status == OrderStatus::Delivered {
        match state.db.get::<Book>(&order.book).await? {
            Some(mut b) => {
                if b.status == BookStatus::Sold {
                    return Err(HandlerError::conflict("This book has already been sold"));
                }
                b.mark_sold(&order.buyer);
                book = Some(b);
            }
            None => tracing::warn!(
                "Delivered order {} references missing book {}",
                order.id,
                order.book
            ),
        }
        match state.db.get::<User>(&order.seller).await? {
            Some(mut s) => {
                if !s.books_sold.contains(&order.book) {
                    s.books_sold.push(order.book.clone());
                }
                s.touch();
                seller = Some(s);
            }
            None => tracing::warn!(
                "Delivered order {} references missing seller {}",
                order.id,
                order.seller
            ),
        }
    }

    let mut tx = Transaction::new().update(&mut order)?;
    if let Some(b) = book.as_mut() {
        tx = tx.update(b)?;
    }
    if let Some(s) = seller.as_mut() {
        tx = tx.update(s)?;
    }
    state.db.commit(tx).await?;

    tracing::info!(
        "Order {} moved from {} to {} by {}",
        order.id,
        from,
        order.order_status,
        actor.id
    );
    Ok(order)
}

#[utoipa::path(
    post,
    path = "/",
    tag = "Orders",
    request_body = CreateOrderRequest,
    responses(
        (status = CREATED, description = "Order placed", body = Order),
        (status = BAD_REQUEST, description = "Book unavailable or own listing", body = HandlerError),
        (status = NOT_FOUND, description = "Book not found", body = HandlerError),
        (status = UNAUTHORIZED, description = "Missing or invalid token", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn create_order(
    actor: Actor,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOrderRequest>,
) -> HandlerResult<ApiResponse<Order>> {
    payload.validate()?;
    let book = load_book(&state, &payload.book_id).await?;
    let order = Order::place(&actor.id, &book, payload, order_number())?;

    let mut buyer = load_user(&state, &actor.id).await?;
    buyer.books_purchased.push(order.id.clone());
    buyer.remove_from_cart(&book.id);
    buyer.touch();

    let tx = Transaction::new().insert(&order)?.update(&mut buyer)?;
    state.db.commit(tx).await?;

    tracing::info!(
        "Order {} placed by {} for book {}",
        order.order_number,
        buyer.id,
        book.id
    );
    Ok(ApiResponse::created(order).with_message("Order created successfully"))
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Orders",
    params(OrderQuery),
    responses(
        (status = OK, description = "Orders placed by the caller", body = OrderList),
        (status = UNAUTHORIZED, description = "Missing or invalid token", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn my_orders(
    actor: Actor,
    State(state): State<Arc<AppState>>,
    Query(query): Query<OrderQuery>,
) -> HandlerResult<ApiResponse<OrderList>> {
    let mut orders = state.db.list::<Order>().await?;
    orders.retain(|o| o.buyer == actor.id);
    Ok(ApiResponse::ok(order_page(orders, &query)))
}

#[utoipa::path(
    get,
    path = "/sales",
    tag = "Orders",
    params(OrderQuery),
    responses(
        (status = OK, description = "Orders for the caller's listings", body = OrderList),
        (status = UNAUTHORIZED, description = "Missing or invalid token", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn my_sales(
    actor: Actor,
    State(state): State<Arc<AppState>>,
    Query(query): Query<OrderQuery>,
) -> HandlerResult<ApiResponse<OrderList>> {
    let mut orders = state.db.list::<Order>().await?;
    orders.retain(|o| o.seller == actor.id);
    Ok(ApiResponse::ok(order_page(orders, &query)))
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Orders",
    params(
        ("id" = String, Path, description = "Order ID", format = Ulid),
    ),
    responses(
        (status = OK, description = "Order detail", body = Order),
        (status = FORBIDDEN, description = "Not a party to the order", body = HandlerError),
        (status = NOT_FOUND, description = "Order not found", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn get_order(
    actor: Actor,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> HandlerResult<ApiResponse<Order>> {
    let order = load_order(&state, &id).await?;
    actor.require(Permission::ViewOrder(&order))?;
    Ok(ApiResponse::ok(order))
}

#[utoipa::path(
    put,
    path = "/{id}",
    tag = "Orders",
    params(
        ("id" = String, Path, description = "Order ID", format = Ulid),
    ),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = OK, description = "Status updated", body = Order),
        (status = BAD_REQUEST, description = "Backward or repeated transition", body = HandlerError),
        (status = FORBIDDEN, description = "Not the seller", body = HandlerError),
        (status = NOT_FOUND, description = "Order not found", body = HandlerError),
        (status = CONFLICT, description = "Order already completed or cancelled", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn update_order_status(
    actor: Actor,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> HandlerResult<ApiResponse<Order>> {
    let order = load_order(&state, &id).await?;
    let status = payload.status;
    let order = change_status(&state, &actor, order, payload).await?;
    Ok(ApiResponse::ok(order).with_message(format!("Order status updated to {}", status)))
}

#[utoipa::path(
    put,
    path = "/{id}/cancel",
    tag = "Orders",
    params(
        ("id" = String, Path, description = "Order ID", format = Ulid),
    ),
    request_body = CancelOrderRequest,
    responses(
        (status = OK, description = "Order cancelled", body = Order),
        (status = FORBIDDEN, description = "Not a party to the order", body = HandlerError),
        (status = NOT_FOUND, description = "Order not found", body = HandlerError),
        (status = CONFLICT, description = "Order already completed or cancelled", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn cancel_order(
    actor: Actor,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Option<Json<CancelOrderRequest>>,
) -> HandlerResult<ApiResponse<Order>> {
    let mut order = load_order(&state, &id).await?;
    actor.require(Permission::CancelOrder(&order))?;

    let reason = payload.and_then(|Json(p)| p.reason);
    order.cancel(&actor.id, reason)?;
    state.db.save(&mut order).await?;

    tracing::info!("Order {} cancelled by {}", order.id, actor.id);
    Ok(ApiResponse::ok(order).with_message("Order cancelled successfully"))
}

#[utoipa::path(
    post,
    path = "/{id}/rating",
    tag = "Orders",
    params(
        ("id" = String, Path, description = "Order ID", format = Ulid),
    ),
    request_body = RatingRequest,
    responses(
        (status = OK, description = "Rating recorded", body = Order),
        (status = BAD_REQUEST, description = "Order not delivered yet", body = HandlerError),
        (status = FORBIDDEN, description = "Caller is not that side of the order", body = HandlerError),
        (status = CONFLICT, description = "Already rated", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn rate_order(
    actor: Actor,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<RatingRequest>,
) -> HandlerResult<ApiResponse<Order>> {
    payload.validate()?;
    let mut order = load_order(&state, &id).await?;
    actor.require(Permission::RateOrder(&order, payload.role))?;

    order.add_rating(payload.role, payload.rating, payload.comment)?;
    state.db.save(&mut order).await?;

    Ok(ApiResponse::ok(order).with_message("Rating added successfully"))
}
