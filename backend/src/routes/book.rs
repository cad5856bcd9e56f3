use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Json, Multipart, Path, Query, State};
use lambda_http::tracing;
use utoipa_axum::{router::OpenApiRouter, routes};
use validator::Validate;

use super::{load_book, load_user, HandlerResult};
use crate::{
    constants::{MAX_IMAGES_PER_BOOK, MAX_UPLOAD_BYTES},
    errors::HandlerError,
    images::Upload,
    models::{
        book::{
            sort_books, validate_listing, Book, BookList, BookQuery, BookStatus, BookUploadForm,
            BookView, LikeResponse, ReviewRequest, UpdateBookRequest,
        },
        paginate,
        user::User,
        ApiResponse, PlainSuccessResponse, DEFAULT_PAGE_SIZE,
    },
    permissions::{book_visible, Actor, Permission},
    state::AppState,
    store::{StoreError, Transaction},
};

/// Page size of the public catalogue.
const CATALOGUE_PAGE_SIZE: u32 = 12;

pub fn router() -> OpenApiRouter<Arc<AppState>> {
    OpenApiRouter::new()
        .routes(routes!(list_books, create_book))
        .routes(routes!(my_books))
        .routes(routes!(get_book, update_book, delete_book))
        .routes(routes!(add_review))
        .routes(routes!(toggle_like))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

/// Filters, sorts and pages a set of books.
pub(crate) fn book_page(mut books: Vec<Book>, query: &BookQuery, default_limit: u32) -> BookList {
    books.retain(|b| query.matches(b));
    sort_books(&mut books, query.sort_by.unwrap_or_default());
    let (page, limit) = query.page_query().resolve(default_limit);
    let (books, pagination) = paginate(books, page, limit);
    BookList {
        books: books.into_iter().map(Book::view).collect(),
        pagination,
    }
}

/// Loads a book the caller is allowed to see; anything else is not found.
async fn load_visible_book(
    state: &AppState,
    actor: Option<&Actor>,
    id: &str,
) -> HandlerResult<Book> {
    let book = load_book(state, id).await?;
    if !book_visible(actor, &book) {
        return Err(HandlerError::not_found("Book not found"));
    }
    Ok(book)
}

async fn read_listing_form(mut multipart: Multipart) -> HandlerResult<BookUploadForm> {
    let mut form = BookUploadForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("book") => form.book = Some(field.text().await?),
            Some("images") => {
                if form.images.len() == MAX_IMAGES_PER_BOOK {
                    return Err(HandlerError::bad_request(format!(
                        "At most {} images are allowed",
                        MAX_IMAGES_PER_BOOK
                    )));
                }
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field.bytes().await?.to_vec();
                form.images.push(Upload {
                    file_name,
                    content_type,
                    bytes,
                });
            }
            other => tracing::debug!("Ignoring multipart field {:?}", other),
        }
    }

    Ok(form)
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Books",
    params(BookQuery),
    responses(
        (status = OK, description = "Approved books", body = BookList),
        (status = BAD_REQUEST, description = "Malformed query", body = HandlerError),
    ),
)]
async fn list_books(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BookQuery>,
) -> HandlerResult<ApiResponse<BookList>> {
    let query = BookQuery {
        status: Some(BookStatus::Approved),
        ..query
    };
    let books = state.db.list::<Book>().await?;
    Ok(ApiResponse::ok(book_page(books, &query, CATALOGUE_PAGE_SIZE)))
}

#[utoipa::path(
    post,
    path = "/",
    tag = "Books",
    request_body(content = BookUploadForm, content_type = "multipart/form-data"),
    responses(
        (status = CREATED, description = "Listing created, pending approval", body = BookView),
        (status = BAD_REQUEST, description = "Validation failed", body = HandlerError),
        (status = UNAUTHORIZED, description = "Missing or invalid token", body = HandlerError),
        (status = INTERNAL_SERVER_ERROR, description = "Handler errors", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn create_book(
    actor: Actor,
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> HandlerResult<ApiResponse<BookView>> {
    let (payload, uploads) = read_listing_form(multipart).await?.into_parts()?;
    validate_listing(&payload, payload.publication_year)?;
    let mut seller = load_user(&state, &actor.id).await?;

    // 1. Store images.
    let images = state.images.save_all(uploads).await?;

    // 2. Write the book and the seller's listing index together.
    let book = Book::new_from_request(&seller, payload, images);
    seller.books_listed.push(book.id.clone());
    seller.touch();
    let committed = match Transaction::new()
        .insert(&book)
        .and_then(|tx| tx.update(&mut seller))
    {
        Ok(tx) => state.db.commit(tx).await,
        Err(e) => Err(e),
    };

    // 3. Remove orphaned uploads when the write failed.
    if let Err(e) = committed {
        state.images.discard(&book.images).await;
        return Err(e.into());
    }

    tracing::info!("Seller {} listed book {}", seller.id, book.id);
    Ok(ApiResponse::created(book.view())
        .with_message("Book listed successfully and is pending approval"))
}

#[utoipa::path(
    get,
    path = "/my-books",
    tag = "Books",
    params(BookQuery),
    responses(
        (status = OK, description = "Caller's own listings in any status", body = BookList),
        (status = UNAUTHORIZED, description = "Missing or invalid token", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn my_books(
    actor: Actor,
    State(state): State<Arc<AppState>>,
    Query(query): Query<BookQuery>,
) -> HandlerResult<ApiResponse<BookList>> {
    let mut books = state.db.list::<Book>().await?;
    books.retain(|b| b.seller == actor.id);
    Ok(ApiResponse::ok(book_page(books, &query, DEFAULT_PAGE_SIZE)))
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Books",
    params(
        ("id" = String, Path, description = "Book ID", format = Ulid),
    ),
    responses(
        (status = OK, description = "Book detail", body = BookView),
        (status = NOT_FOUND, description = "Book not found or not visible", body = HandlerError),
    ),
)]
async fn get_book(
    actor: Option<Actor>,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> HandlerResult<ApiResponse<BookView>> {
    let mut book = load_visible_book(&state, actor.as_ref(), &id).await?;

    // View counting is best effort; a lost race just drops one view.
    let mut counted = book.clone();
    counted.views += 1;
    match state.db.save(&mut counted).await {
        Ok(()) => book = counted,
        Err(StoreError::Conflict(_)) => tracing::debug!("View count race on book {}", id),
        Err(e) => tracing::warn!("Failed to count view on book {}: {}", id, e),
    }

    Ok(ApiResponse::ok(book.view()))
}

#[utoipa::path(
    put,
    path = "/{id}",
    tag = "Books",
    params(
        ("id" = String, Path, description = "Book ID", format = Ulid),
    ),
    request_body = UpdateBookRequest,
    responses(
        (status = OK, description = "Book updated", body = BookView),
        (status = BAD_REQUEST, description = "Validation failed", body = HandlerError),
        (status = FORBIDDEN, description = "Not the seller", body = HandlerError),
        (status = NOT_FOUND, description = "Book not found", body = HandlerError),
        (status = CONFLICT, description = "Book already sold", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn update_book(
    actor: Actor,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateBookRequest>,
) -> HandlerResult<ApiResponse<BookView>> {
    let mut book = load_book(&state, &id).await?;
    actor.require(Permission::EditBook(&book))?;
    book.ensure_mutable()?;
    validate_listing(&payload, payload.publication_year)?;

    book.apply_update(payload);
    state.db.save(&mut book).await?;

    Ok(ApiResponse::ok(book.view()).with_message("Book updated successfully"))
}

/// Deletes a listing and unlinks it from its seller in one commit.
pub(crate) async fn remove_book(state: &AppState, book: Book) -> HandlerResult<()> {
    book.ensure_mutable()?;

    let mut tx = Transaction::new().delete(&book)?;
    if let Some(mut seller) = state.db.get::<User>(&book.seller).await? {
        seller.books_listed.retain(|b| b != &book.id);
        seller.touch();
        tx = tx.update(&mut seller)?;
    }
    state.db.commit(tx).await?;
    state.images.discard(&book.images).await;

    tracing::info!("Deleted book {}", book.id);
    Ok(())
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Books",
    params(
        ("id" = String, Path, description = "Book ID", format = Ulid),
    ),
    responses(
        (status = OK, description = "Book deleted", body = PlainSuccessResponse),
        (status = FORBIDDEN, description = "Not the seller", body = HandlerError),
        (status = NOT_FOUND, description = "Book not found", body = HandlerError),
        (status = CONFLICT, description = "Book already sold", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn delete_book(
    actor: Actor,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> HandlerResult<ApiResponse<()>> {
    let book = load_book(&state, &id).await?;
    actor.require(Permission::EditBook(&book))?;
    remove_book(&state, book).await?;
    Ok(ApiResponse::message("Book deleted successfully"))
}

#[utoipa::path(
    post,
    path = "/{id}/reviews",
    tag = "Books",
    params(
        ("id" = String, Path, description = "Book ID", format = Ulid),
    ),
    request_body = ReviewRequest,
    responses(
        (status = CREATED, description = "Review added", body = BookView),
        (status = BAD_REQUEST, description = "Validation failed", body = HandlerError),
        (status = NOT_FOUND, description = "Book not found", body = HandlerError),
        (status = CONFLICT, description = "Already reviewed", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn add_review(
    actor: Actor,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<ReviewRequest>,
) -> HandlerResult<ApiResponse<BookView>> {
    payload.validate()?;
    let mut book = load_visible_book(&state, Some(&actor), &id).await?;
    let reviewer = load_user(&state, &actor.id).await?;

    book.add_review(&reviewer, payload)?;
    state.db.save(&mut book).await?;

    Ok(ApiResponse::created(book.view()).with_message("Review added successfully"))
}

#[utoipa::path(
    post,
    path = "/{id}/like",
    tag = "Books",
    params(
        ("id" = String, Path, description = "Book ID", format = Ulid),
    ),
    responses(
        (status = OK, description = "Like toggled", body = LikeResponse),
        (status = NOT_FOUND, description = "Book not found", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn toggle_like(
    actor: Actor,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> HandlerResult<ApiResponse<LikeResponse>> {
    let mut book = load_visible_book(&state, Some(&actor), &id).await?;

    let liked = book.toggle_like(&actor.id);
    state.db.save(&mut book).await?;

    let message = if liked { "Book liked" } else { "Book unliked" };
    Ok(ApiResponse::ok(LikeResponse {
        liked,
        total_likes: book.likes(),
    })
    .with_message(message))
}
