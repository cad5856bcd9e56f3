mod admin;
mod auth;

use std::sync::Arc;

use axum::{
    body::{Body, HttpBody},
    extract::Request,
    response::Response,
};
use lambda_http::{tower::ServiceExt, Error};
use serde::{de::DeserializeOwned, Serialize};
use ulid::Ulid;

use crate::{
    create_service,
    models::{
        auth::{AuthResponse, RegisterPayload},
        book::{BookView, CreateBookRequest},
        user::{Role, User},
        ApiResponse,
    },
    routes::auth::issue_token,
    state::AppState,
    utils::{create_userid, hash_password},
};

const BOUNDARY: &str = "kitabyatra-test-boundary";

/// A logged in caller.
pub(crate) struct TestUser {
    pub id: String,
    pub email: String,
    pub token: String,
}

fn test_state() -> Result<Arc<AppState>, Error> {
    Ok(Arc::new(AppState::test()?))
}

async fn parse_resp<T: DeserializeOwned>(resp: Response<Body>) -> Result<T, Error> {
    let body = resp.into_body();
    let limit = body.size_hint().upper().unwrap_or(u64::MAX) as usize;
    let data = axum::body::to_bytes(body, limit).await?;
    let res: T = serde_json::from_slice(&data)?;

    Ok(res)
}

/// Builds a JSON request; an empty token sends no Authorization header.
fn build_request<T: Serialize>(
    method: &str,
    uri: &str,
    token: &str,
    body: Option<T>,
) -> Result<Request<Body>, Error> {
    let mut builder = Request::builder().method(method).uri(uri);
    if !token.is_empty() {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    let req = match body {
        Some(v) => {
            let content = serde_json::to_string(&v)?;
            builder
                .header("Content-Type", "application/json")
                .body(Body::new(content))
        }
        None => builder.body(Body::empty()),
    }?;
    Ok(req)
}

/// Sends one request through a freshly built service.
async fn send(state: &Arc<AppState>, req: Request<Body>) -> Result<Response<Body>, Error> {
    let service = create_service(state.clone()).await?;
    Ok(service.oneshot(req).await?)
}

/// Builds a multipart listing upload with one PNG image.
fn listing_request(token: &str, listing: &CreateBookRequest) -> Result<Request<Body>, Error> {
    listing_request_with_image(token, listing, "cover.png", "image/png")
}

/// Same as [`listing_request`] with a caller chosen file name and content type.
fn listing_request_with_image(
    token: &str,
    listing: &CreateBookRequest,
    file_name: &str,
    content_type: &str,
) -> Result<Request<Body>, Error> {
    let json = serde_json::to_string(listing)?;
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"book\"\r\n\r\n{json}\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"images\"; \
             filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(&[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Ok(Request::builder()
        .method("POST")
        .uri("/api/books")
        .header("Authorization", format!("Bearer {}", token))
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))?)
}

async fn register_user(state: &Arc<AppState>, name: &str) -> Result<TestUser, Error> {
    let email = format!("{}_{}@test.com", name.to_lowercase(), Ulid::new());
    let payload = RegisterPayload {
        name: name.to_string(),
        email: email.clone(),
        password: "secret123".to_string(),
        phone: Some("9800000000".to_string()),
    };
    let req = build_request("POST", "/api/auth/register", "", Some(payload))?;
    let resp = send(state, req).await?;
    let body: ApiResponse<AuthResponse> = parse_resp(resp).await?;
    let auth = body.data.ok_or("register returned no data")?;

    Ok(TestUser {
        id: auth.user.id,
        email,
        token: auth.token,
    })
}

/// Admins cannot register through the API, so they are written directly.
async fn seed_admin(state: &Arc<AppState>) -> Result<TestUser, Error> {
    let email = format!("admin_{}@test.com", Ulid::new());
    let admin = User::new(
        create_userid(&email),
        "Admin".to_string(),
        email.clone(),
        hash_password("admin123", state.config.scrypt_log_n)?,
        Role::Admin,
    );
    state.db.insert(&admin).await?;
    let token = issue_token(state, &admin)?;

    Ok(TestUser {
        id: admin.id,
        email,
        token,
    })
}

/// Lists a book as `seller`; it starts out pending.
async fn list_book(
    state: &Arc<AppState>,
    seller: &TestUser,
    listing: &CreateBookRequest,
) -> Result<BookView, Error> {
    let resp = send(state, listing_request(&seller.token, listing)?).await?;
    let body: ApiResponse<BookView> = parse_resp(resp).await?;
    Ok(body.data.ok_or("listing returned no data")?)
}

/// Lists a book and has an admin approve it.
async fn approved_book(
    state: &Arc<AppState>,
    seller: &TestUser,
    admin: &TestUser,
) -> Result<BookView, Error> {
    let listing = crate::models::book::tests::sample_request();
    let book = list_book(state, seller, &listing).await?;
    let uri = format!("/api/admin/books/{}/approve", book.book.id);
    let req = build_request::<()>("PUT", &uri, &admin.token, None)?;
    let resp = send(state, req).await?;
    let body: ApiResponse<BookView> = parse_resp(resp).await?;
    Ok(body.data.ok_or("approve returned no data")?)
}
