use axum::http::StatusCode;
use lambda_http::Error;

use crate::{
    models::{
        admin::{AdminDashboard, AdminUserDetail, UserList, UserStatusRequest},
        auth::LoginPayload,
        book::{tests::sample_request, BookList, BookStatus},
        user::{PublicUserResponse, UserDirectory},
        ApiResponse,
    },
    tests::{
        approved_book, build_request, list_book, parse_resp, register_user, seed_admin, send,
        test_state,
    },
};

#[tokio::test]
async fn test_admin_routes_require_admin() -> Result<(), Error> {
    let state = test_state()?;
    let user = register_user(&state, "Plain").await?;

    let req = build_request::<()>("GET", "/api/admin/dashboard", &user.token, None)?;
    assert_eq!(send(&state, req).await?.status(), StatusCode::FORBIDDEN);
    let req = build_request::<()>("GET", "/api/admin/dashboard", "", None)?;
    assert_eq!(send(&state, req).await?.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_dashboard_counts() -> Result<(), Error> {
    let state = test_state()?;
    let seller = register_user(&state, "Seller").await?;
    let admin = seed_admin(&state).await?;
    approved_book(&state, &seller, &admin).await?;
    list_book(&state, &seller, &sample_request()).await?;

    let req = build_request::<()>("GET", "/api/admin/dashboard", &admin.token, None)?;
    let resp = send(&state, req).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: ApiResponse<AdminDashboard> = parse_resp(resp).await?;
    let dashboard = body.data.ok_or("no data")?;
    assert_eq!(dashboard.stats.total_users, 1);
    assert_eq!(dashboard.stats.total_books, 2);
    assert_eq!(dashboard.stats.pending_approvals, 1);
    assert_eq!(dashboard.stats.books_by_status.get("approved"), Some(&1));
    assert_eq!(dashboard.recent_books.len(), 2);

    let req = build_request::<()>("GET", "/api/admin/books/pending", &admin.token, None)?;
    let body: ApiResponse<BookList> = parse_resp(send(&state, req).await?).await?;
    let pending = body.data.ok_or("no data")?;
    assert_eq!(pending.books.len(), 1);
    assert_eq!(pending.books[0].book.status, BookStatus::Pending);

    let req = build_request::<()>("GET", "/api/admin/books?status=approved", &admin.token, None)?;
    let body: ApiResponse<BookList> = parse_resp(send(&state, req).await?).await?;
    assert_eq!(body.data.ok_or("no data")?.books.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_deactivate_blocks_login() -> Result<(), Error> {
    let state = test_state()?;
    let user = register_user(&state, "Kiran").await?;
    let admin = seed_admin(&state).await?;

    let uri = format!("/api/admin/users/{}/status", user.id);
    let req = build_request(
        "PUT",
        &uri,
        &admin.token,
        Some(UserStatusRequest { is_active: false }),
    )?;
    assert_eq!(send(&state, req).await?.status(), StatusCode::OK);

    // Existing tokens stop working and so does login.
    let req = build_request::<()>("GET", "/api/auth/me", &user.token, None)?;
    assert_eq!(send(&state, req).await?.status(), StatusCode::UNAUTHORIZED);
    let payload = LoginPayload {
        email: user.email.clone(),
        password: "secret123".to_string(),
    };
    let req = build_request("POST", "/api/auth/login", "", Some(payload))?;
    assert_eq!(send(&state, req).await?.status(), StatusCode::UNAUTHORIZED);

    let req = build_request::<()>("GET", "/api/admin/users?status=inactive", &admin.token, None)?;
    let body: ApiResponse<UserList> = parse_resp(send(&state, req).await?).await?;
    let list = body.data.ok_or("no data")?;
    assert_eq!(list.users.len(), 1);
    assert_eq!(list.users[0].id, user.id);
    Ok(())
}

#[tokio::test]
async fn test_user_listing_and_delete() -> Result<(), Error> {
    let state = test_state()?;
    let seller = register_user(&state, "Bishnu").await?;
    register_user(&state, "Laxmi").await?;
    let admin = seed_admin(&state).await?;
    approved_book(&state, &seller, &admin).await?;

    let req = build_request::<()>("GET", "/api/admin/users?search=bish", &admin.token, None)?;
    let body: ApiResponse<UserList> = parse_resp(send(&state, req).await?).await?;
    let list = body.data.ok_or("no data")?;
    assert_eq!(list.users.len(), 1);
    assert_eq!(list.pagination.total_items, 1);

    let uri = format!("/api/admin/users/{}", seller.id);
    let req = build_request::<()>("GET", &uri, &admin.token, None)?;
    let body: ApiResponse<AdminUserDetail> = parse_resp(send(&state, req).await?).await?;
    assert_eq!(body.data.ok_or("no data")?.listings.len(), 1);

    let uri = format!("/api/admin/users/{}", admin.id);
    let req = build_request::<()>("DELETE", &uri, &admin.token, None)?;
    assert_eq!(send(&state, req).await?.status(), StatusCode::BAD_REQUEST);

    let uri = format!("/api/admin/users/{}", seller.id);
    let req = build_request::<()>("DELETE", &uri, &admin.token, None)?;
    assert_eq!(send(&state, req).await?.status(), StatusCode::OK);
    let req = build_request::<()>("GET", &uri, &admin.token, None)?;
    assert_eq!(send(&state, req).await?.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn test_public_profile_and_search() -> Result<(), Error> {
    let state = test_state()?;
    let seller = register_user(&state, "Prakash").await?;
    let admin = seed_admin(&state).await?;
    approved_book(&state, &seller, &admin).await?;
    list_book(&state, &seller, &sample_request()).await?;

    let uri = format!("/api/users/{}", seller.id);
    let req = build_request::<()>("GET", &uri, "", None)?;
    let body: ApiResponse<PublicUserResponse> = parse_resp(send(&state, req).await?).await?;
    let profile = body.data.ok_or("no data")?;
    assert_eq!(profile.stats.total_books_listed, 2);
    assert_eq!(profile.stats.active_listing, 1);

    let uri = format!("/api/users/{}/books", seller.id);
    let req = build_request::<()>("GET", &uri, "", None)?;
    let body: ApiResponse<BookList> = parse_resp(send(&state, req).await?).await?;
    assert_eq!(body.data.ok_or("no data")?.books.len(), 1);

    let req = build_request::<()>("GET", "/api/users/search?q=p", "", None)?;
    assert_eq!(send(&state, req).await?.status(), StatusCode::BAD_REQUEST);

    let req = build_request::<()>("GET", "/api/users/search?q=prak", "", None)?;
    let body: ApiResponse<UserDirectory> = parse_resp(send(&state, req).await?).await?;
    let found = body.data.ok_or("no data")?;
    assert_eq!(found.users.len(), 1);
    assert_eq!(found.users[0].id, seller.id);
    Ok(())
}
