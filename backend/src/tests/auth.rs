use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use lambda_http::Error;
use serde_json::json;

use crate::{
    errors::ErrorResponse,
    models::{
        auth::{AuthResponse, LoginPayload, RegisterPayload, UpdatePasswordRequest},
        user::{Role, UserProfile},
        ApiResponse,
    },
    tests::{build_request, parse_resp, register_user, seed_admin, send, test_state},
};

#[tokio::test]
async fn test_health() -> Result<(), Error> {
    let state = test_state()?;
    let req = Request::builder().uri("/api/health").body(Body::empty())?;

    let resp = send(&state, req).await?;

    assert_eq!(resp.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_openapi_document() -> Result<(), Error> {
    let state = test_state()?;
    let req = Request::builder()
        .uri("/api/openapi.yaml")
        .body(Body::empty())?;

    let resp = send(&state, req).await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await?;
    let text = String::from_utf8(body.to_vec())?;
    assert!(text.contains("/api/orders/{id}/rating"));
    assert!(text.contains("http-jwt"));
    Ok(())
}

#[tokio::test]
async fn test_register_login_me() -> Result<(), Error> {
    let state = test_state()?;
    let user = register_user(&state, "Sita").await?;

    // Login, with different casing on the e-mail.
    let payload = LoginPayload {
        email: user.email.to_uppercase(),
        password: "secret123".to_string(),
    };
    let req = build_request("POST", "/api/auth/login", "", Some(payload))?;
    let resp = send(&state, req).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: ApiResponse<AuthResponse> = parse_resp(resp).await?;
    let auth = body.data.ok_or("no data")?;
    assert_eq!(auth.user.id, user.id);
    assert_eq!(auth.user.role, Role::User);

    // Me
    let req = build_request::<()>("GET", "/api/auth/me", &auth.token, None)?;
    let resp = send(&state, req).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: ApiResponse<UserProfile> = parse_resp(resp).await?;
    assert_eq!(body.data.ok_or("no data")?.email, user.email);
    Ok(())
}

#[tokio::test]
async fn test_register_duplicate_email() -> Result<(), Error> {
    let state = test_state()?;
    let user = register_user(&state, "Gita").await?;

    let payload = RegisterPayload {
        name: "Gita Again".to_string(),
        email: user.email.clone(),
        password: "another1".to_string(),
        phone: None,
    };
    let req = build_request("POST", "/api/auth/register", "", Some(payload))?;
    let resp = send(&state, req).await?;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = parse_resp(resp).await?;
    assert!(!body.success);
    assert_eq!(body.message, "User already exists with this email");
    Ok(())
}

#[tokio::test]
async fn test_register_validation_errors() -> Result<(), Error> {
    let state = test_state()?;
    let payload = json!({
        "name": "A",
        "email": "nope",
        "password": "123",
    });
    let req = build_request("POST", "/api/auth/register", "", Some(payload))?;
    let resp = send(&state, req).await?;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = parse_resp(resp).await?;
    let fields: Vec<String> = body
        .errors
        .ok_or("no field errors")?
        .into_iter()
        .map(|e| e.field)
        .collect();
    assert_eq!(fields, vec!["email", "name", "password"]);
    Ok(())
}

#[tokio::test]
async fn test_login_wrong_password() -> Result<(), Error> {
    let state = test_state()?;
    let user = register_user(&state, "Hari").await?;

    let payload = LoginPayload {
        email: user.email.clone(),
        password: "wrong-password".to_string(),
    };
    let req = build_request("POST", "/api/auth/login", "", Some(payload))?;
    let resp = send(&state, req).await?;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_admin_login_requires_admin_role() -> Result<(), Error> {
    let state = test_state()?;
    let user = register_user(&state, "Ram").await?;
    let payload = LoginPayload {
        email: user.email.clone(),
        password: "secret123".to_string(),
    };
    let req = build_request("POST", "/api/auth/admin-login", "", Some(payload))?;
    let resp = send(&state, req).await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let admin = seed_admin(&state).await?;
    let payload = LoginPayload {
        email: admin.email.clone(),
        password: "admin123".to_string(),
    };
    let req = build_request("POST", "/api/auth/admin-login", "", Some(payload))?;
    let resp = send(&state, req).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: ApiResponse<AuthResponse> = parse_resp(resp).await?;
    assert_eq!(body.data.ok_or("no data")?.user.role, Role::Admin);
    Ok(())
}

#[tokio::test]
async fn test_protected_route_without_token() -> Result<(), Error> {
    let state = test_state()?;

    let req = build_request::<()>("GET", "/api/auth/me", "", None)?;
    let resp = send(&state, req).await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = build_request::<()>("GET", "/api/auth/me", "not-a-jwt", None)?;
    let resp = send(&state, req).await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_update_password() -> Result<(), Error> {
    let state = test_state()?;
    let user = register_user(&state, "Maya").await?;

    let wrong = UpdatePasswordRequest {
        current_password: "not-it".to_string(),
        new_password: "newsecret1".to_string(),
    };
    let req = build_request("PUT", "/api/auth/password", &user.token, Some(wrong))?;
    let resp = send(&state, req).await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let right = UpdatePasswordRequest {
        current_password: "secret123".to_string(),
        new_password: "newsecret1".to_string(),
    };
    let req = build_request("PUT", "/api/auth/password", &user.token, Some(right))?;
    let resp = send(&state, req).await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let payload = LoginPayload {
        email: user.email.clone(),
        password: "newsecret1".to_string(),
    };
    let req = build_request("POST", "/api/auth/login", "", Some(payload))?;
    let resp = send(&state, req).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    Ok(())
}
