use std::sync::Arc;

use axum::extract::{Json, State};
use chrono::{Duration, Utc};
use lambda_http::tracing;
use utoipa_axum::{router::OpenApiRouter, routes};
use validator::Validate;

use super::{load_user, HandlerResult};
use crate::{
    constants::TOKEN_AUDIENCE,
    errors::HandlerError,
    models::{
        auth::{
            AuthResponse, Claim, LoginPayload, RegisterPayload, UpdatePasswordRequest,
            UpdateProfileRequest,
        },
        user::{Role, User, UserProfile},
        ApiResponse, PlainSuccessResponse,
    },
    permissions::Actor,
    state::AppState,
    store::StoreError,
    utils::{create_userid, hash_password, normalize_email, verify_password},
};

pub fn router() -> OpenApiRouter<Arc<AppState>> {
    OpenApiRouter::new()
        .routes(routes!(register))
        .routes(routes!(login))
        .routes(routes!(admin_login))
        .routes(routes!(me))
        .routes(routes!(update_profile))
        .routes(routes!(update_password))
        .routes(routes!(logout))
}

pub(crate) fn issue_token(state: &AppState, user: &User) -> HandlerResult<String> {
    let now = Utc::now();
    let exp = now + Duration::hours(state.config.jwt_expiration_hours);
    let claim = Claim {
        sub: user.id.clone(),
        role: user.role,
        aud: TOKEN_AUDIENCE.to_string(),
        exp: exp.timestamp() as u64,
        iat: now.timestamp() as u64,
    };
    Ok(jsonwebtoken::encode(&state.jwt.2, &claim, &state.jwt.0)?)
}

fn auth_response(state: &AppState, user: &User) -> HandlerResult<AuthResponse> {
    Ok(AuthResponse {
        user: user.profile(),
        token: issue_token(state, user)?,
    })
}

/// Checks credentials; every failure looks the same to the caller.
async fn authenticate(state: &AppState, payload: &LoginPayload) -> HandlerResult<User> {
    let invalid = || HandlerError::unauthorized("Invalid email or password");

    let user = state
        .db
        .get::<User>(&create_userid(&payload.email))
        .await?
        .ok_or_else(invalid)?;
    if !verify_password(&payload.password, &user.password)? {
        tracing::debug!("Wrong password for {}", user.id);
        return Err(invalid());
    }
    if !user.is_active {
        return Err(HandlerError::unauthorized("Account is deactivated"));
    }
    Ok(user)
}

#[utoipa::path(
    post,
    path = "/register",
    tag = "Auth",
    request_body(description = "Register Info", content = RegisterPayload),
    responses(
        (status = CREATED, description = "Register Success", body = AuthResponse),
        (status = BAD_REQUEST, description = "Validation failed", body = HandlerError),
        (status = BAD_REQUEST, description = "Invalid input or duplicate email", body = HandlerError),
        (status = INTERNAL_SERVER_ERROR, description = "Handler errors", body = HandlerError),
    ),
)]
async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterPayload>,
) -> HandlerResult<ApiResponse<AuthResponse>> {
    payload.validate()?;
    let id = create_userid(&payload.email);

    // 1. Check user existence.
    if state.db.get::<User>(&id).await?.is_some() {
        return Err(HandlerError::bad_request("User already exists with this email"));
    }

    // 2. Create password hash.
    let password = hash_password(&payload.password, state.config.scrypt_log_n)?;

    // 3. Create user. The insert condition catches a concurrent registration.
    let mut user = User::new(
        id,
        payload.name.trim().to_string(),
        normalize_email(&payload.email),
        password,
        Role::User,
    );
    user.phone = payload.phone;
    state.db.insert(&user).await.map_err(|e| match e {
        StoreError::Conflict(_) => {
            HandlerError::bad_request("User already exists with this email")
        }
        e => e.into(),
    })?;
    tracing::info!("Registered user {}", user.id);

    // 4. Sign JWT token.
    Ok(ApiResponse::created(auth_response(&state, &user)?)
        .with_message("User registered successfully"))
}

#[utoipa::path(
    post,
    path = "/login",
    tag = "Auth",
    request_body(description = "Credentials", content = LoginPayload),
    responses(
        (status = OK, description = "Login Success", body = AuthResponse),
        (status = UNAUTHORIZED, description = "Invalid credentials", body = HandlerError),
        (status = INTERNAL_SERVER_ERROR, description = "Handler errors", body = HandlerError),
    ),
)]
async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginPayload>,
) -> HandlerResult<ApiResponse<AuthResponse>> {
    payload.validate()?;
    let user = authenticate(&state, &payload).await?;
    Ok(ApiResponse::ok(auth_response(&state, &user)?).with_message("Login successful"))
}

#[utoipa::path(
    post,
    path = "/admin-login",
    tag = "Auth",
    request_body(description = "Admin credentials", content = LoginPayload),
    responses(
        (status = OK, description = "Login Success", body = AuthResponse),
        (status = UNAUTHORIZED, description = "Invalid credentials or not an admin", body = HandlerError),
        (status = INTERNAL_SERVER_ERROR, description = "Handler errors", body = HandlerError),
    ),
)]
async fn admin_login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginPayload>,
) -> HandlerResult<ApiResponse<AuthResponse>> {
    payload.validate()?;
    let user = authenticate(&state, &payload).await?;
    if user.role != Role::Admin {
        tracing::warn!("Non-admin {} attempted admin login", user.id);
        return Err(HandlerError::unauthorized(
            "Access denied. Admin privileges required.",
        ));
    }
    Ok(ApiResponse::ok(auth_response(&state, &user)?).with_message("Admin login successful"))
}

#[utoipa::path(
    get,
    path = "/me",
    tag = "Auth",
    responses(
        (status = OK, description = "Current user", body = UserProfile),
        (status = UNAUTHORIZED, description = "Missing or invalid token", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn me(
    actor: Actor,
    State(state): State<Arc<AppState>>,
) -> HandlerResult<ApiResponse<UserProfile>> {
    let user = load_user(&state, &actor.id).await?;
    Ok(ApiResponse::ok(user.profile()))
}

#[utoipa::path(
    put,
    path = "/profile",
    tag = "Auth",
    request_body = UpdateProfileRequest,
    responses(
        (status = OK, description = "Profile updated", body = UserProfile),
        (status = BAD_REQUEST, description = "Validation failed", body = HandlerError),
        (status = UNAUTHORIZED, description = "Missing or invalid token", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn update_profile(
    actor: Actor,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UpdateProfileRequest>,
) -> HandlerResult<ApiResponse<UserProfile>> {
    payload.validate()?;
    let mut user = load_user(&state, &actor.id).await?;

    if let Some(name) = payload.name {
        user.name = name.trim().to_string();
    }
    if let Some(phone) = payload.phone {
        user.phone = Some(phone);
    }
    if let Some(address) = payload.address {
        user.address = address;
    }
    if let Some(avatar) = payload.avatar {
        user.avatar = Some(avatar);
    }
    user.touch();
    state.db.save(&mut user).await?;

    Ok(ApiResponse::ok(user.profile()).with_message("Profile updated successfully"))
}

#[utoipa::path(
    put,
    path = "/password",
    tag = "Auth",
    request_body = UpdatePasswordRequest,
    responses(
        (status = OK, description = "Password updated", body = PlainSuccessResponse),
        (status = BAD_REQUEST, description = "Wrong current password", body = HandlerError),
        (status = UNAUTHORIZED, description = "Missing or invalid token", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn update_password(
    actor: Actor,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UpdatePasswordRequest>,
) -> HandlerResult<ApiResponse<()>> {
    payload.validate()?;
    let mut user = load_user(&state, &actor.id).await?;

    if !verify_password(&payload.current_password, &user.password)? {
        return Err(HandlerError::bad_request("Current password is incorrect"));
    }
    user.password = hash_password(&payload.new_password, state.config.scrypt_log_n)?;
    user.touch();
    state.db.save(&mut user).await?;

    Ok(ApiResponse::message("Password updated successfully"))
}

/// Tokens are stateless; the client discards its copy.
#[utoipa::path(
    post,
    path = "/logout",
    tag = "Auth",
    responses(
        (status = OK, description = "Logged out", body = PlainSuccessResponse),
        (status = UNAUTHORIZED, description = "Missing or invalid token", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn logout(_actor: Actor) -> ApiResponse<()> {
    ApiResponse::message("Logged out successfully")
}
