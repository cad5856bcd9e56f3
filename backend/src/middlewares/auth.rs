use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{self, request::Parts},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{Algorithm, Validation};
use lambda_http::tracing;

use crate::{
    constants::TOKEN_AUDIENCE,
    errors::HandlerError,
    models::{auth::Claim, user::User},
    permissions::{Actor, Permission},
    state::AppState,
};

/// Why a supplied token was not accepted. Stored in the request extensions so
/// that routes requiring auth can report it, while optional-auth routes just
/// treat the caller as anonymous.
#[derive(Debug, Clone)]
pub struct AuthFailure(pub String);

async fn resolve_actor(state: &AppState, header: &str) -> Result<Actor, String> {
    // token should be "Bearer ..."
    let token = header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| "Access denied. No token provided.".to_string())?;

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[TOKEN_AUDIENCE]);
    let data = jsonwebtoken::decode::<Claim>(token, &state.jwt.1, &validation)
        .map_err(|e| format!("Invalid token: {}", e))?;

    let user = state
        .db
        .get::<User>(&data.claims.sub)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load user for token: {}", e);
            "Unable to verify token".to_string()
        })?
        .ok_or_else(|| "Invalid token. User not found.".to_string())?;
    if !user.is_active {
        return Err("Account is deactivated".to_string());
    }
    Ok(Actor::from(&user))
}

/// Resolves the bearer token, if any, into an [`Actor`] extension. Never
/// rejects on its own; the [`Actor`] extractor does that for protected routes.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let header = req
        .headers()
        .get(http::header::AUTHORIZATION)
        .map(|h| h.to_str().map(str::to_string));

    match header {
        Some(Ok(h)) => match resolve_actor(&state, &h).await {
            Ok(actor) => {
                req.extensions_mut().insert(actor);
            }
            Err(reason) => {
                tracing::debug!("Rejected token: {}", reason);
                req.extensions_mut().insert(AuthFailure(reason));
            }
        },
        Some(Err(e)) => {
            req.extensions_mut().insert(AuthFailure(format!(
                "Failed to down cast header value to string: {}",
                e
            )));
        }
        None => {}
    }

    next.run(req).await
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = HandlerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(actor) = parts.extensions.get::<Actor>() {
            return Ok(actor.clone());
        }
        let reason = parts
            .extensions
            .get::<AuthFailure>()
            .map(|f| f.0.clone())
            .unwrap_or_else(|| "Access denied. No token provided.".to_string());
        Err(HandlerError::Unauthorized(reason))
    }
}

/// An authenticated admin; 401 without a valid token, 403 for regular users.
#[derive(Debug, Clone)]
pub struct AdminActor(pub Actor);

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for AdminActor {
    type Rejection = HandlerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let actor = Actor::from_request_parts(parts, state).await?;
        actor.require(Permission::Moderate)?;
        Ok(Self(actor))
    }
}
