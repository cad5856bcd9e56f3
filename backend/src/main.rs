mod config;
mod constants;
mod errors;
mod images;
mod middlewares;
mod models;
mod permissions;
mod routes;
mod state;
mod store;
mod utils;

#[cfg(test)]
mod tests;

use std::{sync::Arc, time::Duration};

use axum::{
    body::Body,
    http::{header, HeaderValue, Method, Request},
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use config::{Config, ImageBackend};
use constants::UPLOAD_URL_PREFIX;
use lambda_http::{tracing, Error};
use serde_json::{json, Value};
use state::AppState;
use tokio::{
    net::TcpListener,
    signal::{
        ctrl_c,
        unix::{signal, SignalKind},
    },
};
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_axum::router::OpenApiRouter;

#[derive(OpenApi)]
#[openapi(
    info(title = "KitabYatra API", description = "Secondhand book marketplace"),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Registration, login and profile"),
        (name = "Books", description = "Listings, reviews and likes"),
        (name = "Cart"),
        (name = "Wishlist"),
        (name = "Orders", description = "Order placement and fulfilment"),
        (name = "Users", description = "Public profiles and personal dashboard"),
        (name = "Admin", description = "Moderation and platform overview"),
    )
)]
struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "http-jwt",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            )
        }
    }
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "success": true,
        "message": "KitabYatra API is running",
        "timestamp": Utc::now(),
    }))
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(60 * 60))
}

pub async fn create_service(state: Arc<AppState>) -> Result<Router, Error> {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .nest("/api/auth", routes::auth::router())
        .nest("/api/books", routes::book::router())
        .nest("/api/cart", routes::cart::router())
        .nest("/api/wishlist", routes::wishlist::router())
        .nest("/api/orders", routes::order::router())
        .nest("/api/users", routes::user::router())
        .nest("/api/admin", routes::admin::router())
        .split_for_parts();

    let spec = api.to_yaml()?;

    let trace_layer =
        TraceLayer::new_for_http().on_request(|req: &Request<Body>, _: &tracing::Span| {
            tracing::info!("Got request with path: {}", req.uri().path());
        });

    let mut app = router
        .route("/api/health", get(health_check))
        .route(
            "/api/openapi.yaml",
            get(move || {
                let spec = spec.clone();
                async move { ([(header::CONTENT_TYPE, "application/yaml")], spec) }
            }),
        )
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            middlewares::auth::auth_middleware,
        ))
        .layer(middleware::from_fn(middlewares::trace_client));

    if state.config.images == ImageBackend::Local {
        app = app.nest_service(UPLOAD_URL_PREFIX, ServeDir::new(&state.config.upload_dir));
    }

    Ok(app
        .layer(trace_layer)
        .layer(cors_layer(&state.config))
        .layer(CompressionLayer::new())
        .with_state(state))
}

async fn not_found() -> impl IntoResponse {
    errors::HandlerError::not_found("Route not found")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
        tracing::info!("Received Ctrl+C, shutting down");
    };

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
                tracing::info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing::init_default_subscriber();

    tracing::info!("KitabYatra API starting");

    let config = Config::load()?;
    let port = config.port;
    let state = Arc::new(AppState::new(config).await?);
    let app = create_service(state).await?;

    if std::env::var("AWS_LAMBDA_RUNTIME_API").is_ok() {
        tracing::info!("Running as Lambda handler");
        return lambda_http::run(app).await;
    }

    let address = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&address).await?;
    tracing::info!("Server running on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shut down");
    Ok(())
}
