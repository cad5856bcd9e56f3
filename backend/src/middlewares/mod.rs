use axum::{extract::Request, middleware::Next, response::IntoResponse};
use lambda_http::{request::RequestContext, tracing};

pub mod auth;

/// Logs the caller's source address when running behind API Gateway.
pub async fn trace_client(req: Request, next: Next) -> impl IntoResponse {
    if let Some(RequestContext::ApiGatewayV2(ctx)) = req.extensions().get::<RequestContext>() {
        let source_ip = ctx.http.source_ip.as_deref().unwrap_or("unknown");
        tracing::info!("{} {} -> {}", source_ip, req.method(), req.uri().path());
    }
    next.run(req).await
}
