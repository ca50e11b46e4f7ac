use crate::errors::AppError;
use crate::rate_limit::gate::LoginGate;
use axum::{
    extract::{ConnectInfo, Request, State},
    http,
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;

/// Identity used when neither the forwarded header nor the peer address is known
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Login rate limiting middleware.
///
/// Runs before credential verification. Denied attempts short-circuit with
/// `429` and never reach the handler.
pub async fn login_rate_limit_middleware(
    State(gate): State<Arc<LoginGate>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = extract_identity(&request);

    gate.check(&identity).await.into_result()?;

    Ok(next.run(request).await)
}

/// Client identity: first `X-Forwarded-For` entry, else the peer address
pub fn extract_identity<B>(request: &http::Request<B>) -> String {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_IDENTITY.to_string())
}
