// Login endpoint placeholder. Credential verification belongs to the
// application behind the gate; this handler only acknowledges the attempt.

use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

// Credentials and addresses stay out of logs
impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &"<redacted>")
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: String,
}

/// POST /v1/auth/login
///
/// Reached only when the rate limit gate allowed the attempt.
pub async fn login(Json(_req): Json<LoginRequest>) -> (StatusCode, Json<LoginResponse>) {
    tracing::debug!("Login attempt passed rate limiting");

    (
        StatusCode::ACCEPTED,
        Json(LoginResponse {
            message: "Login attempt accepted for credential verification".to_string(),
        }),
    )
}
