//! Middleware: admin bearer authentication and security headers.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use ident_common::error::IdentError;
use std::sync::Arc;

use crate::AppState;

/// Require `Authorization: Bearer <admin.token>`.
///
/// Without a configured token the admin routes answer 404.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, IdentError> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Err(IdentError::NotFound { resource: "Admin API".into() });
    };

    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(IdentError::Unauthorized)?;

    if !constant_time_eq(token.as_bytes(), expected.as_bytes()) {
        return Err(IdentError::Unauthorized);
    }

    Ok(next.run(request).await)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// ── Security headers ──────────────────────────────────────────────────────────

/// Add security headers to every HTTP response.
///
/// Headers applied:
/// - `X-Content-Type-Options: nosniff`
/// - `X-Frame-Options: DENY`
/// - `Referrer-Policy: no-referrer`
/// - `Strict-Transport-Security` (max-age 2 years)
/// - `Content-Security-Policy: default-src 'none'` (JSON only, nothing to load)
pub async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let h = response.headers_mut();

    macro_rules! set {
        ($name:expr, $val:expr) => {
            if let Ok(v) = $val.parse::<axum::http::HeaderValue>() {
                h.insert($name, v);
            }
        };
    }

    set!(header::X_CONTENT_TYPE_OPTIONS, "nosniff");
    set!(header::X_FRAME_OPTIONS, "DENY");
    set!(header::REFERRER_POLICY, "no-referrer");
    set!(header::STRICT_TRANSPORT_SECURITY, "max-age=63072000; includeSubDomains");
    set!(header::CONTENT_SECURITY_POLICY, "default-src 'none'; frame-ancestors 'none'");

    response
}
