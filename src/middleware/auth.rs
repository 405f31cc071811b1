//! Session token authentication.
//!
//! Protected handlers take a [`SessionClaims`] argument. The extractor runs
//! before the request body is read, so an invalid token rejects the request
//! before any upload happens.
//!
//! # Token Sources
//!
//! The token is accepted via:
//! 1. `Authorization: Bearer <token>` header
//! 2. The session cookie (`token=<token>` by default)
//!
//! # Example
//!
//! ```rust,ignore
//! async fn profile(SessionClaims(claims): SessionClaims) -> Json<Claims> {
//!     Json(claims)
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::{debug, warn};

use crate::error::AppError;
use crate::models::Claims;
use crate::state::AppState;

/// Verified claims of the caller's session token
#[derive(Debug, Clone)]
pub struct SessionClaims(pub Claims);

impl FromRequestParts<AppState> for SessionClaims {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let path = parts.uri.path().to_string();

        let Some(token) = extract_session_token(&parts.headers, state.cookie_name()) else {
            warn!(path = %path, "Missing session token");
            return Err(AppError::unauthorized("Session token required"));
        };

        match state.tokens.verify(&token) {
            Ok(claims) => {
                debug!(path = %path, user = %claims.id, "Session token accepted");
                Ok(Self(claims))
            }
            Err(e) => {
                warn!(path = %path, error = %e, "Invalid session token");
                Err(e)
            }
        }
    }
}

/// Extract the session token from request headers
pub fn extract_session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    // Authorization: Bearer header wins
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                let token = token.trim();
                if !token.is_empty() {
                    return Some(token.to_string());
                }
            }
        }
    }

    CookieJar::from_headers(headers)
        .get(cookie_name)
        .map(|cookie| cookie.value_trimmed().to_string())
        .filter(|token| !token.is_empty())
}

/// Cookie carrying a fresh session token
pub fn session_cookie(cookie_name: &str, token: &str, max_age: i64) -> Cookie<'static> {
    Cookie::build((cookie_name.to_string(), token.to_string()))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::seconds(max_age))
        .build()
}

/// Removal cookie for the session
pub fn cleared_cookie(cookie_name: &str) -> Cookie<'static> {
    Cookie::build((cookie_name.to_string(), ""))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .removal()
        .build()
}
