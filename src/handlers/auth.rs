//! Account and session endpoints.
//!
//! - `POST /register` - Create an account with the identity provider
//! - `POST /login` - Verify a password and issue a session token
//! - `GET /profile` - Return the caller's token claims
//! - `POST /logout` - Clear the session cookie
//!
//! # Example
//!
//! ```bash
//! curl -X POST http://localhost:4000/login \
//!   -H "Content-Type: application/json" \
//!   -d '{"username": "alice@example.com", "password": "hunter22"}'
//! ```

use axum::{
    extract::{rejection::JsonRejection, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::middleware::{cleared_cookie, session_cookie, SessionClaims};
use crate::models::{Claims, Credentials, LoginResponse, User};
use crate::services::{IdentityError, ProviderAccount};
use crate::state::AppState;

/// Unwrap a JSON body, reporting bad input as a validation error
fn credentials(
    payload: std::result::Result<Json<Credentials>, JsonRejection>,
) -> Result<Credentials> {
    let Json(credentials) = payload
        .map_err(|e| AppError::validation(format!("Invalid request body: {}", e.body_text())))?;

    if credentials.username.trim().is_empty() || credentials.password.is_empty() {
        return Err(AppError::validation("username and password are required"));
    }

    Ok(credentials)
}

/// Create an account
///
/// POST /register
async fn register(
    State(state): State<AppState>,
    payload: std::result::Result<Json<Credentials>, JsonRejection>,
) -> Result<Json<ProviderAccount>> {
    let credentials = credentials(payload)?;

    let account = state
        .identity
        .create_account(&credentials.username, &credentials.password)
        .await
        .map_err(|e| match e {
            IdentityError::Rejected { message, payload } => {
                warn!(reason = %message, "Registration rejected by identity provider");
                AppError::Upstream {
                    code: "registration_failed",
                    message: "Registration failed".to_string(),
                    details: payload,
                }
            }
            other => other.into(),
        })?;

    state
        .db
        .upsert_user(&User::new(account.uid.clone(), credentials.username))?;

    info!(user = %account.uid, "User registered");

    Ok(Json(account))
}

/// Verify credentials and start a session
///
/// POST /login
async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: std::result::Result<Json<Credentials>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let credentials = credentials(payload)?;

    let account = state
        .identity
        .verify_password(&credentials.username, &credentials.password)
        .await
        .map_err(|e| match e {
            IdentityError::Rejected { message, .. } => {
                warn!(reason = %message, "Login rejected by identity provider");
                AppError::unauthorized("Invalid username or password")
            }
            other => other.into(),
        })?;

    // Keep the original registration record if there is one
    let user = match state.db.get_user(&account.uid)? {
        Some(user) => user,
        None => {
            let user = User::new(account.uid.clone(), credentials.username);
            state.db.upsert_user(&user)?;
            user
        }
    };

    let (token, _) = state.tokens.issue(&user)?;
    let cookie = session_cookie(state.cookie_name(), &token, state.tokens.ttl_seconds());

    info!(user = %user.id, "Session issued");

    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            id: user.id,
            username: user.username,
            token,
        }),
    ))
}

/// Return the verified claims of the caller
///
/// GET /profile
async fn profile(SessionClaims(claims): SessionClaims) -> Json<Claims> {
    Json(claims)
}

/// Clear the session cookie
///
/// POST /logout
async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    (
        jar.add(cleared_cookie(state.cookie_name())),
        Json("Logged out successfully"),
    )
}

/// Create account and session routes
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/profile", get(profile))
        .route("/logout", post(logout))
}
