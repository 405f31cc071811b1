//! Middleware components for the blog server.
//!
//! This module contains middleware for:
//! - Rate limiting
//! - Session token authentication

pub mod auth;
pub mod rate_limit;

pub use auth::{cleared_cookie, extract_session_token, session_cookie, SessionClaims};
pub use rate_limit::{LimitScope, RateLimiter, RateLimiterLayer};
