//! HTTP request handlers for the blog server.
//!
//! This module contains all endpoint handlers organized by functionality:
//! - `auth`: Registration, login, profile and logout
//! - `posts`: Creating, editing and reading posts
//! - `blobs`: Serving covers through signed URLs
//! - `health`: Health check endpoints

pub mod auth;
pub mod blobs;
pub mod health;
pub mod posts;

pub use auth::auth_routes;
pub use blobs::blob_routes;
pub use health::health_routes;
pub use posts::post_routes;
