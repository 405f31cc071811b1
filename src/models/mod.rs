//! Data models for the blog server.
//!
//! This module contains all domain models and data transfer objects (DTOs)
//! used throughout the application.

mod post;
mod session;
mod user;

pub use post::*;
pub use session::*;
pub use user::*;
