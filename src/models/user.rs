//! Local user record.
//!
//! Accounts live in the identity provider; this record only exists so posts
//! can resolve their author's display name.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User known to the document store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Identity provider uid
    pub id: String,
    /// Registration e-mail, used as display name
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: String, username: String) -> Self {
        Self {
            id,
            username,
            created_at: Utc::now(),
        }
    }
}

/// Body of `/register` and `/login`
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}
