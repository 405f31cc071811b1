//! Session token claims and login response.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Claims carried by a session token
///
/// Only `id` is required. Claims the server does not know about are kept
/// in `extra` and returned unchanged by `/profile`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Identity provider uid of the caller
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Issued at (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Expiration time (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    /// Claims naming only the caller
    pub fn for_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: None,
            iat: None,
            exp: None,
            extra: Map::new(),
        }
    }
}

/// Response of `/login`
#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub id: String,
    pub username: String,
    pub token: String,
}
