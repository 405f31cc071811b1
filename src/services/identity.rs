//! External identity provider.
//!
//! Accounts and passwords live entirely in the provider. The bundled
//! `HttpIdentityProvider` speaks the Identity Toolkit REST dialect:
//! - `POST {endpoint}/accounts:signUp?key={api_key}`
//! - `POST {endpoint}/accounts:signInWithPassword?key={api_key}`
//!
//! Provider rejections keep their raw JSON payload so handlers can forward
//! it to the client.

use crate::config::IdentityConfig;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Account record returned by the provider
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderAccount {
    pub uid: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Failures talking to the identity provider
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The provider understood the request and refused it
    #[error("Identity provider rejected the request: {message}")]
    Rejected {
        message: String,
        payload: serde_json::Value,
    },

    /// Transport failure, provider-side error or unreadable response
    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),
}

impl From<IdentityError> for AppError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Rejected { message, payload } => AppError::Upstream {
                code: "upstream_error",
                message,
                details: payload,
            },
            IdentityError::Unavailable(msg) => AppError::bad_gateway(msg),
        }
    }
}

/// Account operations delegated to the provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create an account with e-mail and password
    async fn create_account(
        &self,
        email: &str,
        password: &str,
    ) -> std::result::Result<ProviderAccount, IdentityError>;

    /// Check a password and return the matching account
    async fn verify_password(
        &self,
        email: &str,
        password: &str,
    ) -> std::result::Result<ProviderAccount, IdentityError>;
}

/// Successful account response body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    local_id: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    display_name: Option<String>,
}

impl From<AccountResponse> for ProviderAccount {
    fn from(response: AccountResponse) -> Self {
        Self {
            uid: response.local_id,
            email: response.email,
            display_name: response.display_name.filter(|n| !n.is_empty()),
        }
    }
}

/// Turn a 4xx body into a rejection carrying the provider payload
fn rejection_from_body(status: u16, body: &str) -> IdentityError {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => {
            let payload = value.get("error").cloned().unwrap_or(value);
            let message = payload
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {}", status));
            IdentityError::Rejected { message, payload }
        }
        Err(_) => IdentityError::Rejected {
            message: format!("HTTP {}", status),
            payload: serde_json::Value::String(body.to_string()),
        },
    }
}

/// Identity Toolkit REST client
#[derive(Debug, Clone)]
pub struct HttpIdentityProvider {
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpIdentityProvider {
    /// Create a new client from configuration
    pub fn new(config: &IdentityConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| AppError::config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client,
        })
    }

    async fn call(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> std::result::Result<ProviderAccount, IdentityError> {
        let url = format!("{}/accounts:{}?key={}", self.endpoint, method, self.api_key);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| IdentityError::Unavailable(format!("{} request failed: {}", method, e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| IdentityError::Unavailable(format!("Failed to read response: {}", e)))?;

        if status.is_client_error() {
            debug!(method, status = status.as_u16(), "Identity provider rejected request");
            return Err(rejection_from_body(status.as_u16(), &text));
        }

        if !status.is_success() {
            warn!(method, status = status.as_u16(), "Identity provider error");
            return Err(IdentityError::Unavailable(format!(
                "{} returned HTTP {}",
                method, status
            )));
        }

        let account: AccountResponse = serde_json::from_str(&text)
            .map_err(|e| IdentityError::Unavailable(format!("Unexpected response: {}", e)))?;

        Ok(account.into())
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn create_account(
        &self,
        email: &str,
        password: &str,
    ) -> std::result::Result<ProviderAccount, IdentityError> {
        self.call(
            "signUp",
            serde_json::json!({
                "email": email,
                "password": password,
                "returnSecureToken": true,
            }),
        )
        .await
    }

    async fn verify_password(
        &self,
        email: &str,
        password: &str,
    ) -> std::result::Result<ProviderAccount, IdentityError> {
        self.call(
            "signInWithPassword",
            serde_json::json!({
                "email": email,
                "password": password,
                "returnSecureToken": true,
            }),
        )
        .await
    }
}
