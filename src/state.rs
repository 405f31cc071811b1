//! Application state management.
//!
//! This module defines the shared application state that is accessible
//! from all request handlers via Axum's State extractor.
//!
//! # Usage
//!
//! ```rust,ignore
//! async fn handler(State(state): State<AppState>) -> impl IntoResponse {
//!     let post = state.db.get_post(id)?;
//!     // ...
//! }
//! ```

use crate::config::Config;
use crate::error::Result;
use crate::services::{
    BlobStore, DatabaseService, DocumentStore, HttpIdentityProvider, IdentityProvider,
    LocalBlobStore, TokenService, UrlSigner,
};
use std::sync::Arc;

/// Shared application state
///
/// Cloned into every request handler; all services sit behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,

    /// Document store for users and posts
    pub db: Arc<dyn DocumentStore>,

    /// Object store holding post covers
    pub blobs: Arc<dyn BlobStore>,

    /// External account provider
    pub identity: Arc<dyn IdentityProvider>,

    /// Session token signer
    pub tokens: Arc<TokenService>,

    /// Verifier for signed blob URLs
    pub url_signer: Arc<UrlSigner>,
}

impl AppState {
    /// Create application state with the bundled service implementations
    ///
    /// # Errors
    /// Returns error if the database, blob directory or HTTP client cannot be
    /// initialized
    pub async fn new(config: Config) -> Result<Self> {
        let db = DatabaseService::new(&config.database)?;
        let signer = UrlSigner::new(&config.blob.signing_key, &config.server.base_url);
        let blobs = LocalBlobStore::new(&config.blob, signer).await?;
        let identity = HttpIdentityProvider::new(&config.identity)?;

        Ok(Self::with_services(
            config,
            Arc::new(db),
            Arc::new(blobs),
            Arc::new(identity),
        ))
    }

    /// Create application state around existing services
    pub fn with_services(
        config: Config,
        db: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let tokens = TokenService::new(&config.auth);
        let url_signer = UrlSigner::new(&config.blob.signing_key, &config.server.base_url);

        Self {
            config: Arc::new(config),
            db,
            blobs,
            identity,
            tokens: Arc::new(tokens),
            url_signer: Arc::new(url_signer),
        }
    }

    /// Name of the session cookie
    pub fn cookie_name(&self) -> &str {
        &self.config.auth.cookie_name
    }

    /// Key prefix for uploaded covers
    pub fn cover_prefix(&self) -> &str {
        &self.config.blob.cover_prefix
    }

    /// Maximum cover size in bytes
    pub fn max_upload_size(&self) -> u64 {
        self.config.upload.max_upload_size
    }

    /// Get cache max age in seconds
    pub fn cache_max_age(&self) -> u64 {
        self.config.server.cache_max_age
    }

    /// Check if a cover MIME type is allowed
    pub fn is_allowed_image_type(&self, mime_type: &str) -> bool {
        self.config.upload.is_allowed_type(mime_type)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &"<Config>")
            .field("db", &"<DocumentStore>")
            .field("blobs", &self.blobs.bucket())
            .field("identity", &"<IdentityProvider>")
            .field("tokens", &self.tokens)
            .finish()
    }
}
