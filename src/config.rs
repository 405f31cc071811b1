//! Configuration module for the blog server.
//!
//! This module handles loading and validating configuration from TOML files,
//! then applies environment overrides for deployment secrets.
//!
//! # Configuration Sources (in order of priority)
//! 1. Environment variables (`PORT`, `JWT_SECRET`, `DATABASE_URL`, ...)
//! 2. `config.local.toml` - Local overrides (gitignored)
//! 3. `config.toml` - Main configuration file
//! 4. Default values
//!
//! # Example
//! ```rust,ignore
//! let config = Config::load("config.toml")?;
//! println!("Server will listen on {}:{}", config.server.host, config.server.port);
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub identity: IdentityConfig,
    pub blob: BlobConfig,
    pub upload: UploadConfig,
    pub cors: CorsConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind the API to
    pub host: String,
    /// Port for the API
    pub port: u16,
    /// Public base URL, used when building signed blob URLs
    pub base_url: String,
    /// Cache-Control max-age for served blobs, in seconds
    pub cache_max_age: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
            base_url: "http://localhost:4000".to_string(),
            cache_max_age: 86_400,
        }
    }
}

/// Document store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Directory holding the RocksDB instance
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/rocksdb"),
        }
    }
}

/// Session token configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 signing secret shared with whoever issues tokens
    pub jwt_secret: String,
    /// Lifetime of tokens issued by `/login`
    pub token_ttl_seconds: u64,
    /// Name of the session cookie
    pub cookie_name: String,
    /// Reject tokens without an `exp` claim
    pub require_exp: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_seconds: 7 * 24 * 3600,
            cookie_name: "token".to_string(),
            require_exp: false,
        }
    }
}

/// External identity provider configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Base URL of the Identity Toolkit compatible REST API
    pub endpoint: String,
    /// Project API key passed as `?key=`
    pub api_key: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://identitytoolkit.googleapis.com/v1".to_string(),
            api_key: String::new(),
            timeout_seconds: 10,
        }
    }
}

/// Blob storage configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BlobConfig {
    /// Root directory for the local blob adapter
    pub root_dir: PathBuf,
    /// Bucket name; objects live under `root_dir/bucket`
    pub bucket: String,
    /// HMAC key for signed read URLs
    pub signing_key: String,
    /// Key prefix for uploaded covers
    pub cover_prefix: String,
    /// Lifetime of signed read URLs (default: 100 years)
    pub signed_url_ttl_seconds: u64,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("data/blobs"),
            bucket: "blog".to_string(),
            signing_key: String::new(),
            cover_prefix: "blog_covers".to_string(),
            signed_url_ttl_seconds: 100 * 365 * 24 * 3600,
        }
    }
}

impl BlobConfig {
    /// Get the full path to the bucket directory
    pub fn bucket_path(&self) -> PathBuf {
        self.root_dir.join(&self.bucket)
    }
}

/// Upload configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Maximum cover size (bytes)
    pub max_upload_size: u64,
    /// Allowed MIME types for covers (empty = any)
    pub allowed_image_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_upload_size: 50 * 1024 * 1024,
            allowed_image_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/gif".to_string(),
                "image/webp".to_string(),
            ],
        }
    }
}

impl UploadConfig {
    /// Check if a MIME type is allowed for covers
    pub fn is_allowed_type(&self, mime_type: &str) -> bool {
        self.allowed_image_types.is_empty()
            || self.allowed_image_types.iter().any(|t| t == mime_type)
    }
}

/// CORS configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins; empty allows any origin without credentials
    pub allowed_origins: Vec<String>,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    pub enabled: bool,
    /// Maximum requests per window; 0 leaves general traffic unlimited
    pub requests_per_window: u32,
    /// Maximum `/register` and `/login` requests per window; 0 disables
    pub auth_requests_per_window: u32,
    /// Window duration in seconds
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_window: 300,
            auth_requests_per_window: 20,
            window_seconds: 60,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a file path
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read or parsed
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default locations
    ///
    /// Tries `config.local.toml`, then `config.toml`, then falls back to
    /// built-in defaults. Environment overrides apply in every case.
    pub fn load_default() -> Result<Self, ConfigError> {
        for candidate in ["config.local.toml", "config.toml"] {
            if Path::new(candidate).exists() {
                return Self::load(candidate);
            }
        }

        let mut config = Config::default();
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply deployment overrides from a variable lookup
    fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.server.port = port.parse().map_err(|_| {
                ConfigError::ValidationError(format!("PORT is not a valid port: {}", port))
            })?;
        }
        if let Some(base_url) = lookup("BASE_URL") {
            self.server.base_url = base_url;
        }
        if let Some(path) = lookup("DATABASE_URL") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(secret) = lookup("JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Some(endpoint) = lookup("IDENTITY_ENDPOINT") {
            self.identity.endpoint = endpoint;
        }
        if let Some(api_key) = lookup("IDENTITY_API_KEY") {
            self.identity.api_key = api_key;
        }
        if let Some(bucket) = lookup("BLOB_BUCKET") {
            self.blob.bucket = bucket;
        }
        if let Some(key) = lookup("BLOB_SIGNING_KEY") {
            self.blob.signing_key = key;
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.is_empty() {
            return Err(ConfigError::ValidationError(
                "auth.jwt_secret (JWT_SECRET) must be set".to_string(),
            ));
        }

        if self.blob.signing_key.is_empty() {
            return Err(ConfigError::ValidationError(
                "blob.signing_key (BLOB_SIGNING_KEY) must be set".to_string(),
            ));
        }

        if self.blob.bucket.is_empty()
            || self.blob.bucket.contains('/')
            || !self.blob.bucket.chars().all(is_key_char)
        {
            return Err(ConfigError::ValidationError(
                "blob.bucket must be a non-empty name of [A-Za-z0-9._-]".to_string(),
            ));
        }

        if self.blob.cover_prefix.starts_with('/')
            || self.blob.cover_prefix.ends_with('/')
            || self.blob.cover_prefix.contains("//")
            || !self.blob.cover_prefix.chars().all(is_key_char)
        {
            return Err(ConfigError::ValidationError(
                "blob.cover_prefix must be '/'-separated segments of [A-Za-z0-9._-]".to_string(),
            ));
        }

        // Validate base_url doesn't have trailing slash
        if self.server.base_url.ends_with('/') {
            return Err(ConfigError::ValidationError(
                "base_url should not have a trailing slash".to_string(),
            ));
        }

        if self.upload.max_upload_size == 0 {
            return Err(ConfigError::ValidationError(
                "upload.max_upload_size must be greater than 0".to_string(),
            ));
        }

        if self.rate_limit.enabled && self.rate_limit.window_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "rate_limit.window_seconds must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Characters allowed in bucket names and key prefixes; they need no
/// escaping inside a URL path
fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '/')
}
