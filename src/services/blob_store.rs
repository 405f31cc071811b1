//! Blob storage for post covers.
//!
//! `BlobStore` is the seam to the object store. The bundled
//! `LocalBlobStore` keeps objects on the local file system and hands out
//! HMAC-signed read URLs served by `GET /blobs/{bucket}/{*key}`.
//!
//! # File Organization
//!
//! ```text
//! data/blobs/
//! └── {bucket}/
//!     └── blog_covers/
//!         ├── 1a2b3c4d-cover.png             # object bytes
//!         └── 1a2b3c4d-cover.png.meta.json   # content type, size, upload time
//! ```

use crate::config::BlobConfig;
use crate::error::{AppError, Result};
use crate::services::url_signer::UrlSigner;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use tokio::fs;
use tokio::io::AsyncRead;
use tracing::{debug, info};
use uuid::Uuid;

/// Suffix of the metadata sidecar written next to every object
const META_SUFFIX: &str = ".meta.json";

/// Metadata kept for every stored object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobMetadata {
    pub content_type: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
}

/// Open object ready to be streamed
pub struct BlobReader {
    pub metadata: BlobMetadata,
    pub reader: Pin<Box<dyn AsyncRead + Send>>,
}

/// Object store operations used by the handlers
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Bucket objects are written to
    fn bucket(&self) -> &str;

    /// Write an object, replacing any previous one under `key`
    async fn put(&self, key: &str, content_type: &str, data: Bytes) -> Result<()>;

    /// Long-lived signed read URL for `key`
    async fn signed_read_url(&self, key: &str) -> Result<String>;

    /// Open an object for reading; `None` when absent
    async fn open(&self, key: &str) -> Result<Option<BlobReader>>;

    /// Remove an object; absent objects are not an error
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Build the object key for an uploaded cover
///
/// Keys are unique per upload: `{prefix}/{8 hex}-{sanitized filename}`.
pub fn cover_key(prefix: &str, original_filename: &str) -> String {
    let sanitized: String = original_filename
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '-' || *c == '_')
        .collect();
    let sanitized = sanitized.trim_start_matches('.');
    let name = if sanitized.is_empty() { "upload" } else { sanitized };

    let unique = &Uuid::new_v4().as_simple().to_string()[..8];

    if prefix.is_empty() {
        format!("{}-{}", unique, name)
    } else {
        format!("{}/{}-{}", prefix, unique, name)
    }
}

/// File system backed blob store
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    /// `root_dir/bucket`
    bucket_dir: PathBuf,
    bucket: String,
    signer: UrlSigner,
    signed_url_ttl: u64,
}

impl LocalBlobStore {
    /// Create the store and its bucket directory
    pub async fn new(config: &BlobConfig, signer: UrlSigner) -> Result<Self> {
        let bucket_dir = config.bucket_path();

        if !bucket_dir.exists() {
            fs::create_dir_all(&bucket_dir).await?;
        }

        info!(
            bucket = %config.bucket,
            path = %bucket_dir.display(),
            "Blob store initialized"
        );

        Ok(Self {
            bucket_dir,
            bucket: config.bucket.clone(),
            signer,
            signed_url_ttl: config.signed_url_ttl_seconds,
        })
    }

    /// Resolve a key to a path inside the bucket, rejecting traversal
    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.ends_with(META_SUFFIX) {
            return Err(AppError::not_found(format!("Invalid object key: {}", key)));
        }

        let relative = Path::new(key);
        let only_normal = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !only_normal {
            return Err(AppError::not_found(format!("Invalid object key: {}", key)));
        }

        Ok(self.bucket_dir.join(relative))
    }

    fn meta_path(path: &Path) -> PathBuf {
        let mut meta = path.as_os_str().to_owned();
        meta.push(META_SUFFIX);
        PathBuf::from(meta)
    }

    async fn read_metadata(path: &Path) -> Result<BlobMetadata> {
        let meta_path = Self::meta_path(path);

        if meta_path.exists() {
            let raw = fs::read(&meta_path).await?;
            return Ok(serde_json::from_slice(&raw)?);
        }

        // Objects copied in by hand have no sidecar
        let file_meta = fs::metadata(path).await?;
        Ok(BlobMetadata {
            content_type: mime_guess::from_path(path)
                .first_or_octet_stream()
                .to_string(),
            size: file_meta.len(),
            uploaded_at: file_meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now()),
        })
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, content_type: &str, data: Bytes) -> Result<()> {
        let path = self.path_for(key)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::storage(format!("Failed to create {}: {}", parent.display(), e)))?;
        }

        fs::write(&path, &data)
            .await
            .map_err(|e| AppError::storage(format!("Failed to write {}: {}", key, e)))?;

        let metadata = BlobMetadata {
            content_type: content_type.to_string(),
            size: data.len() as u64,
            uploaded_at: Utc::now(),
        };
        fs::write(Self::meta_path(&path), serde_json::to_vec(&metadata)?)
            .await
            .map_err(|e| AppError::storage(format!("Failed to write metadata for {}: {}", key, e)))?;

        debug!(
            key = %key,
            path = %path.display(),
            size = data.len(),
            "Stored blob"
        );

        Ok(())
    }

    async fn signed_read_url(&self, key: &str) -> Result<String> {
        // Never sign a key that `open` would refuse
        self.path_for(key)?;
        self.signer.sign(&self.bucket, key, self.signed_url_ttl)
    }

    async fn open(&self, key: &str) -> Result<Option<BlobReader>> {
        let path = self.path_for(key)?;

        if !path.is_file() {
            return Ok(None);
        }

        let metadata = Self::read_metadata(&path).await?;
        let file = fs::File::open(&path).await?;

        Ok(Some(BlobReader {
            metadata,
            reader: Box::pin(file),
        }))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;

        for target in [Self::meta_path(&path), path] {
            if target.exists() {
                fs::remove_file(&target).await?;
            }
        }

        debug!(key = %key, "Deleted blob");
        Ok(())
    }
}
