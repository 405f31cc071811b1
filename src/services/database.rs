//! Document store using RocksDB.
//!
//! RocksDB provides crash safety through its LSM-tree architecture and
//! write-ahead log (WAL). All multi-key writes go through a `WriteBatch`.
//!
//! # Data Organization
//!
//! Uses column families to separate collections:
//! - `users`: User records (key: identity provider uid)
//! - `posts`: Post records (key: UUID)
//! - `posts_by_created`: Creation index (key: `{nanos:020}:{uuid}`)
//!
//! The creation index sorts lexicographically by creation time, so the
//! newest posts are read by iterating it from the end.

use crate::config::DatabaseConfig;
use crate::error::{AppError, Result};
use crate::models::{Post, User};
use rocksdb::{
    ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded, Options, WriteBatch,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

type DB = DBWithThreadMode<MultiThreaded>;

/// Column family names
const CF_USERS: &str = "users";
const CF_POSTS: &str = "posts";
const CF_POSTS_BY_CREATED: &str = "posts_by_created";

/// Document operations used by the handlers
pub trait DocumentStore: Send + Sync {
    /// Cheap round trip used by the readiness check
    fn ping(&self) -> Result<()>;

    /// Insert or replace a user record
    fn upsert_user(&self, user: &User) -> Result<()>;

    /// Get a user record by identity provider uid
    fn get_user(&self, id: &str) -> Result<Option<User>>;

    /// Insert a new post
    fn insert_post(&self, post: &Post) -> Result<()>;

    fn get_post(&self, id: Uuid) -> Result<Option<Post>>;

    /// Replace an existing post; `NotFound` when it does not exist
    fn update_post(&self, post: &Post) -> Result<()>;

    /// Newest posts first, at most `limit`
    fn recent_posts(&self, limit: usize) -> Result<Vec<Post>>;
}

/// RocksDB-backed document store for users and posts
#[derive(Clone)]
pub struct DatabaseService {
    db: Arc<DB>,
    db_path: PathBuf,
}

impl std::fmt::Debug for DatabaseService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseService")
            .field("path", &self.db_path)
            .finish()
    }
}

impl DatabaseService {
    /// Open (or create) the document store
    pub fn new(config: &DatabaseConfig) -> Result<Self> {
        let db_path = config.path.clone();

        // Ensure directory exists
        std::fs::create_dir_all(&db_path)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(256);
        opts.set_keep_log_file_num(3);
        opts.set_max_total_wal_size(64 * 1024 * 1024); // 64MB

        let cf_descriptors: Vec<_> = [CF_USERS, CF_POSTS, CF_POSTS_BY_CREATED]
            .iter()
            .map(|name| {
                let mut cf_opts = Options::default();
                cf_opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
                ColumnFamilyDescriptor::new(*name, cf_opts)
            })
            .collect();

        let db = DB::open_cf_descriptors(&opts, &db_path, cf_descriptors)
            .map_err(|e| AppError::internal(format!("Failed to open RocksDB: {}", e)))?;

        info!(path = %db_path.display(), "Document store initialized (RocksDB)");

        Ok(Self {
            db: Arc::new(db),
            db_path,
        })
    }

    fn cf(&self, name: &'static str) -> Result<Arc<rocksdb::BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| AppError::internal(format!("Column family {} missing", name)))
    }

    /// Index key ordering posts by creation time
    fn created_key(post: &Post) -> String {
        let nanos = post
            .created_at
            .timestamp_nanos_opt()
            .unwrap_or_else(|| post.created_at.timestamp_micros() * 1000)
            .max(0);
        format!("{:020}:{}", nanos, post.id)
    }
}

impl DocumentStore for DatabaseService {
    fn ping(&self) -> Result<()> {
        self.db.get_cf(&self.cf(CF_USERS)?, b"__ping__")?;
        Ok(())
    }

    // =========================================================================
    // Users
    // =========================================================================

    fn upsert_user(&self, user: &User) -> Result<()> {
        let data = serde_json::to_vec(user)?;
        self.db
            .put_cf(&self.cf(CF_USERS)?, user.id.as_bytes(), data)?;

        debug!(id = %user.id, "Stored user record");
        Ok(())
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        match self.db.get_cf(&self.cf(CF_USERS)?, id.as_bytes())? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Posts
    // =========================================================================

    /// Post and creation index entry go in one batch
    fn insert_post(&self, post: &Post) -> Result<()> {
        let data = serde_json::to_vec(post)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&self.cf(CF_POSTS)?, post.id.to_string().as_bytes(), &data);
        batch.put_cf(
            &self.cf(CF_POSTS_BY_CREATED)?,
            Self::created_key(post).as_bytes(),
            post.id.to_string().as_bytes(),
        );
        self.db.write(batch)?;

        debug!(id = %post.id, author = %post.author, "Inserted post");
        Ok(())
    }

    fn get_post(&self, id: Uuid) -> Result<Option<Post>> {
        match self
            .db
            .get_cf(&self.cf(CF_POSTS)?, id.to_string().as_bytes())?
        {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    /// `created_at` is immutable, so the creation index is left alone.
    fn update_post(&self, post: &Post) -> Result<()> {
        if self.get_post(post.id)?.is_none() {
            return Err(AppError::not_found(format!("Post not found: {}", post.id)));
        }

        let data = serde_json::to_vec(post)?;
        self.db
            .put_cf(&self.cf(CF_POSTS)?, post.id.to_string().as_bytes(), data)?;

        debug!(id = %post.id, "Updated post");
        Ok(())
    }

    fn recent_posts(&self, limit: usize) -> Result<Vec<Post>> {
        let mut posts = Vec::with_capacity(limit);
        let iter = self
            .db
            .iterator_cf(&self.cf(CF_POSTS_BY_CREATED)?, IteratorMode::End);

        for item in iter {
            if posts.len() >= limit {
                break;
            }

            let (_, value) = item?;
            let id_str = String::from_utf8_lossy(&value);
            let id = Uuid::parse_str(&id_str)
                .map_err(|e| AppError::internal(format!("Corrupt creation index: {}", e)))?;

            // Skip dangling index entries
            if let Some(post) = self.get_post(id)? {
                posts.push(post);
            }
        }

        Ok(posts)
    }
}
