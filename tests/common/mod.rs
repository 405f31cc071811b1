//! Common test utilities and helpers.

#![allow(dead_code)]

use async_trait::async_trait;
use blog_server::{
    config::{
        AuthConfig, BlobConfig, Config, CorsConfig, DatabaseConfig, IdentityConfig, LoggingConfig,
        RateLimitConfig, ServerConfig, UploadConfig,
    },
    create_router,
    error::{AppError, Result},
    services::{
        BlobReader, BlobStore, DatabaseService, DocumentStore, IdentityError, IdentityProvider,
        LocalBlobStore, ProviderAccount, UrlSigner,
    },
    models::{Post, User},
    AppState,
};
use bytes::Bytes;
use reqwest::multipart;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener as TokioTcpListener;
use uuid::Uuid;

/// Smallest byte string recognised as a PNG
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01\x08\x02\0\0\0";

pub const PASSWORD: &str = "correct-horse";

/// Test server instance
pub struct TestServer {
    pub base_url: String,
    pub state: AppState,
    pub data_dir: TempDir,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Start a test server on a random port with a local blob store
    pub async fn start() -> Self {
        Self::launch(|_| {}, None, false).await
    }

    /// Start a test server after adjusting its configuration
    pub async fn start_with_config(configure: impl FnOnce(&mut Config)) -> Self {
        Self::launch(configure, None, false).await
    }

    /// Start a test server whose blob store fails every write
    pub async fn start_with_failing_blobs() -> Self {
        Self::launch(|_| {}, Some(Arc::new(FailingBlobStore)), false).await
    }

    /// Start a test server whose document store refuses post writes
    pub async fn start_with_failing_post_writes() -> Self {
        Self::launch(|_| {}, None, true).await
    }

    async fn launch(
        configure: impl FnOnce(&mut Config),
        blobs: Option<Arc<dyn BlobStore>>,
        fail_post_writes: bool,
    ) -> Self {
        let port = get_available_port();
        let data_dir = TempDir::new().expect("Failed to create temp dir");
        let base_url = format!("http://127.0.0.1:{}", port);

        let mut config = create_test_config(&data_dir, port, &base_url);
        configure(&mut config);

        let db = DatabaseService::new(&config.database).expect("Failed to open database");
        let db: Arc<dyn DocumentStore> = if fail_post_writes {
            Arc::new(FailingPostStore(db))
        } else {
            Arc::new(db)
        };
        let blobs = match blobs {
            Some(blobs) => blobs,
            None => {
                let signer = UrlSigner::new(&config.blob.signing_key, &config.server.base_url);
                Arc::new(
                    LocalBlobStore::new(&config.blob, signer)
                        .await
                        .expect("Failed to create blob store"),
                )
            }
        };

        let state = AppState::with_services(
            config,
            db,
            blobs,
            Arc::new(FakeIdentityProvider::default()),
        );
        let app = create_router(state.clone());

        let addr: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();
        let listener = TokioTcpListener::bind(addr)
            .await
            .expect("Failed to bind listener");

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            tokio::select! {
                _ = axum::serve(
                    listener,
                    app.into_make_service_with_connect_info::<SocketAddr>(),
                ) => {}
                _ = shutdown_rx => {}
            }
        });

        // Give the server time to start
        tokio::time::sleep(Duration::from_millis(50)).await;

        Self {
            base_url,
            state,
            data_dir,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get HTTP client
    pub fn client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap()
    }

    /// Get URL for a path
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Register an account
    pub async fn register(&self, username: &str) -> reqwest::Response {
        self.client()
            .post(self.url("/register"))
            .json(&json!({ "username": username, "password": PASSWORD }))
            .send()
            .await
            .expect("Failed to send request")
    }

    /// Register and log in, returning the session token and user id
    pub async fn login(&self, username: &str) -> (String, String) {
        self.register(username).await;

        let response = self
            .client()
            .post(self.url("/login"))
            .json(&json!({ "username": username, "password": PASSWORD }))
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(response.status(), 200);

        let json: Value = response.json().await.unwrap();
        (
            json["token"].as_str().unwrap().to_string(),
            json["id"].as_str().unwrap().to_string(),
        )
    }

    /// Create a post and return its JSON
    pub async fn create_post(&self, token: &str, title: &str) -> Value {
        let response = self
            .client()
            .post(self.url("/post"))
            .bearer_auth(token)
            .multipart(post_form(title, "S", "C", Some(cover_part("cover.png"))))
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(response.status(), 201);

        response.json().await.unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Multipart cover part holding a tiny PNG
pub fn cover_part(filename: &str) -> multipart::Part {
    multipart::Part::bytes(PNG_BYTES.to_vec())
        .file_name(filename.to_string())
        .mime_str("image/png")
        .unwrap()
}

/// Multipart form for `POST /post`
pub fn post_form(
    title: &str,
    summary: &str,
    content: &str,
    file: Option<multipart::Part>,
) -> multipart::Form {
    let form = multipart::Form::new()
        .text("title", title.to_string())
        .text("summary", summary.to_string())
        .text("content", content.to_string());

    match file {
        Some(part) => form.part("file", part),
        None => form,
    }
}

/// Create test configuration
fn create_test_config(data_dir: &TempDir, port: u16, base_url: &str) -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port,
            base_url: base_url.to_string(),
            cache_max_age: 3600,
        },
        database: DatabaseConfig {
            path: data_dir.path().join("db"),
        },
        auth: AuthConfig {
            jwt_secret: "test-jwt-secret".to_string(),
            token_ttl_seconds: 3600,
            cookie_name: "token".to_string(),
            require_exp: false,
        },
        identity: IdentityConfig::default(),
        blob: BlobConfig {
            root_dir: data_dir.path().join("blobs"),
            bucket: "blog".to_string(),
            signing_key: "test-signing-key".to_string(),
            cover_prefix: "blog_covers".to_string(),
            signed_url_ttl_seconds: 3600,
        },
        upload: UploadConfig {
            max_upload_size: 1024 * 1024,
            ..UploadConfig::default()
        },
        cors: CorsConfig::default(),
        rate_limit: RateLimitConfig {
            enabled: false,
            ..RateLimitConfig::default()
        },
        logging: LoggingConfig::default(),
    }
}

/// Find an available TCP port
fn get_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to random port")
        .local_addr()
        .expect("Failed to get local address")
        .port()
}

/// In-memory identity provider with Identity Toolkit style errors
#[derive(Default)]
pub struct FakeIdentityProvider {
    /// email -> (uid, password)
    accounts: Mutex<HashMap<String, (String, String)>>,
}

fn rejected(message: &str) -> IdentityError {
    IdentityError::Rejected {
        message: message.to_string(),
        payload: json!({
            "code": 400,
            "message": message,
            "errors": [{ "message": message, "domain": "global", "reason": "invalid" }],
        }),
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn create_account(
        &self,
        email: &str,
        password: &str,
    ) -> std::result::Result<ProviderAccount, IdentityError> {
        if password.len() < 6 {
            return Err(rejected("WEAK_PASSWORD : Password should be at least 6 characters"));
        }

        let mut accounts = self.accounts.lock().unwrap();
        if accounts.contains_key(email) {
            return Err(rejected("EMAIL_EXISTS"));
        }

        let uid = format!("uid-{}", accounts.len() + 1);
        accounts.insert(email.to_string(), (uid.clone(), password.to_string()));

        Ok(ProviderAccount {
            uid,
            email: email.to_string(),
            display_name: None,
        })
    }

    async fn verify_password(
        &self,
        email: &str,
        password: &str,
    ) -> std::result::Result<ProviderAccount, IdentityError> {
        let accounts = self.accounts.lock().unwrap();
        match accounts.get(email) {
            Some((uid, stored)) if stored == password => Ok(ProviderAccount {
                uid: uid.clone(),
                email: email.to_string(),
                display_name: None,
            }),
            _ => Err(rejected("INVALID_LOGIN_CREDENTIALS")),
        }
    }
}

/// Blob store whose writes always fail
pub struct FailingBlobStore;

#[async_trait]
impl BlobStore for FailingBlobStore {
    fn bucket(&self) -> &str {
        "blog"
    }

    async fn put(&self, key: &str, _content_type: &str, _data: Bytes) -> Result<()> {
        Err(AppError::storage(format!("Failed to write {}: disk full", key)))
    }

    async fn signed_read_url(&self, _key: &str) -> Result<String> {
        Err(AppError::storage("unreachable"))
    }

    async fn open(&self, _key: &str) -> Result<Option<BlobReader>> {
        Ok(None)
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        Ok(())
    }
}

/// Document store that reads through to RocksDB but refuses post writes
pub struct FailingPostStore(DatabaseService);

impl DocumentStore for FailingPostStore {
    fn ping(&self) -> Result<()> {
        self.0.ping()
    }

    fn upsert_user(&self, user: &User) -> Result<()> {
        self.0.upsert_user(user)
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        self.0.get_user(id)
    }

    fn insert_post(&self, post: &Post) -> Result<()> {
        Err(AppError::internal(format!("Failed to write post {}", post.id)))
    }

    fn get_post(&self, id: Uuid) -> Result<Option<Post>> {
        self.0.get_post(id)
    }

    fn update_post(&self, post: &Post) -> Result<()> {
        Err(AppError::internal(format!("Failed to write post {}", post.id)))
    }

    fn recent_posts(&self, limit: usize) -> Result<Vec<Post>> {
        self.0.recent_posts(limit)
    }
}

/// Files stored under the cover prefix
pub fn stored_covers(server: &TestServer) -> Vec<String> {
    let dir = server.data_dir.path().join("blobs").join("blog").join("blog_covers");
    match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    }
}
