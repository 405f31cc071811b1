//! # Blog Server
//!
//! A small blog backend: accounts are delegated to an external identity
//! provider, posts live in RocksDB and cover images in a blob store served
//! through signed URLs.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                   HTTP Server                    │
//! │  ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌─────┐  │
//! │  │ Auth API │ │ Post API │ │  Blobs   │ │Health│ │
//! │  └──────────┘ └──────────┘ └──────────┘ └─────┘  │
//! ├──────────────────────────────────────────────────┤
//! │                    Services                      │
//! │  ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌─────┐  │
//! │  │ Database │ │BlobStore │ │ Identity │ │Token│  │
//! │  └──────────┘ └──────────┘ └──────────┘ └─────┘  │
//! ├──────────────────────────────────────────────────┤
//! │     RocksDB / File System / Identity REST API    │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the server
//! JWT_SECRET=... BLOB_SIGNING_KEY=... IDENTITY_API_KEY=... cargo run --release
//!
//! # Read the newest posts
//! curl http://localhost:4000/post
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod state;

pub use config::Config;
pub use error::{AppError, Result};
pub use middleware::{RateLimiter, SessionClaims};
pub use state::AppState;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    Router,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};

/// Room for text fields and multipart framing on top of the cover itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Run the blog server with the given configuration.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    let state = AppState::new(config).await?;
    let app = create_router(state);

    info!(address = %addr, "Blog server starting");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors.allowed_origins);

    let body_limit = (state.config.upload.max_upload_size as usize).saturating_add(MULTIPART_OVERHEAD);

    let rate_limiter = RateLimiter::new(&state.config.rate_limit);

    if state.config.rate_limit.enabled {
        info!(
            requests_per_window = state.config.rate_limit.requests_per_window,
            auth_requests_per_window = state.config.rate_limit.auth_requests_per_window,
            window_seconds = state.config.rate_limit.window_seconds,
            "Rate limiting enabled"
        );
    }

    Router::new()
        .merge(handlers::auth_routes())
        .nest("/post", handlers::post_routes())
        .nest("/blobs", handlers::blob_routes())
        .nest("/health", handlers::health_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(rate_limiter.layer())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS policy for the configured front-end origins
///
/// An empty list allows any origin without credentials.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::PUT, Method::OPTIONS];

    if allowed_origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, starting graceful shutdown"),
        Err(e) => {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    }
}
