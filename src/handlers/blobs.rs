//! Signed blob serving.
//!
//! - `GET /blobs/{bucket}/{*key}?exp={unix}&sig={hex}` - Stream a stored cover
//!
//! Every read needs a URL issued by the blob store. Responses carry
//! `Cache-Control: public, max-age={from config}`.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::state::AppState;

/// Signature query parameters
#[derive(Debug, Deserialize)]
pub struct SignedQuery {
    exp: Option<u64>,
    sig: Option<String>,
}

/// Serve a stored object
///
/// GET /blobs/{bucket}/{*key}
async fn serve_blob(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<SignedQuery>,
) -> Result<Response> {
    let (Some(expires), Some(signature)) = (query.exp, query.sig.as_deref()) else {
        return Err(AppError::forbidden("Signed URL parameters are missing"));
    };

    state.url_signer.verify(&bucket, &key, expires, signature)?;

    if bucket != state.blobs.bucket() {
        return Err(AppError::not_found(format!("Unknown bucket: {}", bucket)));
    }

    let blob = state
        .blobs
        .open(&key)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Object not found: {}", key)))?;

    let cache_control = format!("public, max-age={}", state.cache_max_age());
    let size = blob.metadata.size;

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, &blob.metadata.content_type)
        .header(header::CONTENT_LENGTH, size)
        .header(header::CACHE_CONTROL, cache_control)
        .header("X-Content-Type-Options", "nosniff")
        .body(Body::from_stream(ReaderStream::new(blob.reader)))
        .map_err(|e| AppError::internal(format!("Failed to build response: {}", e)))?;

    debug!(bucket = %bucket, key = %key, size, "Served blob");

    Ok(response)
}

/// Create blob serving routes
pub fn blob_routes() -> Router<AppState> {
    Router::new().route("/{bucket}/{*key}", get(serve_blob))
}
