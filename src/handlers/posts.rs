//! Post endpoints.
//!
//! - `POST /post` - Create a post with a cover image (multipart)
//! - `PUT /post` - Edit a post; only its author may do so (multipart)
//! - `GET /post` - Newest posts with author names
//! - `GET /post/{id}` - Single post
//!
//! # Example
//!
//! ```bash
//! curl -X POST http://localhost:4000/post \
//!   -H "Authorization: Bearer $TOKEN" \
//!   -F title=Hello -F summary=First -F content='<p>Hi</p>' \
//!   -F "file=@cover.png"
//! ```

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::middleware::SessionClaims;
use crate::models::{Post, PostChanges, PostInput, PostView, User, RECENT_POSTS_LIMIT};
use crate::services::cover_key;
use crate::state::AppState;

/// Cover file received in a multipart form
struct CoverFile {
    filename: String,
    content_type: Option<String>,
    data: Bytes,
}

/// Fields of a create or edit form
#[derive(Default)]
struct PostForm {
    id: Option<String>,
    title: Option<String>,
    summary: Option<String>,
    content: Option<String>,
    file: Option<CoverFile>,
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::payload_too_large(e.body_text())
    } else {
        AppError::validation(format!("Invalid multipart data: {}", e.body_text()))
    }
}

/// Read the whole form
async fn read_post_form(mut multipart: Multipart) -> Result<PostForm> {
    let mut form = PostForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                let filename = field
                    .file_name()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "upload".to_string());
                let content_type = field.content_type().map(|s| s.to_string());

                let data = field.bytes().await.map_err(multipart_error)?;

                // Browsers send an empty part when no file was chosen
                if !data.is_empty() {
                    form.file = Some(CoverFile {
                        filename,
                        content_type,
                        data,
                    });
                }
            }
            "id" | "title" | "summary" | "content" => {
                let value = field.text().await.map_err(multipart_error)?;
                match name.as_str() {
                    "id" => form.id = Some(value),
                    "title" => form.title = Some(value),
                    "summary" => form.summary = Some(value),
                    _ => form.content = Some(value),
                }
            }
            other => {
                debug!(field = %other, "Ignoring unknown form field");
            }
        }
    }

    Ok(form)
}

/// Content type of an uploaded cover
///
/// Magic bytes first, then the declared part type, then the file extension.
fn detect_content_type(file: &CoverFile) -> String {
    if let Some(kind) = infer::get(&file.data) {
        return kind.mime_type().to_string();
    }

    file.content_type
        .clone()
        .filter(|ct| ct != "application/octet-stream")
        .or_else(|| {
            mime_guess::from_path(&file.filename)
                .first()
                .map(|m| m.to_string())
        })
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

/// Upload a cover and return its key and signed read URL
async fn store_cover(state: &AppState, file: CoverFile) -> Result<(String, String)> {
    if file.data.len() as u64 > state.max_upload_size() {
        return Err(AppError::payload_too_large(format!(
            "File size {} exceeds maximum allowed size {}",
            file.data.len(),
            state.max_upload_size()
        )));
    }

    let content_type = detect_content_type(&file);
    if !state.is_allowed_image_type(&content_type) {
        return Err(AppError::unsupported_media_type(format!(
            "Cover type {} is not allowed",
            content_type
        )));
    }

    let key = cover_key(state.cover_prefix(), &file.filename);
    let size = file.data.len();

    state.blobs.put(&key, &content_type, file.data).await?;

    let url = match state.blobs.signed_read_url(&key).await {
        Ok(url) => url,
        Err(e) => {
            discard_cover(state, &key).await;
            return Err(e);
        }
    };

    info!(key = %key, size, content_type = %content_type, "Stored cover");

    Ok((key, url))
}

/// Best-effort removal of a cover that no post will reference
async fn discard_cover(state: &AppState, key: &str) {
    if let Err(e) = state.blobs.delete(key).await {
        warn!(key = %key, error = %e, "Failed to remove orphaned cover");
    }
}

/// Parse a post id; anything that is not a UUID cannot exist
fn parse_post_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::not_found(format!("Post {} not found", raw)))
}

/// Create a post
///
/// POST /post
async fn create_post(
    State(state): State<AppState>,
    SessionClaims(claims): SessionClaims,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Post>)> {
    let form = read_post_form(multipart).await?;

    let input = PostInput::from_fields(form.title, form.summary, form.content)?;
    let file = form
        .file
        .ok_or_else(|| AppError::validation("A cover file is required"))?;

    let (key, cover) = store_cover(&state, file).await?;
    let post = Post::new(input, cover, claims.id);

    if let Err(e) = state.db.insert_post(&post) {
        discard_cover(&state, &key).await;
        return Err(e);
    }

    info!(post = %post.id, author = %post.author, "Post created");

    Ok((StatusCode::CREATED, Json(post)))
}

/// Edit a post
///
/// PUT /post
async fn update_post(
    State(state): State<AppState>,
    SessionClaims(claims): SessionClaims,
    multipart: Multipart,
) -> Result<Json<Post>> {
    let form = read_post_form(multipart).await?;

    let raw_id = form
        .id
        .as_deref()
        .ok_or_else(|| AppError::validation("id is required"))?;
    let id = parse_post_id(raw_id)?;

    let mut post = state
        .db
        .get_post(id)?
        .ok_or_else(|| AppError::not_found(format!("Post {} not found", id)))?;

    if !post.is_authored_by(&claims.id) {
        warn!(post = %id, user = %claims.id, "Edit attempted by non-author");
        return Err(AppError::not_author("you are not the author"));
    }

    let changes = PostChanges {
        title: form.title,
        summary: form.summary,
        content: form.content,
    };
    changes.validate()?;

    let new_cover = match form.file {
        Some(file) => Some(store_cover(&state, file).await?),
        None => None,
    };

    post.apply(changes, new_cover.as_ref().map(|(_, url)| url.clone()));

    if let Err(e) = state.db.update_post(&post) {
        if let Some((key, _)) = &new_cover {
            discard_cover(&state, key).await;
        }
        return Err(e);
    }

    info!(post = %post.id, "Post updated");

    Ok(Json(post))
}

/// Newest posts with resolved authors
///
/// GET /post
async fn list_posts(State(state): State<AppState>) -> Result<Json<Vec<PostView>>> {
    let posts = state.db.recent_posts(RECENT_POSTS_LIMIT)?;

    let mut authors: HashMap<String, Option<User>> = HashMap::new();
    let mut views = Vec::with_capacity(posts.len());

    for post in posts {
        if !authors.contains_key(&post.author) {
            let user = state.db.get_user(&post.author)?;
            authors.insert(post.author.clone(), user);
        }
        let author = authors.get(&post.author).and_then(Option::as_ref);
        views.push(PostView::new(post, author));
    }

    Ok(Json(views))
}

/// Single post with resolved author
///
/// GET /post/{id}
async fn get_post(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<PostView>> {
    let id = parse_post_id(&raw_id)?;

    let post = state
        .db
        .get_post(id)?
        .ok_or_else(|| AppError::not_found(format!("Post {} not found", id)))?;
    let author = state.db.get_user(&post.author)?;

    Ok(Json(PostView::new(post, author.as_ref())))
}

/// Create post routes
pub fn post_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_posts).post(create_post).put(update_post))
        .route("/{id}", get(get_post))
}
