//! Post entity and its API views.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::User;

/// Number of posts returned by the listing endpoint
pub const RECENT_POSTS_LIMIT: usize = 20;

/// Blog post stored in the document store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// Unique identifier (UUID v4)
    pub id: Uuid,
    pub title: String,
    pub summary: String,
    pub content: String,
    /// Signed read URL of the cover image
    pub cover: String,
    /// Identity provider uid of the author; never changes after creation
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    /// Create a new post authored by `author`
    pub fn new(input: PostInput, cover: String, author: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: input.title,
            summary: input.summary,
            content: input.content,
            cover,
            author,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `user_id` is allowed to edit this post
    pub fn is_authored_by(&self, user_id: &str) -> bool {
        self.author == user_id
    }

    /// Apply an edit; absent fields keep their current value
    pub fn apply(&mut self, changes: PostChanges, cover: Option<String>) {
        if let Some(title) = changes.title {
            self.title = title;
        }
        if let Some(summary) = changes.summary {
            self.summary = summary;
        }
        if let Some(content) = changes.content {
            self.content = content;
        }
        if let Some(cover) = cover {
            self.cover = cover;
        }
        self.updated_at = Utc::now();
    }
}

/// Text fields of a new post
#[derive(Debug, Clone)]
pub struct PostInput {
    pub title: String,
    pub summary: String,
    pub content: String,
}

impl PostInput {
    /// Build from optional form fields, requiring all of them
    pub fn from_fields(
        title: Option<String>,
        summary: Option<String>,
        content: Option<String>,
    ) -> Result<Self> {
        let title = title
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| AppError::validation("title is required"))?;
        let summary = summary.ok_or_else(|| AppError::validation("summary is required"))?;
        let content = content.ok_or_else(|| AppError::validation("content is required"))?;

        Ok(Self {
            title,
            summary,
            content,
        })
    }
}

/// Fields of an edit request
#[derive(Debug, Clone, Default)]
pub struct PostChanges {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
}

impl PostChanges {
    /// Reject edits that would blank out the title
    pub fn validate(&self) -> Result<()> {
        match &self.title {
            Some(title) if title.trim().is_empty() => {
                Err(AppError::validation("title cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

/// Author projection exposed on public reads
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorView {
    pub id: String,
    /// `None` when the author has no local user record
    pub username: Option<String>,
}

/// Post with its author resolved to a display name
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: Uuid,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub cover: String,
    pub author: AuthorView,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PostView {
    /// Combine a post with its (possibly missing) author record
    pub fn new(post: Post, author: Option<&User>) -> Self {
        let author = AuthorView {
            username: author.map(|u| u.username.clone()),
            id: post.author,
        };

        Self {
            id: post.id,
            title: post.title,
            summary: post.summary,
            content: post.content,
            cover: post.cover,
            author,
            created_at: post.created_at,
            updated_at: post.updated_at,
        }
    }
}
