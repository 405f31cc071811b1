//! Service layer for the blog server.
//!
//! This module contains the collaborators handlers talk to:
//! - Document store (users and posts)
//! - Blob storage and signed read URLs
//! - Identity provider client
//! - Session token signing

pub mod blob_store;
pub mod database;
pub mod identity;
pub mod token;
pub mod url_signer;

pub use blob_store::{cover_key, BlobMetadata, BlobReader, BlobStore, LocalBlobStore};
pub use database::{DatabaseService, DocumentStore};
pub use identity::{HttpIdentityProvider, IdentityError, IdentityProvider, ProviderAccount};
pub use token::TokenService;
pub use url_signer::UrlSigner;
