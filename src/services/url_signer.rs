//! HMAC-SHA256 signed read URLs for blob objects.
//!
//! Format: `{base_url}/blobs/{bucket}/{key}?exp={unix}&sig={hex}` where
//! `sig = HMAC-SHA256(signing_key, "{bucket}/{key}:{exp}")`.

use crate::error::{AppError, Result};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Issues and verifies signed read URLs
#[derive(Clone)]
pub struct UrlSigner {
    signing_key: Vec<u8>,
    base_url: String,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner")
            .field("base_url", &self.base_url)
            .field("signing_key", &"<redacted>")
            .finish()
    }
}

impl UrlSigner {
    pub fn new(signing_key: &str, base_url: &str) -> Self {
        Self {
            signing_key: signing_key.as_bytes().to_vec(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Sign `bucket/key` for `ttl_seconds` from now
    pub fn sign(&self, bucket: &str, key: &str, ttl_seconds: u64) -> Result<String> {
        let now = Utc::now().timestamp().max(0) as u64;
        let expires = now.saturating_add(ttl_seconds);
        self.sign_until(bucket, key, expires)
    }

    /// Sign `bucket/key` until an absolute Unix timestamp
    pub fn sign_until(&self, bucket: &str, key: &str, expires: u64) -> Result<String> {
        let signature = hex::encode(self.mac(bucket, key, expires)?.finalize().into_bytes());

        Ok(format!(
            "{}/blobs/{}/{}?exp={}&sig={}",
            self.base_url, bucket, key, expires, signature
        ))
    }

    /// Check expiry and signature of a read request
    pub fn verify(&self, bucket: &str, key: &str, expires: u64, signature: &str) -> Result<()> {
        let now = Utc::now().timestamp().max(0) as u64;
        if now > expires {
            return Err(AppError::forbidden("Signed URL has expired"));
        }

        let provided = hex::decode(signature)
            .map_err(|_| AppError::forbidden("Signed URL signature is malformed"))?;

        // Constant-time comparison
        self.mac(bucket, key, expires)?
            .verify_slice(&provided)
            .map_err(|_| AppError::forbidden("Signed URL signature is invalid"))
    }

    fn mac(&self, bucket: &str, key: &str, expires: u64) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.signing_key)
            .map_err(|e| AppError::internal(format!("HMAC error: {}", e)))?;
        mac.update(format!("{}/{}:{}", bucket, key, expires).as_bytes());
        Ok(mac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> UrlSigner {
        UrlSigner::new("test-signing-key", "http://localhost:4000")
    }

    fn query_param<'a>(url: &'a str, name: &str) -> &'a str {
        let query = url.split_once('?').unwrap().1;
        query
            .split('&')
            .find_map(|pair| pair.strip_prefix(&format!("{}=", name)))
            .unwrap()
    }

    #[test]
    fn test_sign_url_format() {
        let url = signer().sign("blog", "blog_covers/a.png", 3600).unwrap();

        assert!(url.starts_with("http://localhost:4000/blobs/blog/blog_covers/a.png?exp="));
        assert!(url.contains("&sig="));
    }

    #[test]
    fn test_verify_valid_signature() {
        let signer = signer();
        let url = signer.sign("blog", "blog_covers/a.png", 3600).unwrap();
        let exp: u64 = query_param(&url, "exp").parse().unwrap();
        let sig = query_param(&url, "sig");

        assert!(signer.verify("blog", "blog_covers/a.png", exp, sig).is_ok());
    }

    #[test]
    fn test_verify_rejects_other_key() {
        let signer = signer();
        let url = signer.sign("blog", "blog_covers/a.png", 3600).unwrap();
        let exp: u64 = query_param(&url, "exp").parse().unwrap();
        let sig = query_param(&url, "sig");

        let err = signer
            .verify("blog", "blog_covers/b.png", exp, sig)
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert!(signer.verify("blog", "blog_covers/a.png", exp, "zz").is_err());
    }

    #[test]
    fn test_verify_expired_url() {
        let signer = signer();
        let expired = Utc::now().timestamp() as u64 - 10;
        let url = signer.sign_until("blog", "k", expired).unwrap();
        let sig = query_param(&url, "sig");

        let err = signer.verify("blog", "k", expired, sig).unwrap_err();
        assert!(err.to_string().contains("expired"));
    }

    #[test]
    fn test_different_keys_produce_different_signatures() {
        let a = UrlSigner::new("key1", "http://x").sign_until("b", "k", 100).unwrap();
        let b = UrlSigner::new("key2", "http://x").sign_until("b", "k", 100).unwrap();
        assert_ne!(a, b);
    }
}
