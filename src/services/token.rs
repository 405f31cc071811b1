//! Session token issuance and verification.
//!
//! Tokens are HS256 JWTs signed with the configured shared secret. Every
//! verification failure (bad signature, malformed token, expiry) surfaces
//! as `AppError::Unauthorized`. A token needs only an `id` claim; `exp` is
//! checked when present and required only with `auth.require_exp`.

use crate::config::AuthConfig;
use crate::error::{AppError, Result};
use crate::models::{Claims, User};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

/// JWT algorithm used for session tokens
const ALGORITHM: Algorithm = Algorithm::HS256;

/// Signs and verifies session tokens
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl_seconds: i64,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("algorithm", &ALGORITHM)
            .field("ttl_seconds", &self.ttl_seconds)
            .finish()
    }
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        if config.require_exp {
            validation.set_required_spec_claims(&["exp"]);
        } else {
            validation.set_required_spec_claims::<&str>(&[]);
        }

        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            ttl_seconds: i64::try_from(config.token_ttl_seconds).unwrap_or(i64::MAX),
        }
    }

    /// Claims for a fresh token belonging to `user`
    pub fn claims_for(&self, user: &User) -> Claims {
        let now = Utc::now().timestamp();
        Claims {
            username: Some(user.username.clone()),
            iat: Some(now),
            exp: Some(now.saturating_add(self.ttl_seconds)),
            ..Claims::for_id(user.id.clone())
        }
    }

    /// Sign arbitrary claims
    pub fn encode(&self, claims: &Claims) -> Result<String> {
        encode(&Header::new(ALGORITHM), claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("Failed to sign session token: {}", e)))
    }

    /// Issue a token for `user`
    pub fn issue(&self, user: &User) -> Result<(String, Claims)> {
        let claims = self.claims_for(user);
        let token = self.encode(&claims)?;
        Ok((token, claims))
    }

    /// Verify a token and return its claims
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)?.claims;

        if claims.id.trim().is_empty() {
            return Err(AppError::unauthorized("Session token has no id"));
        }

        Ok(claims)
    }

    /// Configured token lifetime
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }
}
