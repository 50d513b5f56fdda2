//! Session tokens
//!
//! Self-contained HS256 tokens binding a user email to an expiry.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AppError;

/// Default token lifetime.
pub const DEFAULT_SESSION_TTL_MINUTES: i64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session: token invalid")]
    TokenInvalid,

    #[error("session: token expired")]
    TokenExpired,

    /// The signing key is unusable. Not retryable.
    #[error("session: signing failed: {0}")]
    Signing(String),
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::TokenInvalid | SessionError::TokenExpired => {
                AppError::Unauthenticated(err.to_string())
            }
            SessionError::Signing(msg) => AppError::Internal(msg),
        }
    }
}

/// JWT claims for a user session
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user email)
    pub sub: String,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Token ID, keeps two tokens issued in the same second distinct
    pub jti: String,
}

/// Issues and verifies session tokens.
pub struct SessionIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl SessionIssuer {
    pub fn new(secret: &[u8], ttl: Duration) -> Result<Self, AppError> {
        if secret.is_empty() {
            return Err(AppError::Config("session key must not be empty".to_string()));
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for `subject` expiring after the configured TTL.
    pub fn issue(&self, subject: &str) -> Result<String, SessionError> {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| SessionError::Signing("session TTL out of range".to_string()))?;
        let claims = Claims {
            sub: subject.to_string(),
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| SessionError::Signing(e.to_string()))
    }

    /// Verify a token and return its subject.
    pub fn verify(&self, token: &str) -> Result<String, SessionError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                JwtErrorKind::ExpiredSignature => SessionError::TokenExpired,
                _ => SessionError::TokenInvalid,
            }
        })?;

        Ok(data.claims.sub)
    }
}
