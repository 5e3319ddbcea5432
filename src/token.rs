//! Bearer token issuance and validation.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::directory::Principal;

/// Default access token horizon: 1 hour.
pub const ACCESS_TOKEN_TTL_SECS: u64 = 60 * 60;

/// Default refresh token horizon: 2 weeks.
pub const REFRESH_TOKEN_TTL_SECS: u64 = 14 * 24 * 60 * 60;

/// Claims embedded in an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (username)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// A freshly issued access token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The signed token string
    pub token: String,
    /// Issued at timestamp (Unix seconds)
    pub issued_at: u64,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
}

/// Signs and verifies access tokens against a shared secret.
///
/// Stateless: tokens are never stored server-side. The expiry horizon is
/// fixed at construction time.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_secs: u64,
}

impl TokenCodec {
    /// Create a codec with the given secret and the default 1 hour horizon.
    pub fn new(secret: &[u8]) -> Self {
        Self::with_ttl(secret, ACCESS_TOKEN_TTL_SECS)
    }

    /// Create a codec with an explicit expiry horizon in seconds.
    pub fn with_ttl(secret: &[u8], ttl_secs: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl_secs,
        }
    }

    /// Issue a signed token for a subject, expiring one horizon from now.
    pub fn issue(&self, subject: &str) -> Result<IssuedToken, TokenError> {
        let now = unix_now()?;
        let exp = now + self.ttl_secs;

        let claims = Claims {
            sub: subject.to_string(),
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(TokenError::Encoding)?;

        Ok(IssuedToken {
            token,
            issued_at: now,
            expires_at: exp,
        })
    }

    /// Verify a token and return its subject.
    ///
    /// Signature integrity is checked first; a bad signature or a payload
    /// that does not decode as [`Claims`] is `Invalid`. Expiry is checked
    /// here rather than by the library validator so the `Expired` error can
    /// carry the claims for diagnostics.
    pub fn decode(&self, token: &str) -> Result<String, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = false;

        let token_data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(TokenError::Invalid)?;

        let claims = token_data.claims;
        let now = unix_now()?;
        if now > claims.exp {
            return Err(TokenError::Expired {
                subject: claims.sub,
                expires_at: claims.exp,
            });
        }

        Ok(claims.sub)
    }

    /// Check that a token is valid *for this specific principal*.
    ///
    /// A well-formed, unexpired token for user A must not authenticate a
    /// lookup that resolved user B, so the decoded subject has to match the
    /// principal's username exactly.
    pub fn validate(&self, token: &str, principal: &Principal) -> bool {
        match self.decode(token) {
            Ok(subject) => subject == principal.username,
            Err(_) => false,
        }
    }
}

/// Errors that can occur during token operations.
#[derive(Debug)]
pub enum TokenError {
    /// Error signing a new token
    Encoding(jsonwebtoken::errors::Error),
    /// Signature mismatch or malformed envelope
    Invalid(jsonwebtoken::errors::Error),
    /// Signature valid but the clock is past the embedded expiry
    Expired { subject: String, expires_at: u64 },
    /// System clock is before the Unix epoch
    Time,
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Encoding(e) => write!(f, "Failed to sign token: {}", e),
            TokenError::Invalid(e) => write!(f, "Invalid token: {}", e),
            TokenError::Expired {
                subject,
                expires_at,
            } => write!(f, "Token for {} expired at {}", subject, expires_at),
            TokenError::Time => write!(f, "System time error"),
        }
    }
}

impl std::error::Error for TokenError {}

fn unix_now() -> Result<u64, TokenError> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| TokenError::Time)?
        .as_secs())
}
