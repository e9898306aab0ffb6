//! Access and refresh credential codec.
//!
//! Both credential kinds are HS256 JWTs signed with one symmetric key that is
//! loaded at startup. A `typ` claim separates them so an access token can never
//! pass a refresh check and vice versa. Refresh tokens additionally carry a
//! family id (`fid`) shared by every token descended from one login and a
//! unique token id (`jti`).
//!
//! Expiry is compared against the injected [`Clock`]; the only tolerance is
//! the explicit `leeway_seconds` setting, which defaults to zero.

mod jwt;

pub use jwt::{sign_hs256, verify_hs256, TokenError, ALGORITHM};

use base64ct::{Base64, Base64Unpadded, Encoding};
use secrecy::{ExposeSecret, SecretSlice, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::clock::Clock;
use crate::error::AuthError;

/// Minimum HMAC-SHA256 key size in bytes.
pub const MIN_KEY_BYTES: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TokenType {
    Access,
    Refresh,
}

/// `aud` may arrive as a single string or an array.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    #[must_use]
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Self::One(value) => value == audience,
            Self::Many(values) => values.iter().any(|value| value == audience),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub role: String,
    pub iss: String,
    pub aud: Audience,
    pub iat: i64,
    pub exp: i64,
    pub typ: TokenType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

/// A minted credential and the claims it carries.
#[derive(Clone, Debug)]
pub struct SignedToken {
    pub value: String,
    pub claims: Claims,
}

impl SignedToken {
    /// Lifetime in seconds as minted.
    #[must_use]
    pub fn expires_in(&self) -> u64 {
        u64::try_from(self.claims.exp - self.claims.iat).unwrap_or(0)
    }
}

/// Access and refresh credentials minted together.
#[derive(Clone, Debug)]
pub struct TokenPair {
    pub access: SignedToken,
    pub refresh: SignedToken,
}

impl TokenPair {
    /// Access credential lifetime in seconds.
    #[must_use]
    pub fn expires_in(&self) -> u64 {
        self.access.expires_in()
    }
}

#[derive(Clone, Debug)]
pub struct TokenSettings {
    pub issuer: String,
    pub audience: String,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    pub leeway_seconds: i64,
}

pub struct TokenCodec {
    key: SecretSlice<u8>,
    settings: TokenSettings,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("key", &"***")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn decode_key(secret: &str) -> Option<Vec<u8>> {
    let trimmed = secret.trim();
    Base64::decode_vec(trimmed)
        .or_else(|_| Base64Unpadded::decode_vec(trimmed))
        .ok()
}

impl TokenCodec {
    /// Build a codec from base64-encoded key material.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the key is not valid base64, is shorter
    /// than [`MIN_KEY_BYTES`], or the settings are unusable.
    pub fn new(
        secret_b64: &SecretString,
        settings: TokenSettings,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AuthError> {
        let key = decode_key(secret_b64.expose_secret()).ok_or_else(|| {
            AuthError::InvalidConfiguration("jwt secret must be valid base64".to_string())
        })?;
        if key.len() < MIN_KEY_BYTES {
            return Err(AuthError::InvalidConfiguration(format!(
                "jwt secret must decode to at least {MIN_KEY_BYTES} bytes, got {}",
                key.len()
            )));
        }
        if settings.issuer.trim().is_empty() || settings.audience.trim().is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "jwt issuer and audience must not be empty".to_string(),
            ));
        }
        if settings.access_ttl_seconds <= 0 || settings.refresh_ttl_seconds <= 0 {
            return Err(AuthError::InvalidConfiguration(
                "token lifetimes must be positive".to_string(),
            ));
        }
        if settings.leeway_seconds < 0 {
            return Err(AuthError::InvalidConfiguration(
                "token leeway must not be negative".to_string(),
            ));
        }

        Ok(Self {
            key: SecretSlice::from(key),
            settings,
            clock,
        })
    }

    #[must_use]
    pub fn settings(&self) -> &TokenSettings {
        &self.settings
    }

    #[must_use]
    pub fn now_unix(&self) -> i64 {
        self.clock.now_unix()
    }

    #[must_use]
    pub fn access_ttl_seconds(&self) -> u64 {
        u64::try_from(self.settings.access_ttl_seconds).unwrap_or(0)
    }

    #[must_use]
    pub fn refresh_ttl_seconds(&self) -> u64 {
        u64::try_from(self.settings.refresh_ttl_seconds).unwrap_or(0)
    }

    /// Mint an access credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the claims cannot be encoded.
    pub fn issue_access(&self, subject: &str, role: &str) -> Result<SignedToken, TokenError> {
        self.issue(
            subject,
            role,
            TokenType::Access,
            self.settings.access_ttl_seconds,
            None,
            None,
        )
    }

    /// Mint a refresh credential in `family_id` with the unique `token_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the claims cannot be encoded.
    pub fn issue_refresh(
        &self,
        subject: &str,
        role: &str,
        family_id: &str,
        token_id: &str,
    ) -> Result<SignedToken, TokenError> {
        self.issue(
            subject,
            role,
            TokenType::Refresh,
            self.settings.refresh_ttl_seconds,
            Some(family_id.to_string()),
            Some(token_id.to_string()),
        )
    }

    fn issue(
        &self,
        subject: &str,
        role: &str,
        typ: TokenType,
        ttl_seconds: i64,
        fid: Option<String>,
        jti: Option<String>,
    ) -> Result<SignedToken, TokenError> {
        let now = self.clock.now_unix();
        let claims = Claims {
            sub: subject.to_string(),
            role: role.to_string(),
            iss: self.settings.issuer.clone(),
            aud: Audience::One(self.settings.audience.clone()),
            iat: now,
            exp: now + ttl_seconds,
            typ,
            fid,
            jti,
        };
        let value = sign_hs256(self.key.expose_secret(), &claims)?;
        Ok(SignedToken { value, claims })
    }

    /// Verify signature and claims, requiring the `expected` token type.
    ///
    /// # Errors
    ///
    /// Fails on a bad signature, issuer or audience mismatch, expiry, an
    /// issued-at in the future, or a type other than `expected`.
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims, TokenError> {
        let claims: Claims = verify_hs256(token, self.key.expose_secret())?;
        let now = self.clock.now_unix();
        let leeway = self.settings.leeway_seconds;

        if claims.iss != self.settings.issuer {
            warn!("Invalid JWT issuer");
            return Err(TokenError::InvalidIssuer);
        }
        if !claims.aud.contains(&self.settings.audience) {
            warn!("Invalid JWT audience");
            return Err(TokenError::InvalidAudience);
        }
        if claims.exp + leeway <= now {
            warn!("Expired JWT token");
            return Err(TokenError::Expired);
        }
        if claims.iat > now + leeway {
            warn!("JWT issued in the future");
            return Err(TokenError::InvalidIat);
        }
        if claims.typ != expected {
            warn!("Invalid JWT type");
            return Err(TokenError::WrongType);
        }

        Ok(claims)
    }
}
