//! Refresh-token rotation with reuse detection.
//!
//! Flow Overview:
//! 1) Verify the presented refresh token (type REFRESH).
//! 2) Refuse immediately if its family carries a revoked marker; nothing is written.
//! 3) Claim the token id with an atomic create-if-absent (the used marker).
//! 4) Losing the claim means the token was presented before: revoke the family.
//! 5) Winning mints a new pair in the same family with a fresh token id.
//!
//! Shared state:
//! - `auth:refresh:used:{jti}` lives for the presented token's remaining lifetime.
//! - `auth:refresh:family:revoked:{fid}` lives for the full refresh lifetime.

use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::clock::IdGenerator;
use crate::error::{AuthError, UnauthenticatedReason};
use crate::store::SharedStore;
use crate::token::{Claims, TokenCodec, TokenPair, TokenType};

const USED_KEY_PREFIX: &str = "auth:refresh:used:";
const REVOKED_FAMILY_KEY_PREFIX: &str = "auth:refresh:family:revoked:";
const LEGACY_PREFIX: &str = "legacy:";

#[must_use]
pub fn used_marker_key(token_id: &str) -> String {
    format!("{USED_KEY_PREFIX}{token_id}")
}

#[must_use]
pub fn revoked_family_key(family_id: &str) -> String {
    format!("{REVOKED_FAMILY_KEY_PREFIX}{family_id}")
}

/// Family id, falling back to a per-subject id for tokens minted without one.
fn family_id(claims: &Claims) -> String {
    match claims.fid.as_deref() {
        Some(fid) if !fid.trim().is_empty() => fid.to_string(),
        _ => format!("{LEGACY_PREFIX}{}", claims.sub),
    }
}

/// Token id, falling back to a digest of the raw token.
fn token_id(claims: &Claims, raw_token: &str) -> String {
    match claims.jti.as_deref() {
        Some(jti) if !jti.trim().is_empty() => jti.to_string(),
        _ => format!("{LEGACY_PREFIX}{}", hex::encode(Sha256::digest(raw_token))),
    }
}

pub struct RefreshRotation {
    codec: Arc<TokenCodec>,
    store: Arc<dyn SharedStore>,
    ids: Arc<dyn IdGenerator>,
}

impl RefreshRotation {
    #[must_use]
    pub fn new(
        codec: Arc<TokenCodec>,
        store: Arc<dyn SharedStore>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self { codec, store, ids }
    }

    #[must_use]
    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Mint the first pair of a login session in a brand new family.
    ///
    /// # Errors
    /// Returns an error if the tokens cannot be signed.
    pub fn start_family(&self, subject: &str, role: &str) -> Result<TokenPair, AuthError> {
        let family = self.ids.new_id();
        self.mint(subject, role, &family)
    }

    fn mint(&self, subject: &str, role: &str, family: &str) -> Result<TokenPair, AuthError> {
        let access = self.codec.issue_access(subject, role)?;
        let refresh = self
            .codec
            .issue_refresh(subject, role, family, &self.ids.new_id())?;
        Ok(TokenPair { access, refresh })
    }

    /// Consume `refresh_token` exactly once and return its successor pair.
    ///
    /// # Errors
    /// Returns `Unauthenticated` for an invalid token, a revoked family, or a
    /// replayed token (which also revokes the family), and `Storage` when the
    /// shared store is unavailable.
    pub async fn rotate(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        if refresh_token.trim().is_empty() {
            return Err(AuthError::unauthenticated(
                UnauthenticatedReason::MissingCredential,
            ));
        }

        let claims = self
            .codec
            .verify(refresh_token, TokenType::Refresh)
            .map_err(|err| {
                warn!("Refresh token rejected: {err}");
                AuthError::unauthenticated(UnauthenticatedReason::InvalidToken)
            })?;

        let family = family_id(&claims);
        let token = token_id(&claims, refresh_token);

        let revoked = self
            .store
            .exists(&revoked_family_key(&family))
            .await
            .map_err(AuthError::Storage)?;
        if revoked {
            warn!(family = %family, "Refresh attempted on revoked family");
            return Err(AuthError::unauthenticated(
                UnauthenticatedReason::FamilyRevoked,
            ));
        }

        let remaining = (claims.exp - self.codec.now_unix()).max(1);
        let used_ttl = Duration::from_secs(u64::try_from(remaining).unwrap_or(1));
        let first_use = self
            .store
            .create_if_absent(&used_marker_key(&token), "1", used_ttl)
            .await
            .map_err(AuthError::Storage)?;

        if !first_use {
            let family_ttl = Duration::from_secs(self.codec.refresh_ttl_seconds());
            if let Err(err) = self
                .store
                .set(&revoked_family_key(&family), "1", family_ttl)
                .await
            {
                error!(family = %family, "Failed to revoke refresh family: {err}");
                return Err(AuthError::Storage(err));
            }
            warn!(family = %family, subject = %claims.sub, "Refresh token reuse detected; family revoked");
            return Err(AuthError::unauthenticated(
                UnauthenticatedReason::ReuseDetected,
            ));
        }

        let pair = self.mint(&claims.sub, &claims.role, &family)?;
        info!(subject = %claims.sub, "Refresh token rotated");
        Ok(pair)
    }
}
