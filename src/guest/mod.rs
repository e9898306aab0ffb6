//! Pseudo-identity for callers without credentials.
//!
//! Flow Overview:
//! 1) Hash `salt|ip` with SHA-256; the raw address is never stored.
//! 2) Look the hash up, inserting a new guest when absent.
//! 3) A concurrent insert loses on the unique hash and re-reads the winner.
//! 4) Bump `last_seen_at` on every resolution.

mod storage;

pub use storage::PgGuestStore;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::error::AuthError;

pub const GUEST_STATUS_ACTIVE: &str = "ACTIVE";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuestIdentity {
    pub id: Uuid,
    pub ip_hash: String,
    pub status: String,
    pub last_seen_at: DateTime<Utc>,
}

#[derive(Debug)]
pub enum GuestInsertOutcome {
    Created(GuestIdentity),
    /// Another request inserted the same hash first.
    Conflict,
}

#[async_trait]
pub trait GuestStore: Send + Sync {
    async fn find_by_ip_hash(&self, ip_hash: &str) -> Result<Option<GuestIdentity>>;
    async fn insert(&self, ip_hash: &str) -> Result<GuestInsertOutcome>;
    async fn touch_last_seen(&self, guest_id: Uuid) -> Result<DateTime<Utc>>;
}

/// Hex SHA-256 of `salt|ip`.
#[must_use]
pub fn hash_ip(salt: &str, ip: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b"|");
    hasher.update(ip.as_bytes());
    hex::encode(hasher.finalize())
}

pub struct GuestResolver {
    store: Arc<dyn GuestStore>,
    salt: SecretString,
}

impl GuestResolver {
    #[must_use]
    pub fn new(store: Arc<dyn GuestStore>, salt: SecretString) -> Self {
        Self { store, salt }
    }

    /// Resolve the guest for `ip`, creating it on first sight.
    ///
    /// # Errors
    /// Returns `Storage` if the guest store fails.
    pub async fn resolve_or_create(&self, ip: IpAddr) -> Result<GuestIdentity, AuthError> {
        let ip_hash = hash_ip(self.salt.expose_secret(), &ip.to_string());
        self.find_or_insert(&ip_hash)
            .await
            .map_err(AuthError::Storage)
    }

    async fn find_or_insert(&self, ip_hash: &str) -> Result<GuestIdentity> {
        let mut guest = match self.store.find_by_ip_hash(ip_hash).await? {
            Some(guest) => guest,
            None => match self.store.insert(ip_hash).await? {
                GuestInsertOutcome::Created(guest) => {
                    debug!(guest_id = %guest.id, "Created guest identity");
                    guest
                }
                GuestInsertOutcome::Conflict => self
                    .store
                    .find_by_ip_hash(ip_hash)
                    .await?
                    .ok_or_else(|| anyhow!("guest vanished after insert conflict"))?,
            },
        };

        guest.last_seen_at = self.store.touch_last_seen(guest.id).await?;
        Ok(guest)
    }
}
