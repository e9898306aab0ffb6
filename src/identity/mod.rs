//! Local identities and their links to external providers.
//!
//! Flow Overview (one transaction per login):
//! 1) Reuse the user already linked to `(provider, subject)`.
//! 2) Otherwise link the provider identity to the user with the same email.
//! 3) Otherwise create a user, then link it.
//! 4) Stamp `last_login_at` and commit.
//!
//! Concurrent first logins for the same person race on the unique email and
//! `(provider, subject)` constraints. The loser re-reads the winner's rows
//! instead of failing.

mod storage;

pub use storage::PgIdentityStore;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

pub const NICKNAME_MAX_CHARS: usize = 100;
pub const DEFAULT_ROLE: &str = "USER";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalUser {
    pub id: Uuid,
    pub email: String,
    pub nickname: String,
    pub role: String,
}

/// Identity asserted by an external provider after code exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderProfile {
    pub provider: &'static str,
    pub subject: String,
    pub email: String,
    pub name: Option<String>,
}

#[derive(Debug)]
pub enum UserInsertOutcome {
    Created(LocalUser),
    /// A committed user already holds the email.
    Conflict,
}

/// One unit of work; dropping it without `commit` discards every write.
#[async_trait]
pub trait IdentityTx: Send {
    async fn find_by_provider(
        &mut self,
        provider: &str,
        provider_user_id: &str,
    ) -> Result<Option<LocalUser>>;
    async fn find_by_email(&mut self, email: &str) -> Result<Option<LocalUser>>;
    async fn insert_user(&mut self, email: &str, nickname: &str) -> Result<UserInsertOutcome>;
    /// Returns `false` when `(provider, provider_user_id)` is already linked.
    async fn link_provider(
        &mut self,
        user_id: Uuid,
        provider: &str,
        provider_user_id: &str,
        email: &str,
    ) -> Result<bool>;
    async fn touch_last_login(&mut self, user_id: Uuid) -> Result<()>;
    async fn commit(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn IdentityTx>>;
}

/// Normalize an email for lookup/uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

/// Display name when present, else the local part of the email.
#[must_use]
pub fn derive_nickname(name: Option<&str>, email: &str) -> String {
    if let Some(name) = name.map(str::trim).filter(|name| !name.is_empty()) {
        return truncate_chars(name, NICKNAME_MAX_CHARS);
    }
    let local_part = match email.find('@') {
        Some(at) if at > 0 => &email[..at],
        _ => email,
    };
    truncate_chars(local_part, NICKNAME_MAX_CHARS)
}

/// Map a provider profile to a local user, creating or linking as needed.
///
/// # Errors
/// Returns an error if any store operation fails; nothing is committed then.
pub async fn resolve_local_user(
    store: &dyn IdentityStore,
    profile: &ProviderProfile,
) -> Result<LocalUser> {
    let mut tx = store.begin().await?;
    let email = normalize_email(&profile.email);

    let user = match tx
        .find_by_provider(profile.provider, &profile.subject)
        .await?
    {
        Some(user) => user,
        None => {
            let user = match tx.find_by_email(&email).await? {
                Some(user) => user,
                None => {
                    let nickname = derive_nickname(profile.name.as_deref(), &email);
                    match tx.insert_user(&email, &nickname).await? {
                        UserInsertOutcome::Created(user) => {
                            info!(user_id = %user.id, provider = profile.provider, "Created user from provider login");
                            user
                        }
                        UserInsertOutcome::Conflict => {
                            debug!(provider = profile.provider, "User created concurrently; reusing it");
                            tx.find_by_email(&email)
                                .await?
                                .ok_or_else(|| anyhow!("user vanished after insert conflict"))?
                        }
                    }
                }
            };
            if tx
                .link_provider(user.id, profile.provider, &profile.subject, &email)
                .await?
            {
                info!(user_id = %user.id, provider = profile.provider, "Linked provider identity");
                user
            } else {
                debug!(provider = profile.provider, "Provider identity linked concurrently");
                tx.find_by_provider(profile.provider, &profile.subject)
                    .await?
                    .ok_or_else(|| anyhow!("provider link vanished after insert conflict"))?
            }
        }
    };

    tx.touch_last_login(user.id).await?;
    tx.commit().await?;
    Ok(user)
}
