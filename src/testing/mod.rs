//! In-memory stores for unit and router tests, and a container-backed
//! Postgres for storage tests.

pub mod postgres;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::guest::{GuestIdentity, GuestInsertOutcome, GuestStore, GUEST_STATUS_ACTIVE};
use crate::identity::{IdentityStore, IdentityTx, LocalUser, UserInsertOutcome, DEFAULT_ROLE};

#[derive(Debug, Default)]
pub struct MemoryGuestStore {
    guests: Mutex<HashMap<String, GuestIdentity>>,
}

impl MemoryGuestStore {
    pub async fn len(&self) -> usize {
        self.guests.lock().await.len()
    }
}

#[async_trait]
impl GuestStore for MemoryGuestStore {
    async fn find_by_ip_hash(&self, ip_hash: &str) -> Result<Option<GuestIdentity>> {
        Ok(self.guests.lock().await.get(ip_hash).cloned())
    }

    async fn insert(&self, ip_hash: &str) -> Result<GuestInsertOutcome> {
        let mut guests = self.guests.lock().await;
        if guests.contains_key(ip_hash) {
            return Ok(GuestInsertOutcome::Conflict);
        }
        let guest = GuestIdentity {
            id: Uuid::new_v4(),
            ip_hash: ip_hash.to_string(),
            status: GUEST_STATUS_ACTIVE.to_string(),
            last_seen_at: Utc::now(),
        };
        guests.insert(ip_hash.to_string(), guest.clone());
        Ok(GuestInsertOutcome::Created(guest))
    }

    async fn touch_last_seen(&self, guest_id: Uuid) -> Result<DateTime<Utc>> {
        let now = Utc::now();
        let mut guests = self.guests.lock().await;
        let guest = guests
            .values_mut()
            .find(|guest| guest.id == guest_id)
            .ok_or_else(|| anyhow!("guest {guest_id} not found"))?;
        guest.last_seen_at = now;
        Ok(now)
    }
}

#[derive(Clone, Debug, Default)]
struct IdentityState {
    users: Vec<LocalUser>,
    links: Vec<(Uuid, String, String)>,
    last_login: HashMap<Uuid, DateTime<Utc>>,
}

impl IdentityState {
    fn user(&self, user_id: Uuid) -> Option<&LocalUser> {
        self.users.iter().find(|user| user.id == user_id)
    }

    fn user_by_email(&self, email: &str) -> Option<&LocalUser> {
        self.users.iter().find(|user| user.email == email)
    }

    fn link_owner(&self, provider: &str, provider_user_id: &str) -> Option<Uuid> {
        self.links
            .iter()
            .find(|(_, p, s)| p == provider && s == provider_user_id)
            .map(|(owner, _, _)| *owner)
    }
}

/// Another login that commits while a transaction is in flight.
#[derive(Clone, Debug)]
struct RivalLogin {
    email: String,
    link: Option<(String, String)>,
}

/// Transactions buffer their writes and see rows committed by others, like a
/// read-committed database.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    state: Arc<Mutex<IdentityState>>,
    rival: Arc<Mutex<Option<RivalLogin>>>,
    fail_links: Arc<AtomicBool>,
}

impl MemoryIdentityStore {
    pub fn fail_links(&self, fail: bool) {
        self.fail_links.store(fail, Ordering::SeqCst);
    }

    /// Commit a user (and optionally a provider link) just before the next
    /// `insert_user` runs.
    pub async fn commit_before_next_insert(&self, email: &str, link: Option<(&str, &str)>) {
        *self.rival.lock().await = Some(RivalLogin {
            email: email.to_string(),
            link: link.map(|(provider, subject)| (provider.to_string(), subject.to_string())),
        });
    }

    pub async fn seed_user(&self, email: &str, nickname: &str) -> LocalUser {
        let user = LocalUser {
            id: Uuid::new_v4(),
            email: email.to_string(),
            nickname: nickname.to_string(),
            role: DEFAULT_ROLE.to_string(),
        };
        self.state.lock().await.users.push(user.clone());
        user
    }

    pub async fn user_count(&self) -> usize {
        self.state.lock().await.users.len()
    }

    pub async fn links_for(&self, user_id: Uuid) -> Vec<(String, String)> {
        self.state
            .lock()
            .await
            .links
            .iter()
            .filter(|(owner, _, _)| *owner == user_id)
            .map(|(_, provider, subject)| (provider.clone(), subject.clone()))
            .collect()
    }

    pub async fn last_login(&self, user_id: Uuid) -> Option<DateTime<Utc>> {
        self.state.lock().await.last_login.get(&user_id).copied()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn begin(&self) -> Result<Box<dyn IdentityTx>> {
        Ok(Box::new(MemoryIdentityTx {
            shared: self.state.clone(),
            rival: self.rival.clone(),
            pending: IdentityState::default(),
            fail_links: self.fail_links.load(Ordering::SeqCst),
        }))
    }
}

struct MemoryIdentityTx {
    shared: Arc<Mutex<IdentityState>>,
    rival: Arc<Mutex<Option<RivalLogin>>>,
    pending: IdentityState,
    fail_links: bool,
}

impl MemoryIdentityTx {
    async fn commit_rival(&self) {
        let Some(rival) = self.rival.lock().await.take() else {
            return;
        };
        let user = LocalUser {
            id: Uuid::new_v4(),
            email: rival.email,
            nickname: "rival".to_string(),
            role: DEFAULT_ROLE.to_string(),
        };
        let mut shared = self.shared.lock().await;
        if let Some((provider, subject)) = rival.link {
            shared.links.push((user.id, provider, subject));
        }
        shared.users.push(user);
    }
}

#[async_trait]
impl IdentityTx for MemoryIdentityTx {
    async fn find_by_provider(
        &mut self,
        provider: &str,
        provider_user_id: &str,
    ) -> Result<Option<LocalUser>> {
        let shared = self.shared.lock().await;
        let owner = self
            .pending
            .link_owner(provider, provider_user_id)
            .or_else(|| shared.link_owner(provider, provider_user_id));
        Ok(owner.and_then(|id| self.pending.user(id).or_else(|| shared.user(id)).cloned()))
    }

    async fn find_by_email(&mut self, email: &str) -> Result<Option<LocalUser>> {
        let shared = self.shared.lock().await;
        Ok(self
            .pending
            .user_by_email(email)
            .or_else(|| shared.user_by_email(email))
            .cloned())
    }

    async fn insert_user(&mut self, email: &str, nickname: &str) -> Result<UserInsertOutcome> {
        self.commit_rival().await;
        let taken = self.pending.user_by_email(email).is_some()
            || self.shared.lock().await.user_by_email(email).is_some();
        if taken {
            return Ok(UserInsertOutcome::Conflict);
        }
        let user = LocalUser {
            id: Uuid::new_v4(),
            email: email.to_string(),
            nickname: nickname.to_string(),
            role: DEFAULT_ROLE.to_string(),
        };
        self.pending.users.push(user.clone());
        Ok(UserInsertOutcome::Created(user))
    }

    async fn link_provider(
        &mut self,
        user_id: Uuid,
        provider: &str,
        provider_user_id: &str,
        _email: &str,
    ) -> Result<bool> {
        if self.fail_links {
            return Err(anyhow!("link insert failed"));
        }
        let linked = self.pending.link_owner(provider, provider_user_id).is_some()
            || self
                .shared
                .lock()
                .await
                .link_owner(provider, provider_user_id)
                .is_some();
        if linked {
            return Ok(false);
        }
        self.pending
            .links
            .push((user_id, provider.to_string(), provider_user_id.to_string()));
        Ok(true)
    }

    async fn touch_last_login(&mut self, user_id: Uuid) -> Result<()> {
        self.pending.last_login.insert(user_id, Utc::now());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let Self {
            shared, pending, ..
        } = *self;
        let mut shared = shared.lock().await;
        shared.users.extend(pending.users);
        shared.links.extend(pending.links);
        shared.last_login.extend(pending.last_login);
        Ok(())
    }
}
