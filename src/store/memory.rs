//! Single-process shared store.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{SharedStore, WindowCount};

#[derive(Debug)]
struct Entry {
    value: String,
    counter: u64,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-memory store with lazy expiry.
///
/// Only safe for a single instance: replay markers and counters are not
/// visible to other processes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored value for a live key.
    pub async fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .filter(|entry| entry.is_live(Instant::now()))
            .map(|entry| entry.value.clone())
    }

    /// Drop expired entries.
    pub async fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.lock().await.retain(|_, entry| entry.is_live(now));
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        let entries = self.entries.lock().await;
        Ok(entries
            .get(key)
            .is_some_and(|entry| entry.is_live(Instant::now())))
    }

    async fn create_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        if entries.get(key).is_some_and(|entry| entry.is_live(now)) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                counter: 0,
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        self.entries.lock().await.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                counter: 0,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn increment(&self, key: &str, window: Duration) -> Result<WindowCount> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: String::new(),
            counter: 0,
            expires_at: now + window,
        });
        if !entry.is_live(now) {
            entry.counter = 0;
            entry.expires_at = now + window;
        }
        entry.counter += 1;

        Ok(WindowCount {
            count: entry.counter,
            resets_in: entry.expires_at.saturating_duration_since(now),
        })
    }
}
