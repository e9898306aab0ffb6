//! Shared key-value state used across service instances.
//!
//! Refresh-token replay markers, revoked-family markers and rate-limit
//! counters all live here. Every entry carries a TTL; an expired entry behaves
//! exactly like a missing one.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgSharedStore;

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Counter value after an increment and the time until its window closes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowCount {
    pub count: u64,
    pub resets_in: Duration,
}

#[async_trait]
pub trait SharedStore: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Atomically create `key` unless a live entry already holds it.
    ///
    /// Returns `true` only for the single caller that created the entry.
    async fn create_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Create or overwrite `key`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Increment the fixed-window counter at `key`, opening a new window of
    /// length `window` when none is live.
    async fn increment(&self, key: &str, window: Duration) -> Result<WindowCount>;
}
