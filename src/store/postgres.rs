//! Postgres-backed shared store.
//!
//! Scaling: row locking on `kv_entries` is the synchronization point, so every
//! instance pointed at the same database observes the same markers and counters.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::Instrument;

use super::{SharedStore, WindowCount};

#[derive(Clone, Debug)]
pub struct PgSharedStore {
    pool: PgPool,
}

impl PgSharedStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Delete expired rows. Returns the number of rows removed.
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    pub async fn purge_expired(&self) -> Result<u64> {
        let query = "DELETE FROM kv_entries WHERE expires_at <= NOW()";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to purge expired kv entries")?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SharedStore for PgSharedStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        let query = "SELECT 1 FROM kv_entries WHERE key = $1 AND expires_at > NOW()";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(key)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to look up kv entry")?;
        Ok(row.is_some())
    }

    async fn create_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        // An expired row is taken over; a live one makes the upsert a no-op
        // and RETURNING yields nothing.
        let query = r"
            INSERT INTO kv_entries (key, value, counter, expires_at)
            VALUES ($1, $2, 0, NOW() + make_interval(secs => $3::double precision))
            ON CONFLICT (key) DO UPDATE
                SET value = EXCLUDED.value,
                    counter = 0,
                    expires_at = EXCLUDED.expires_at
                WHERE kv_entries.expires_at <= NOW()
            RETURNING key
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(key)
            .bind(value)
            .bind(ttl.as_secs_f64())
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to create kv entry")?;
        Ok(row.is_some())
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let query = r"
            INSERT INTO kv_entries (key, value, counter, expires_at)
            VALUES ($1, $2, 0, NOW() + make_interval(secs => $3::double precision))
            ON CONFLICT (key) DO UPDATE
                SET value = EXCLUDED.value,
                    counter = 0,
                    expires_at = EXCLUDED.expires_at
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(key)
            .bind(value)
            .bind(ttl.as_secs_f64())
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to set kv entry")?;
        Ok(())
    }

    async fn increment(&self, key: &str, window: Duration) -> Result<WindowCount> {
        let query = r"
            INSERT INTO kv_entries (key, value, counter, expires_at)
            VALUES ($1, '', 1, NOW() + make_interval(secs => $2::double precision))
            ON CONFLICT (key) DO UPDATE
                SET counter = CASE
                        WHEN kv_entries.expires_at <= NOW() THEN 1
                        ELSE kv_entries.counter + 1
                    END,
                    expires_at = CASE
                        WHEN kv_entries.expires_at <= NOW() THEN EXCLUDED.expires_at
                        ELSE kv_entries.expires_at
                    END
            RETURNING counter,
                GREATEST(CEIL(EXTRACT(EPOCH FROM (expires_at - NOW())) * 1000), 0)::BIGINT
                    AS resets_in_ms
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(key)
            .bind(window.as_secs_f64())
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to increment kv counter")?;

        let count: i64 = row.get("counter");
        let resets_in_ms: i64 = row.get("resets_in_ms");
        Ok(WindowCount {
            count: u64::try_from(count).unwrap_or(0),
            resets_in: Duration::from_millis(u64::try_from(resets_in_ms).unwrap_or(0)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::postgres::{ensure_container_runtime, schema_pool};
    use std::sync::Arc;

    async fn expire(pool: &PgPool, key: &str) -> Result<()> {
        sqlx::query("UPDATE kv_entries SET expires_at = NOW() - INTERVAL '1 second' WHERE key = $1")
            .bind(key)
            .execute(pool)
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn create_if_absent_has_a_single_winner_under_contention() -> Result<()> {
        if let Err(err) = ensure_container_runtime() {
            eprintln!("Skipping integration test: {err}");
            return Ok(());
        }

        let (pool, _container) = schema_pool().await?;
        let store = Arc::new(PgSharedStore::new(pool));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .create_if_absent("auth:refresh:used:jti-1", "1", Duration::from_secs(60))
                    .await
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await?? {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert!(store.exists("auth:refresh:used:jti-1").await?);
        Ok(())
    }

    #[tokio::test]
    async fn expired_entry_is_absent_and_can_be_claimed_again() -> Result<()> {
        if let Err(err) = ensure_container_runtime() {
            eprintln!("Skipping integration test: {err}");
            return Ok(());
        }

        let (pool, _container) = schema_pool().await?;
        let store = PgSharedStore::new(pool.clone());
        let ttl = Duration::from_secs(60);

        assert!(store.create_if_absent("marker", "1", ttl).await?);
        assert!(!store.create_if_absent("marker", "1", ttl).await?);

        expire(&pool, "marker").await?;
        assert!(!store.exists("marker").await?);
        assert!(store.create_if_absent("marker", "2", ttl).await?);
        assert!(store.exists("marker").await?);
        Ok(())
    }

    #[tokio::test]
    async fn set_overwrites_and_purge_drops_only_expired_rows() -> Result<()> {
        if let Err(err) = ensure_container_runtime() {
            eprintln!("Skipping integration test: {err}");
            return Ok(());
        }

        let (pool, _container) = schema_pool().await?;
        let store = PgSharedStore::new(pool.clone());
        let ttl = Duration::from_secs(60);

        store.set("family:revoked", "1", ttl).await?;
        store.set("family:revoked", "1", ttl).await?;
        assert!(store.exists("family:revoked").await?);

        store.set("stale", "1", ttl).await?;
        expire(&pool, "stale").await?;
        assert_eq!(store.purge_expired().await?, 1);
        assert!(store.exists("family:revoked").await?);
        Ok(())
    }

    #[tokio::test]
    async fn increment_counts_within_window_then_resets() -> Result<()> {
        if let Err(err) = ensure_container_runtime() {
            eprintln!("Skipping integration test: {err}");
            return Ok(());
        }

        let (pool, _container) = schema_pool().await?;
        let store = PgSharedStore::new(pool.clone());
        let window = Duration::from_secs(60);
        let key = "rate_limit:POST:/api/v1/auth/refresh:ip:10.0.0.1:anon";

        for expected in 1..=3 {
            let count = store.increment(key, window).await?;
            assert_eq!(count.count, expected);
            assert!(count.resets_in <= window);
            assert!(count.resets_in > Duration::from_secs(50));
        }

        expire(&pool, key).await?;
        let count = store.increment(key, window).await?;
        assert_eq!(count.count, 1);
        assert!(count.resets_in > Duration::from_secs(50));
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_increments_are_all_counted() -> Result<()> {
        if let Err(err) = ensure_container_runtime() {
            eprintln!("Skipping integration test: {err}");
            return Ok(());
        }

        let (pool, _container) = schema_pool().await?;
        let store = Arc::new(PgSharedStore::new(pool));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.increment("counter", Duration::from_secs(60)).await
            }));
        }
        let mut counts = Vec::new();
        for handle in handles {
            counts.push(handle.await??.count);
        }
        counts.sort_unstable();
        assert_eq!(counts, (1..=10).collect::<Vec<u64>>());
        Ok(())
    }
}
