//! Postgres persistence for guest identities.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::{GuestIdentity, GuestInsertOutcome, GuestStore, GUEST_STATUS_ACTIVE};
use crate::db::is_unique_violation;

#[derive(Clone, Debug)]
pub struct PgGuestStore {
    pool: PgPool,
}

impl PgGuestStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn guest_from_row(row: &sqlx::postgres::PgRow) -> GuestIdentity {
    GuestIdentity {
        id: row.get("id"),
        ip_hash: row.get("ip_hash"),
        status: row.get("status"),
        last_seen_at: row.get("last_seen_at"),
    }
}

#[async_trait]
impl GuestStore for PgGuestStore {
    async fn find_by_ip_hash(&self, ip_hash: &str) -> Result<Option<GuestIdentity>> {
        let query = "SELECT id, ip_hash, status, last_seen_at FROM guests WHERE ip_hash = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(ip_hash)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to look up guest")?;
        Ok(row.as_ref().map(guest_from_row))
    }

    async fn insert(&self, ip_hash: &str) -> Result<GuestInsertOutcome> {
        let query = r"
            INSERT INTO guests (id, ip_hash, status, last_seen_at)
            VALUES ($1, $2, $3, NOW())
            RETURNING id, ip_hash, status, last_seen_at
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(Uuid::now_v7())
            .bind(ip_hash)
            .bind(GUEST_STATUS_ACTIVE)
            .fetch_one(&self.pool)
            .instrument(span)
            .await;

        match result {
            Ok(row) => Ok(GuestInsertOutcome::Created(guest_from_row(&row))),
            Err(err) if is_unique_violation(&err) => Ok(GuestInsertOutcome::Conflict),
            Err(err) => Err(err).context("failed to insert guest"),
        }
    }

    async fn touch_last_seen(&self, guest_id: Uuid) -> Result<DateTime<Utc>> {
        let query = "UPDATE guests SET last_seen_at = NOW() WHERE id = $1 RETURNING last_seen_at";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(guest_id)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to touch guest")?;
        Ok(row.get("last_seen_at"))
    }
}
