//! Postgres persistence for users and provider links.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::Instrument;
use uuid::Uuid;

use super::{IdentityStore, IdentityTx, LocalUser, UserInsertOutcome, DEFAULT_ROLE};

#[derive(Clone, Debug)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn begin(&self) -> Result<Box<dyn IdentityTx>> {
        let tx = self
            .pool
            .begin()
            .await
            .context("failed to start identity transaction")?;
        Ok(Box::new(PgIdentityTx { tx }))
    }
}

struct PgIdentityTx {
    tx: Transaction<'static, Postgres>,
}

fn user_from_row(row: &sqlx::postgres::PgRow) -> LocalUser {
    LocalUser {
        id: row.get("id"),
        email: row.get("email"),
        nickname: row.get("nickname"),
        role: row.get("role"),
    }
}

#[async_trait]
impl IdentityTx for PgIdentityTx {
    async fn find_by_provider(
        &mut self,
        provider: &str,
        provider_user_id: &str,
    ) -> Result<Option<LocalUser>> {
        let query = r"
            SELECT u.id, u.email, u.nickname, u.role
            FROM user_auth_providers p
            JOIN users u ON u.id = p.user_id
            WHERE p.provider = $1 AND p.provider_user_id = $2
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(provider)
            .bind(provider_user_id)
            .fetch_optional(&mut *self.tx)
            .instrument(span)
            .await
            .context("failed to look up provider link")?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn find_by_email(&mut self, email: &str) -> Result<Option<LocalUser>> {
        let query = "SELECT id, email, nickname, role FROM users WHERE email = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&mut *self.tx)
            .instrument(span)
            .await
            .context("failed to look up user by email")?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn insert_user(&mut self, email: &str, nickname: &str) -> Result<UserInsertOutcome> {
        // DO NOTHING waits for a concurrent inserter to finish, so a conflict
        // is only reported once the other row is committed and readable.
        let query = r"
            INSERT INTO users (id, email, nickname, role)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (email) DO NOTHING
            RETURNING id, email, nickname, role
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(Uuid::now_v7())
            .bind(email)
            .bind(nickname)
            .bind(DEFAULT_ROLE)
            .fetch_optional(&mut *self.tx)
            .instrument(span)
            .await
            .context("failed to insert user")?;
        Ok(row.as_ref().map_or(UserInsertOutcome::Conflict, |row| {
            UserInsertOutcome::Created(user_from_row(row))
        }))
    }

    async fn link_provider(
        &mut self,
        user_id: Uuid,
        provider: &str,
        provider_user_id: &str,
        email: &str,
    ) -> Result<bool> {
        let query = r"
            INSERT INTO user_auth_providers (id, user_id, provider, provider_user_id, email)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (provider, provider_user_id) DO NOTHING
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(Uuid::now_v7())
            .bind(user_id)
            .bind(provider)
            .bind(provider_user_id)
            .bind(email)
            .execute(&mut *self.tx)
            .instrument(span)
            .await
            .context("failed to link provider identity")?;
        Ok(result.rows_affected() == 1)
    }

    async fn touch_last_login(&mut self, user_id: Uuid) -> Result<()> {
        let query = "UPDATE users SET last_login_at = NOW(), updated_at = NOW() WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .execute(&mut *self.tx)
            .instrument(span)
            .await
            .context("failed to update last login")?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx
            .commit()
            .await
            .context("failed to commit identity transaction")
    }
}
