use async_trait::async_trait;
use sqlx::postgres::{PgConnection, PgPoolOptions};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::instrument;

use crate::db::repositories::{Isolation, Tx, UnitOfWork};
use crate::db::{Store, StoreResult};
use crate::util::env::DatabaseConfig;

const SCHEMA: &str = include_str!("schema.sql");

/// Splits the embedded schema into executable statements, skipping comment-only chunks
fn schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .map(str::trim)
        .filter(|stmt| {
            stmt.lines()
                .map(str::trim)
                .any(|line| !line.is_empty() && !line.starts_with("--"))
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[instrument(skip(cfg), fields(max_connections = cfg.max_connections))]
    pub async fn connect(cfg: &DatabaseConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .connect(&cfg.url)
            .await?;

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    #[instrument(skip(self))]
    async fn begin(&self, isolation: Isolation) -> StoreResult<Tx> {
        let mut inner = self.pool.begin().await?;
        sqlx::query(isolation.as_sql()).execute(&mut *inner).await?;

        Ok(Tx::new(Box::new(PgTx { inner })))
    }

    #[instrument(skip(self))]
    async fn migrate(&self) -> StoreResult<()> {
        let mut conn = self.pool.acquire().await?;
        for stmt in schema_statements(SCHEMA) {
            sqlx::query(stmt).execute(&mut *conn).await?;
        }

        tracing::info!("schema applied");
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}

/// An open Postgres transaction. Dropping it without committing rolls it back.
pub struct PgTx {
    inner: Transaction<'static, Postgres>,
}

impl PgTx {
    pub(crate) fn conn(&mut self) -> &mut PgConnection {
        &mut self.inner
    }
}

#[async_trait]
impl UnitOfWork for PgTx {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        Ok(self.inner.commit().await?)
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(self.inner.rollback().await?)
    }
}
