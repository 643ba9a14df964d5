// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PostgreSQL record store.

use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

use crate::model::{AccessKey, Server};
use crate::store::RecordStore;

const SERVER_COLUMNS: &str = "id, ip_address, port, api_key, is_active";
const KEY_COLUMNS: &str = "id, key_id, access_url, management_url, server_id, created_at, expired_at";

#[derive(Debug, sqlx::FromRow)]
struct ServerRow {
    id: Uuid,
    ip_address: String,
    port: i32,
    api_key: String,
    is_active: bool,
}

impl TryFrom<ServerRow> for Server {
    type Error = anyhow::Error;

    fn try_from(row: ServerRow) -> Result<Self, Self::Error> {
        let port = u16::try_from(row.port)
            .map_err(|_| anyhow::anyhow!("server {} has invalid port {}", row.id, row.port))?;
        Ok(Server {
            id: row.id,
            address: row.ip_address,
            port,
            api_key: row.api_key,
            active: row.is_active,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AccessKeyRow {
    id: Uuid,
    key_id: String,
    access_url: String,
    management_url: String,
    server_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    expired_at: DateTime<Utc>,
}

impl From<AccessKeyRow> for AccessKey {
    fn from(row: AccessKeyRow) -> Self {
        Self {
            id: row.id,
            key_id: row.key_id,
            access_url: row.access_url,
            management_url: row.management_url,
            server_id: row.server_id,
            created_at: row.created_at,
            expired_at: row.expired_at,
        }
    }
}

/// Record store backed by a `sqlx` connection pool.
///
/// The pool serializes nothing itself; both lifecycle loops share it.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect a pool and verify it with a round trip.
    pub async fn connect(
        dsn: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(dsn)
            .await
            .context("connect to record store")?;
        sqlx::query("SELECT 1").execute(&pool).await.context("ping record store")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await.context("apply migrations")?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn fetch_eligible(&self) -> anyhow::Result<Vec<Server>> {
        let query =
            format!("SELECT {SERVER_COLUMNS} FROM servers WHERE is_active ORDER BY ip_address, port");
        let rows: Vec<ServerRow> =
            sqlx::query_as(&query).fetch_all(&self.pool).await.context("select servers")?;

        let mut servers = Vec::with_capacity(rows.len());
        for row in rows {
            match Server::try_from(row) {
                Ok(server) => servers.push(server),
                Err(e) => tracing::warn!(err = %e, "skipping unusable server row"),
            }
        }
        Ok(servers)
    }

    async fn fetch_random(&self) -> anyhow::Result<Option<Server>> {
        let query = format!(
            "SELECT {SERVER_COLUMNS} FROM servers WHERE is_active ORDER BY random() LIMIT 1"
        );
        let row: Option<ServerRow> =
            sqlx::query_as(&query).fetch_optional(&self.pool).await.context("pick server")?;
        row.map(Server::try_from).transpose()
    }

    async fn insert(&self, key: &AccessKey) -> anyhow::Result<()> {
        let query = format!(
            "INSERT INTO access_keys ({KEY_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)"
        );
        sqlx::query(&query)
            .bind(key.id)
            .bind(&key.key_id)
            .bind(&key.access_url)
            .bind(&key.management_url)
            .bind(key.server_id)
            .bind(key.created_at)
            .bind(key.expired_at)
            .execute(&self.pool)
            .await
            .with_context(|| format!("insert access key {}", key.id))?;
        Ok(())
    }

    async fn fetch_expired(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<AccessKey>> {
        let query = format!(
            "SELECT {KEY_COLUMNS} FROM access_keys WHERE expired_at < $1 ORDER BY expired_at"
        );
        let rows: Vec<AccessKeyRow> = sqlx::query_as(&query)
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .context("select expired access keys")?;
        Ok(rows.into_iter().map(AccessKey::from).collect())
    }

    async fn remove(&self, id: Uuid) -> anyhow::Result<()> {
        let result = sqlx::query("DELETE FROM access_keys WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("delete access key {id}"))?;
        if result.rows_affected() == 0 {
            tracing::debug!(record_id = %id, "access key record already absent");
        }
        Ok(())
    }

    async fn latest_created_at(&self) -> anyhow::Result<Option<DateTime<Utc>>> {
        let latest: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT max(created_at) FROM access_keys")
                .fetch_one(&self.pool)
                .await
                .context("select last issuance time")?;
        Ok(latest)
    }
}

impl RecordStore for PgStore {
    fn eligible_servers(&self) -> BoxFuture<'_, anyhow::Result<Vec<Server>>> {
        Box::pin(self.fetch_eligible())
    }

    fn pick_eligible_server(&self) -> BoxFuture<'_, anyhow::Result<Option<Server>>> {
        Box::pin(self.fetch_random())
    }

    fn save<'a>(&'a self, key: &'a AccessKey) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(self.insert(key))
    }

    fn list_expired(&self, now: DateTime<Utc>) -> BoxFuture<'_, anyhow::Result<Vec<AccessKey>>> {
        Box::pin(self.fetch_expired(now))
    }

    fn delete(&self, id: Uuid) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(self.remove(id))
    }

    fn last_issued_at(&self) -> BoxFuture<'_, anyhow::Result<Option<DateTime<Utc>>>> {
        Box::pin(self.latest_created_at())
    }
}
