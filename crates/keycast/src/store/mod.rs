// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable record store: server inventory and outstanding access keys.

pub mod postgres;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use uuid::Uuid;

use crate::model::{AccessKey, Server};

/// Storage for server inventory and issued-key records.
///
/// Implementations are shared by both lifecycle loops and must be safe for
/// concurrent use without external locking. Object-safe for use as
/// `Arc<dyn RecordStore>`.
pub trait RecordStore: Send + Sync {
    /// All servers currently marked active.
    fn eligible_servers(&self) -> BoxFuture<'_, anyhow::Result<Vec<Server>>>;

    /// One active server chosen at random, or `None` when there is none.
    fn pick_eligible_server(&self) -> BoxFuture<'_, anyhow::Result<Option<Server>>>;

    fn save<'a>(&'a self, key: &'a AccessKey) -> BoxFuture<'a, anyhow::Result<()>>;

    /// Records whose expiry is strictly before `now`.
    fn list_expired(&self, now: DateTime<Utc>) -> BoxFuture<'_, anyhow::Result<Vec<AccessKey>>>;

    /// Delete one record. Deleting a missing record succeeds.
    fn delete(&self, id: Uuid) -> BoxFuture<'_, anyhow::Result<()>>;

    /// Creation time of the most recent record, or `None` when there are no records.
    fn last_issued_at(&self) -> BoxFuture<'_, anyhow::Result<Option<DateTime<Utc>>>>;
}
