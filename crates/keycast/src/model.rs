// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Domain types shared by the orchestrator and its collaborators.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A provisioning target read from inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub id: Uuid,
    /// Host name or IP address of the management endpoint.
    pub address: String,
    /// Management API port.
    pub port: u16,
    /// Shared management secret (first path segment of the API).
    pub api_key: String,
    pub active: bool,
}

/// A freshly provisioned credential, as reported by the provisioning endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedKey {
    /// Server-side credential id.
    pub key_id: String,
    /// The secret handed to subscribers.
    pub access_url: String,
    /// Server-scoped management URL needed to revoke the credential.
    pub management_url: String,
}

/// One outstanding credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessKey {
    pub id: Uuid,
    pub key_id: String,
    pub access_url: String,
    pub management_url: String,
    pub server_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub expired_at: DateTime<Utc>,
}

impl AccessKey {
    /// Build the record for a credential issued at `now`.
    ///
    /// `expired_at` is fixed here and never recomputed.
    pub fn issued(
        key: IssuedKey,
        server_id: Option<Uuid>,
        now: DateTime<Utc>,
        validity: Duration,
    ) -> Self {
        let window = chrono::Duration::from_std(validity).unwrap_or(chrono::Duration::MAX);
        let expired_at = now.checked_add_signed(window).unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            id: Uuid::new_v4(),
            key_id: key.key_id,
            access_url: key.access_url,
            management_url: key.management_url,
            server_id,
            created_at: now,
            expired_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expired_at
    }
}

/// Outcome of a successful revocation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revocation {
    /// The server confirmed the credential was deleted.
    Revoked,
    /// The server no longer knows the credential.
    AlreadyGone,
}
