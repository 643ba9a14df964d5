// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;
use std::time::Duration;

use rand::seq::IndexedRandom;

use crate::error::{CycleError, ErrorCode};
use crate::lifecycle::guard::bounded;
use crate::model::Server;
use crate::store::RecordStore;

/// Source of eligible servers for the issuance loop.
#[derive(Debug, Clone)]
pub enum Inventory {
    /// Servers captured once at startup.
    Snapshot(Vec<Server>),
    /// Ask the store for a random eligible server every cycle.
    Live,
}

impl Inventory {
    /// A snapshot holding the active servers of `servers`.
    pub fn snapshot(servers: impl IntoIterator<Item = Server>) -> Self {
        Self::Snapshot(servers.into_iter().filter(|s| s.active).collect())
    }

    /// Snapshot size; `None` in live mode.
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::Snapshot(servers) => Some(servers.len()),
            Self::Live => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Pick one eligible server uniformly at random.
    pub async fn select(
        &self,
        store: &dyn RecordStore,
        limit: Duration,
    ) -> Result<Option<Server>, CycleError> {
        match self {
            Self::Snapshot(servers) => Ok(servers.choose(&mut rand::rng()).cloned()),
            Self::Live => bounded(ErrorCode::Store, limit, store.pick_eligible_server()).await,
        }
    }
}

impl fmt::Display for Inventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Snapshot(servers) => write!(f, "snapshot({})", servers.len()),
            Self::Live => f.write_str("live"),
        }
    }
}
