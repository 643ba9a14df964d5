// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Access-key lifecycle: periodic issuance and reclamation.
//!
//! Two independent loops run for the life of the process:
//!
//! - **issuance** picks a server, provisions a key, records it and announces
//!   it on the channel;
//! - **reclamation** revokes expired keys and deletes their records.
//!
//! The loops share nothing mutable. Each tick runs inside a fault boundary
//! ([`guard::guarded`]) and every collaborator call is bounded by
//! [`LifecycleSettings::call_timeout`].

pub mod guard;
pub mod inventory;
pub mod issue;
pub mod reclaim;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::channel::message::MessageTemplate;
use crate::channel::Broadcaster;
use crate::config::{Config, PersistFailurePolicy, MAX_PERIOD};
use crate::provision::Provisioner;
use crate::store::RecordStore;

pub use inventory::Inventory;
pub use issue::{IssueOutcome, IssuePhase};
pub use reclaim::{ReclaimFailure, ReclaimReport};

/// Cadence and bounds for both loops.
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub issue_interval: Duration,
    pub reclaim_interval: Duration,
    /// Lifetime of every issued key.
    pub validity: Duration,
    /// Upper bound for any single collaborator call.
    pub call_timeout: Duration,
    pub on_persist_failure: PersistFailurePolicy,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            issue_interval: Duration::from_secs(24 * 3600),
            reclaim_interval: Duration::from_secs(5 * 3600),
            validity: Duration::from_secs(48 * 3600),
            call_timeout: Duration::from_secs(30),
            on_persist_failure: PersistFailurePolicy::Announce,
        }
    }
}

impl LifecycleSettings {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            issue_interval: config.issue_interval(),
            reclaim_interval: config.reclaim_interval(),
            validity: config.validity(),
            call_timeout: config.call_timeout(),
            on_persist_failure: config.persist_failure_policy()?,
        })
    }
}

/// The three external collaborators the orchestrator sequences.
#[derive(Clone)]
pub struct Collaborators {
    pub provisioner: Arc<dyn Provisioner>,
    pub store: Arc<dyn RecordStore>,
    pub channel: Arc<dyn Broadcaster>,
}

/// Runs the issuance and reclamation loops.
pub struct Orchestrator {
    provisioner: Arc<dyn Provisioner>,
    store: Arc<dyn RecordStore>,
    channel: Arc<dyn Broadcaster>,
    inventory: Inventory,
    destination: String,
    template: MessageTemplate,
    settings: LifecycleSettings,
}

impl Orchestrator {
    pub fn new(
        collaborators: Collaborators,
        inventory: Inventory,
        destination: impl Into<String>,
        template: MessageTemplate,
        settings: LifecycleSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            provisioner: collaborators.provisioner,
            store: collaborators.store,
            channel: collaborators.channel,
            inventory,
            destination: destination.into(),
            template,
            settings,
        })
    }

    pub fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    /// Run both loops until `shutdown` is cancelled.
    ///
    /// Returns once both loops have stopped. A tick that is already running
    /// when cancellation arrives is allowed to finish.
    pub async fn start(self: &Arc<Self>, shutdown: CancellationToken) {
        tracing::info!(
            issue_every = ?self.settings.issue_interval,
            reclaim_every = ?self.settings.reclaim_interval,
            validity = ?self.settings.validity,
            inventory = %self.inventory,
            "lifecycle starting"
        );

        let issuing = tokio::spawn(Arc::clone(self).issuance_loop(shutdown.clone()));
        let reclaiming = tokio::spawn(Arc::clone(self).reclamation_loop(shutdown));

        let (issued, reclaimed) = tokio::join!(issuing, reclaiming);
        for (name, joined) in [("issuance", issued), ("reclamation", reclaimed)] {
            if let Err(e) = joined {
                tracing::error!(lifecycle_loop = name, err = %e, "lifecycle loop aborted");
            }
        }

        tracing::info!("lifecycle stopped");
    }

    async fn issuance_loop(self: Arc<Self>, shutdown: CancellationToken) {
        let period = self.settings.issue_interval.min(MAX_PERIOD);
        let first_tick = Instant::now() + period;

        // One-time catch-up for a cycle missed while the process was down.
        if !shutdown.is_cancelled() {
            guard::guarded("catch-up", self.catch_up()).await;
        }

        let mut timer = tokio::time::interval_at(first_tick, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }

            guard::guarded("issuance", self.issue_once()).await;
        }

        tracing::debug!("issuance loop stopped");
    }

    async fn reclamation_loop(self: Arc<Self>, shutdown: CancellationToken) {
        // First tick fires immediately: keys that expired while the process
        // was down are reclaimed at startup.
        let mut timer = tokio::time::interval(self.settings.reclaim_interval.min(MAX_PERIOD));
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }

            guard::guarded("reclamation", self.reclaim_once()).await;
        }

        tracing::debug!("reclamation loop stopped");
    }
}
