// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One issuance cycle: select, provision, persist, notify.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::PersistFailurePolicy;
use crate::error::{CycleError, ErrorCode};
use crate::lifecycle::guard::{bounded, report};
use crate::lifecycle::Orchestrator;
use crate::model::{AccessKey, Revocation};

/// Step of the issuance cycle at which it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuePhase {
    Selecting,
    Provisioning,
    Persisting,
    Notifying,
}

/// Where an issuance cycle ended.
#[derive(Debug)]
pub enum IssueOutcome {
    /// No eligible server was available.
    NoServer,
    /// The cycle stopped before anything reached the channel.
    Abandoned { phase: IssuePhase, error: CycleError },
    /// The key was announced. `persisted` is false when the record could not
    /// be saved and the key was announced anyway.
    Announced { key: AccessKey, persisted: bool },
    /// The key was provisioned but the announcement failed.
    Unannounced { key: AccessKey, persisted: bool, error: CycleError },
}

impl IssueOutcome {
    pub fn key(&self) -> Option<&AccessKey> {
        match self {
            Self::Announced { key, .. } | Self::Unannounced { key, .. } => Some(key),
            Self::NoServer | Self::Abandoned { .. } => None,
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::NoServer => Some(ErrorCode::NoServer),
            Self::Abandoned { error, .. } | Self::Unannounced { error, .. } => Some(error.code),
            Self::Announced { .. } => None,
        }
    }
}

/// Whether a cycle is owed given the last issuance time.
///
/// True when nothing was ever issued or strictly more than `interval` has
/// passed since the last issuance.
pub fn issuance_due(last: Option<DateTime<Utc>>, now: DateTime<Utc>, interval: Duration) -> bool {
    let Some(last) = last else {
        return true;
    };
    match chrono::Duration::from_std(interval) {
        Ok(interval) => now.signed_duration_since(last) > interval,
        Err(_) => false,
    }
}

impl Orchestrator {
    /// Issue one immediately if the previous cycle was missed.
    ///
    /// Returns `None` when nothing was owed or the last issuance time could
    /// not be read.
    pub async fn catch_up(&self) -> Option<IssueOutcome> {
        let last = match bounded(ErrorCode::Store, self.settings.call_timeout, self.store.last_issued_at())
            .await
        {
            Ok(last) => last,
            Err(error) => {
                tracing::warn!(
                    code = %error.code,
                    err = %error,
                    "cannot read last issuance time; skipping catch-up"
                );
                return None;
            }
        };

        if !issuance_due(last, Utc::now(), self.settings.issue_interval) {
            tracing::info!(last_issued_at = ?last, "last issuance is recent; no catch-up needed");
            return None;
        }

        tracing::info!(last_issued_at = ?last, "issuance overdue; issuing now");
        Some(self.issue_once().await)
    }

    /// Run one issuance cycle.
    pub async fn issue_once(&self) -> IssueOutcome {
        let limit = self.settings.call_timeout;

        let server = match self.inventory.select(self.store.as_ref(), limit).await {
            Ok(Some(server)) => server,
            Ok(None) => {
                tracing::info!(code = %ErrorCode::NoServer, "no eligible server; skipping cycle");
                return IssueOutcome::NoServer;
            }
            Err(error) => {
                report("issuance", &error);
                return IssueOutcome::Abandoned { phase: IssuePhase::Selecting, error };
            }
        };

        let issued = match bounded(ErrorCode::Provision, limit, self.provisioner.issue(&server)).await {
            Ok(issued) => issued,
            Err(error) => {
                tracing::warn!(
                    server_id = %server.id,
                    code = %error.code,
                    err = %error,
                    "provisioning failed; cycle abandoned"
                );
                return IssueOutcome::Abandoned { phase: IssuePhase::Provisioning, error };
            }
        };

        let key = AccessKey::issued(issued, Some(server.id), Utc::now(), self.settings.validity);

        let persisted = match bounded(ErrorCode::Persist, limit, self.store.save(&key)).await {
            Ok(()) => true,
            Err(error) => match self.settings.on_persist_failure {
                PersistFailurePolicy::Announce => {
                    tracing::error!(
                        record_id = %key.id,
                        key_id = %key.key_id,
                        server_id = %server.id,
                        code = %error.code,
                        err = %error,
                        "key provisioned but not recorded; announcing anyway"
                    );
                    false
                }
                PersistFailurePolicy::Revoke => {
                    self.discard_unrecorded(&key).await;
                    return IssueOutcome::Abandoned { phase: IssuePhase::Persisting, error };
                }
            },
        };

        let text = self.template.render(&key);
        match bounded(ErrorCode::Notify, limit, self.channel.send(&self.destination, &text)).await {
            Ok(()) => {
                tracing::info!(
                    record_id = %key.id,
                    key_id = %key.key_id,
                    server_id = %server.id,
                    expired_at = %key.expired_at,
                    persisted,
                    "key announced"
                );
                IssueOutcome::Announced { key, persisted }
            }
            Err(error) => {
                tracing::warn!(
                    record_id = %key.id,
                    key_id = %key.key_id,
                    code = %error.code,
                    err = %error,
                    "announcement failed"
                );
                IssueOutcome::Unannounced { key, persisted, error }
            }
        }
    }

    /// Revoke a key whose record could not be saved.
    async fn discard_unrecorded(&self, key: &AccessKey) {
        let revoked = bounded(
            ErrorCode::Revoke,
            self.settings.call_timeout,
            self.provisioner.revoke(&key.management_url, &key.key_id),
        )
        .await;

        match revoked {
            Ok(Revocation::Revoked | Revocation::AlreadyGone) => tracing::warn!(
                key_id = %key.key_id,
                server_id = ?key.server_id,
                "record not saved; key revoked and not announced"
            ),
            Err(error) => tracing::error!(
                record_id = %key.id,
                key_id = %key.key_id,
                server_id = ?key.server_id,
                code = %error.code,
                err = %error,
                "record not saved and revocation failed; key is orphaned"
            ),
        }
    }
}

#[cfg(test)]
#[path = "issue_tests.rs"]
mod tests;
