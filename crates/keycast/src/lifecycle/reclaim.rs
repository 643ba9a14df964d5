// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One reclamation cycle: revoke expired keys, then delete their records.

use chrono::Utc;
use uuid::Uuid;

use crate::error::{CycleError, ErrorCode};
use crate::lifecycle::guard::{self, bounded};
use crate::lifecycle::Orchestrator;
use crate::model::{AccessKey, Revocation};

/// A record left in place by a failed revocation or deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReclaimFailure {
    pub record_id: Uuid,
    pub key_id: String,
    pub code: ErrorCode,
    pub reason: String,
}

/// Tally of one reclamation cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReclaimReport {
    pub expired: usize,
    pub revoked: usize,
    pub already_gone: usize,
    pub deleted: usize,
    pub failures: Vec<ReclaimFailure>,
}

impl ReclaimReport {
    fn fail(&mut self, key: &AccessKey, error: CycleError) {
        self.failures.push(ReclaimFailure {
            record_id: key.id,
            key_id: key.key_id.clone(),
            code: error.code,
            reason: format!("{:#}", error.source),
        });
    }

    fn log(&self) {
        if self.expired == 0 {
            tracing::debug!("no expired keys");
            return;
        }
        if self.failures.is_empty() {
            tracing::info!(
                expired = self.expired,
                revoked = self.revoked,
                already_gone = self.already_gone,
                deleted = self.deleted,
                "reclamation finished"
            );
            return;
        }
        let failed: Vec<String> = self
            .failures
            .iter()
            .map(|f| format!("{} ({}): {}", f.key_id, f.code, f.reason))
            .collect();
        tracing::warn!(
            expired = self.expired,
            revoked = self.revoked,
            already_gone = self.already_gone,
            deleted = self.deleted,
            failed = self.failures.len(),
            failures = %failed.join("; "),
            "reclamation finished with failures; kept records retry next tick"
        );
    }
}

impl Orchestrator {
    /// Run one reclamation cycle.
    ///
    /// A record is deleted only after its revocation returned `Revoked` or
    /// `AlreadyGone`. Per-record failures never stop the batch.
    pub async fn reclaim_once(&self) -> Result<ReclaimReport, CycleError> {
        let limit = self.settings.call_timeout;

        let expired = bounded(ErrorCode::Store, limit, self.store.list_expired(Utc::now()))
            .await
            .inspect_err(|error| guard::report("reclamation", error))?;

        let mut report = ReclaimReport { expired: expired.len(), ..Default::default() };

        for key in &expired {
            let revoked =
                bounded(ErrorCode::Revoke, limit, self.provisioner.revoke(&key.management_url, &key.key_id))
                    .await;
            match revoked {
                Ok(Revocation::Revoked) => report.revoked += 1,
                Ok(Revocation::AlreadyGone) => {
                    tracing::debug!(record_id = %key.id, key_id = %key.key_id, "key already gone");
                    report.already_gone += 1;
                }
                Err(error) => {
                    report.fail(key, error);
                    continue;
                }
            }

            match bounded(ErrorCode::Delete, limit, self.store.delete(key.id)).await {
                Ok(()) => report.deleted += 1,
                Err(error) => report.fail(key, error),
            }
        }

        report.log();
        Ok(report)
    }
}

#[cfg(test)]
#[path = "reclaim_tests.rs"]
mod tests;
