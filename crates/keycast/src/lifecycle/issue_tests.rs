// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use chrono::Utc;

use super::{issuance_due, IssueOutcome, IssuePhase};
use crate::config::PersistFailurePolicy;
use crate::error::ErrorCode;
use crate::lifecycle::{Inventory, LifecycleSettings};
use crate::test_support::{record, server, Call, Fault, Rig, StoreOp, DESTINATION};

fn settings() -> LifecycleSettings {
    LifecycleSettings::default()
}

#[tokio::test]
async fn successful_cycle_records_and_announces_once() -> anyhow::Result<()> {
    let rig = Rig::new();
    let orch = rig.orchestrator(settings());

    let outcome = orch.issue_once().await;
    let IssueOutcome::Announced { key, persisted } = outcome else {
        anyhow::bail!("expected Announced, got {outcome:?}");
    };
    assert!(persisted);
    assert_eq!(key.server_id, Some(server(1).id));
    assert_eq!(key.expired_at - key.created_at, chrono::Duration::hours(48));

    assert_eq!(rig.store.records(), vec![key.clone()]);
    let sent = rig.channel.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains(&key.access_url), "{}", sent[0]);

    let calls = rig.calls();
    assert_eq!(calls.len(), 3, "{calls:?}");
    assert_eq!(calls[0], Call::Issue { server_id: server(1).id });
    assert_eq!(calls[1], Call::Save { record_id: key.id });
    assert!(
        matches!(&calls[2], Call::Send { destination, .. } if destination == DESTINATION),
        "{calls:?}"
    );
    Ok(())
}

#[yare::parameterized(
    one_server    = { 1 },
    three_servers = { 3 },
    many_servers  = { 12 },
)]
#[test_macro(tokio::test)]
async fn any_inventory_yields_exactly_one_key(count: u8) -> anyhow::Result<()> {
    let servers: Vec<_> = (1..=count).map(server).collect();
    let rig = Rig::with_servers(servers.clone());
    let orch = rig.orchestrator(settings());

    let outcome = orch.issue_once().await;
    let key = outcome.key().cloned().ok_or_else(|| anyhow::anyhow!("no key: {outcome:?}"))?;

    assert_eq!(rig.store.records().len(), 1);
    assert_eq!(rig.channel.sent().len(), 1);
    assert!(servers.iter().any(|s| Some(s.id) == key.server_id));
    Ok(())
}

#[tokio::test]
async fn empty_inventory_skips_cycle() {
    let rig = Rig::with_servers(vec![]);
    let orch = rig.orchestrator(settings());

    let outcome = orch.issue_once().await;
    assert!(matches!(outcome, IssueOutcome::NoServer), "{outcome:?}");
    assert_eq!(outcome.error_code(), Some(ErrorCode::NoServer));
    assert!(rig.calls().is_empty());
}

#[tokio::test]
async fn inactive_servers_are_not_selected() {
    let mut retired = server(2);
    retired.active = false;
    let rig = Rig::with_servers(vec![retired]);
    let orch = rig.orchestrator(settings());

    assert!(matches!(orch.issue_once().await, IssueOutcome::NoServer));
}

#[tokio::test]
async fn provisioning_failure_abandons_cycle() {
    let rig = Rig::new();
    rig.provisioner.set_issue_fault(Fault::Fail);
    let orch = rig.orchestrator(settings());

    let outcome = orch.issue_once().await;
    assert!(
        matches!(outcome, IssueOutcome::Abandoned { phase: IssuePhase::Provisioning, .. }),
        "{outcome:?}"
    );
    assert_eq!(outcome.error_code(), Some(ErrorCode::Provision));
    assert!(rig.store.records().is_empty());
    assert!(rig.channel.sent().is_empty());
    assert_eq!(rig.calls().len(), 1);
}

#[tokio::test]
async fn persist_failure_announces_by_default() -> anyhow::Result<()> {
    let rig = Rig::new();
    rig.store.set_fault(StoreOp::Save, Fault::Fail);
    let orch = rig.orchestrator(settings());

    let outcome = orch.issue_once().await;
    let IssueOutcome::Announced { key, persisted } = outcome else {
        anyhow::bail!("expected Announced, got {outcome:?}");
    };
    assert!(!persisted);
    assert!(rig.store.records().is_empty());
    assert_eq!(rig.channel.sent().len(), 1);
    assert_eq!(rig.log.count(|c| matches!(c, Call::Revoke { .. })), 0);
    assert!(rig.channel.sent()[0].contains(&key.access_url));
    Ok(())
}

#[tokio::test]
async fn persist_failure_with_revoke_policy_stays_silent() {
    let rig = Rig::new();
    rig.store.set_fault(StoreOp::Save, Fault::Fail);
    let orch = rig.orchestrator(LifecycleSettings {
        on_persist_failure: PersistFailurePolicy::Revoke,
        ..settings()
    });

    let outcome = orch.issue_once().await;
    assert!(
        matches!(outcome, IssueOutcome::Abandoned { phase: IssuePhase::Persisting, .. }),
        "{outcome:?}"
    );
    assert_eq!(outcome.error_code(), Some(ErrorCode::Persist));
    assert!(rig.channel.sent().is_empty());
    assert_eq!(rig.log.count(|c| matches!(c, Call::Send { .. })), 0);
    assert_eq!(rig.log.count(|c| *c == Call::Revoke { key_id: "1".to_owned() }), 1);
}

#[tokio::test]
async fn revoke_policy_survives_failed_revocation() {
    let rig = Rig::new();
    rig.store.set_fault(StoreOp::Save, Fault::Fail);
    rig.provisioner.set_revoke_fault("1", Fault::Fail);
    let orch = rig.orchestrator(LifecycleSettings {
        on_persist_failure: PersistFailurePolicy::Revoke,
        ..settings()
    });

    let outcome = orch.issue_once().await;
    assert!(matches!(outcome, IssueOutcome::Abandoned { phase: IssuePhase::Persisting, .. }));
    assert!(rig.channel.sent().is_empty());
}

#[tokio::test]
async fn notify_failure_keeps_record() -> anyhow::Result<()> {
    let rig = Rig::new();
    rig.channel.set_fault(Fault::Fail);
    let orch = rig.orchestrator(settings());

    let outcome = orch.issue_once().await;
    assert_eq!(outcome.error_code(), Some(ErrorCode::Notify));
    let IssueOutcome::Unannounced { key, persisted, .. } = outcome else {
        anyhow::bail!("expected Unannounced, got {outcome:?}");
    };
    assert!(persisted);
    assert_eq!(rig.store.records(), vec![key]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn hung_provisioner_times_out() {
    let rig = Rig::new();
    rig.provisioner.set_issue_fault(Fault::Hang);
    let orch = rig
        .orchestrator(LifecycleSettings { call_timeout: Duration::from_secs(5), ..settings() });

    let start = tokio::time::Instant::now();
    let outcome = orch.issue_once().await;
    assert_eq!(start.elapsed(), Duration::from_secs(5));
    assert!(matches!(outcome, IssueOutcome::Abandoned { phase: IssuePhase::Provisioning, .. }));
    assert_eq!(outcome.error_code(), Some(ErrorCode::Timeout));
}

#[tokio::test]
async fn live_inventory_asks_store_each_cycle() {
    let rig = Rig::with_servers(vec![server(1), server(2)]);
    let orch = rig.orchestrator_with(Inventory::Live, settings());

    orch.issue_once().await;
    rig.store.set_servers(vec![]);
    let outcome = orch.issue_once().await;

    assert!(matches!(outcome, IssueOutcome::NoServer));
    assert_eq!(rig.log.count(|c| *c == Call::PickServer), 2);
    assert_eq!(rig.store.records().len(), 1);
}

#[tokio::test]
async fn live_inventory_store_failure_abandons_selection() {
    let rig = Rig::new();
    rig.store.set_fault(StoreOp::PickServer, Fault::Fail);
    let orch = rig.orchestrator_with(Inventory::Live, settings());

    let outcome = orch.issue_once().await;
    assert!(matches!(outcome, IssueOutcome::Abandoned { phase: IssuePhase::Selecting, .. }));
    assert_eq!(outcome.error_code(), Some(ErrorCode::Store));
    assert_eq!(rig.log.count(|c| matches!(c, Call::Issue { .. })), 0);
}

#[tokio::test]
async fn catch_up_issues_when_nothing_was_ever_issued() {
    let rig = Rig::new();
    let orch = rig.orchestrator(settings());

    let outcome = orch.catch_up().await;
    assert!(matches!(outcome, Some(IssueOutcome::Announced { .. })), "{outcome:?}");
    assert_eq!(rig.channel.sent().len(), 1);
}

#[yare::parameterized(
    overdue    = { 24 * 3600 + 1, 1 },
    recent     = { 1, 0 },
    just_under = { 24 * 3600 - 5, 0 },
)]
#[test_macro(tokio::test)]
async fn catch_up_follows_last_issuance(age_secs: i64, expected: usize) {
    let rig = Rig::new();
    let created = Utc::now() - chrono::Duration::seconds(age_secs);
    rig.store.insert(record("old", created, Duration::from_secs(48 * 3600)));
    let orch = rig.orchestrator(settings());

    orch.catch_up().await;
    assert_eq!(rig.log.count(|c| matches!(c, Call::Issue { .. })), expected);
    assert_eq!(rig.channel.sent().len(), expected);
}

#[tokio::test]
async fn catch_up_skips_when_last_issuance_is_unreadable() {
    let rig = Rig::new();
    rig.store.set_fault(StoreOp::LastIssuedAt, Fault::Fail);
    let orch = rig.orchestrator(settings());

    assert!(orch.catch_up().await.is_none());
    assert_eq!(rig.calls(), vec![Call::LastIssuedAt]);
}

#[yare::parameterized(
    never       = { None, true },
    just_now    = { Some(0), false },
    at_interval = { Some(3600), false },
    past        = { Some(3601), true },
)]
fn issuance_due_is_strict(age_secs: Option<i64>, expected: bool) {
    let now = Utc::now();
    let last = age_secs.map(|s| now - chrono::Duration::seconds(s));
    assert_eq!(issuance_due(last, now, Duration::from_secs(3600)), expected);
}
