// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timer-driven tests for the two lifecycle loops, on paused tokio time.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use keycast::lifecycle::{LifecycleSettings, Orchestrator};
use keycast::test_support::{expired_record, record, Call, Fault, Rig, StoreOp};

const ISSUE_EVERY: Duration = Duration::from_secs(100);
const RECLAIM_EVERY: Duration = Duration::from_secs(30);

fn settings() -> LifecycleSettings {
    LifecycleSettings {
        issue_interval: ISSUE_EVERY,
        reclaim_interval: RECLAIM_EVERY,
        call_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

fn spawn(orch: &Arc<Orchestrator>, shutdown: &CancellationToken) -> JoinHandle<()> {
    let orch = Arc::clone(orch);
    let shutdown = shutdown.clone();
    tokio::spawn(async move { orch.start(shutdown).await })
}

fn issues(rig: &Rig) -> usize {
    rig.log.count(|c| matches!(c, Call::Issue { .. }))
}

fn listings(rig: &Rig) -> usize {
    rig.log.count(|c| *c == Call::ListExpired)
}

async fn stop(shutdown: CancellationToken, handle: JoinHandle<()>) -> anyhow::Result<()> {
    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle).await??;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn empty_store_catches_up_then_ticks_every_interval() -> anyhow::Result<()> {
    let rig = Rig::new();
    let orch = rig.orchestrator(settings());
    let shutdown = CancellationToken::new();
    let handle = spawn(&orch, &shutdown);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(issues(&rig), 1, "catch-up issuance");

    tokio::time::sleep(ISSUE_EVERY - Duration::from_secs(2)).await;
    assert_eq!(issues(&rig), 1, "first tick is one full interval after startup");

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(issues(&rig), 2);

    tokio::time::sleep(ISSUE_EVERY).await;
    assert_eq!(issues(&rig), 3);
    assert_eq!(rig.channel.sent().len(), 3);

    stop(shutdown, handle).await
}

#[tokio::test(start_paused = true)]
async fn recent_issuance_skips_catch_up() -> anyhow::Result<()> {
    let rig = Rig::new();
    rig.store.insert(record("prev", Utc::now() - chrono::Duration::seconds(1), Duration::from_secs(48 * 3600)));
    let orch = rig.orchestrator(settings());
    let shutdown = CancellationToken::new();
    let handle = spawn(&orch, &shutdown);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(issues(&rig), 0);
    assert_eq!(rig.log.count(|c| *c == Call::LastIssuedAt), 1);

    tokio::time::sleep(ISSUE_EVERY).await;
    assert_eq!(issues(&rig), 1);

    stop(shutdown, handle).await
}

#[tokio::test(start_paused = true)]
async fn overdue_issuance_catches_up_once() -> anyhow::Result<()> {
    let rig = Rig::new();
    let overdue = Utc::now() - chrono::Duration::seconds(101);
    rig.store.insert(record("prev", overdue, Duration::from_secs(48 * 3600)));
    let orch = rig.orchestrator(settings());
    let shutdown = CancellationToken::new();
    let handle = spawn(&orch, &shutdown);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(issues(&rig), 1);
    assert_eq!(rig.log.count(|c| *c == Call::LastIssuedAt), 1);

    tokio::time::sleep(ISSUE_EVERY * 3).await;
    assert_eq!(rig.log.count(|c| *c == Call::LastIssuedAt), 1, "catch-up runs only at startup");

    stop(shutdown, handle).await
}

#[tokio::test(start_paused = true)]
async fn reclamation_runs_at_startup_and_every_interval() -> anyhow::Result<()> {
    let rig = Rig::new();
    rig.store.insert(expired_record("old"));
    let orch = rig.orchestrator(settings());
    let shutdown = CancellationToken::new();
    let handle = spawn(&orch, &shutdown);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(listings(&rig), 1);
    assert!(rig.store.records().iter().all(|r| r.key_id != "old"));

    tokio::time::sleep(RECLAIM_EVERY * 2).await;
    assert_eq!(listings(&rig), 3);

    stop(shutdown, handle).await
}

#[tokio::test(start_paused = true)]
async fn panicking_issuance_does_not_stop_reclamation() -> anyhow::Result<()> {
    let rig = Rig::new();
    rig.provisioner.set_issue_fault(Fault::Panic);
    let orch = rig.orchestrator(settings());
    let shutdown = CancellationToken::new();
    let handle = spawn(&orch, &shutdown);

    tokio::time::sleep(ISSUE_EVERY + Duration::from_secs(1)).await;
    // catch-up and first tick both panicked; the loop kept ticking
    assert_eq!(issues(&rig), 2);
    // t = 0, 30, 60, 90
    assert_eq!(listings(&rig), 4);

    rig.provisioner.set_issue_fault(Fault::None);
    tokio::time::sleep(ISSUE_EVERY).await;
    assert_eq!(rig.channel.sent().len(), 1);

    stop(shutdown, handle).await
}

#[tokio::test(start_paused = true)]
async fn panicking_reclamation_does_not_stop_issuance() -> anyhow::Result<()> {
    let rig = Rig::new();
    rig.store.set_fault(StoreOp::ListExpired, Fault::Panic);
    let orch = rig.orchestrator(settings());
    let shutdown = CancellationToken::new();
    let handle = spawn(&orch, &shutdown);

    tokio::time::sleep(ISSUE_EVERY * 2 + Duration::from_secs(1)).await;
    assert_eq!(rig.channel.sent().len(), 3);
    // t = 0, 30, ..., 180
    assert_eq!(listings(&rig), 7);

    stop(shutdown, handle).await
}

#[tokio::test(start_paused = true)]
async fn hung_channel_is_cut_off_by_call_timeout() -> anyhow::Result<()> {
    let rig = Rig::new();
    rig.channel.set_fault(Fault::Hang);
    let orch = rig.orchestrator(settings());
    let shutdown = CancellationToken::new();
    let handle = spawn(&orch, &shutdown);

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(rig.store.records().len(), 1, "record kept after failed announcement");

    tokio::time::sleep(ISSUE_EVERY).await;
    assert_eq!(issues(&rig), 2);
    assert!(rig.channel.sent().is_empty());

    stop(shutdown, handle).await
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_both_loops() -> anyhow::Result<()> {
    let rig = Rig::new();
    let orch = rig.orchestrator(settings());
    let shutdown = CancellationToken::new();
    let handle = spawn(&orch, &shutdown);

    tokio::time::sleep(Duration::from_secs(1)).await;
    stop(shutdown, handle).await?;

    let before = rig.calls().len();
    tokio::time::sleep(ISSUE_EVERY * 5).await;
    assert_eq!(rig.calls().len(), before);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cancelling_mid_tick_lets_it_finish() -> anyhow::Result<()> {
    let rig = Rig::new();
    rig.channel.set_fault(Fault::Hang);
    let orch = rig.orchestrator(settings());
    let shutdown = CancellationToken::new();
    let handle = spawn(&orch, &shutdown);

    // Catch-up is blocked on the announcement until the 5s call timeout.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(rig.store.records().len(), 1);
    assert_eq!(rig.log.count(|c| matches!(c, Call::Send { .. })), 1);

    let cancelled_at = tokio::time::Instant::now();
    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(10), handle).await??;

    let waited = cancelled_at.elapsed();
    assert!(waited >= Duration::from_secs(4), "returned before the tick ended: {waited:?}");
    assert!(waited < Duration::from_secs(5), "waited past the tick: {waited:?}");
    assert_eq!(rig.store.records().len(), 1, "record survives cancellation");
    assert_eq!(issues(&rig), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn oversized_intervals_do_not_stop_the_loops() -> anyhow::Result<()> {
    let rig = Rig::new();
    let orch = rig.orchestrator(LifecycleSettings {
        issue_interval: Duration::MAX,
        reclaim_interval: Duration::MAX,
        validity: Duration::MAX,
        ..settings()
    });
    let shutdown = CancellationToken::new();
    let handle = spawn(&orch, &shutdown);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(issues(&rig), 1, "catch-up still runs");
    assert_eq!(listings(&rig), 1, "startup reclamation still runs");
    assert_eq!(rig.channel.sent().len(), 1);

    tokio::time::sleep(ISSUE_EVERY * 10).await;
    assert_eq!(issues(&rig), 1);
    assert_eq!(listings(&rig), 1);
    assert!(!handle.is_finished(), "loops alive");

    stop(shutdown, handle).await
}

#[tokio::test(start_paused = true)]
async fn cancelled_before_start_does_nothing() -> anyhow::Result<()> {
    let rig = Rig::new();
    let orch = rig.orchestrator(settings());
    let shutdown = CancellationToken::new();
    shutdown.cancel();

    tokio::time::timeout(Duration::from_secs(1), orch.start(shutdown)).await?;
    assert_eq!(issues(&rig), 0);
    Ok(())
}
