// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: recording mocks, fixtures, and assertion helpers.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use rand::seq::IndexedRandom;
use uuid::Uuid;

use crate::channel::message::{Locale, MessageTemplate};
use crate::channel::Broadcaster;
use crate::lifecycle::{Collaborators, Inventory, LifecycleSettings, Orchestrator};
use crate::model::{AccessKey, IssuedKey, Revocation, Server};
use crate::provision::Provisioner;
use crate::store::RecordStore;

/// Destination used by [`Rig`] orchestrators.
pub const DESTINATION: &str = "@keycast_test";

/// One collaborator call, in the order it was made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Issue { server_id: Uuid },
    Revoke { key_id: String },
    EligibleServers,
    PickServer,
    Save { record_id: Uuid },
    ListExpired,
    Delete { record_id: Uuid },
    LastIssuedAt,
    Send { destination: String, text: String },
}

/// Call log shared by every mock of one [`Rig`].
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    fn push(&self, call: Call) {
        self.0.lock().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().clone()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.0.lock().iter().filter(|c| matches(c)).count()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

/// How a mocked call misbehaves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Fault {
    #[default]
    None,
    /// Return an error.
    Fail,
    /// Panic inside the call's future.
    Panic,
    /// Never complete.
    Hang,
}

#[allow(clippy::panic)]
async fn inject(fault: Fault, what: &str) -> anyhow::Result<()> {
    match fault {
        Fault::None => Ok(()),
        Fault::Fail => anyhow::bail!("injected {what} failure"),
        Fault::Panic => panic!("injected {what} panic"),
        Fault::Hang => std::future::pending().await,
    }
}

/// Provisioner that hands out sequential key ids.
pub struct MockProvisioner {
    log: CallLog,
    next_id: AtomicU32,
    issue_fault: Mutex<Fault>,
    revoke_faults: Mutex<HashMap<String, Fault>>,
    gone: Mutex<HashSet<String>>,
}

impl MockProvisioner {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            next_id: AtomicU32::new(0),
            issue_fault: Mutex::new(Fault::None),
            revoke_faults: Mutex::new(HashMap::new()),
            gone: Mutex::new(HashSet::new()),
        }
    }

    pub fn set_issue_fault(&self, fault: Fault) {
        *self.issue_fault.lock() = fault;
    }

    pub fn set_revoke_fault(&self, key_id: &str, fault: Fault) {
        self.revoke_faults.lock().insert(key_id.to_owned(), fault);
    }

    /// Make revocations of `key_id` answer `AlreadyGone`.
    pub fn mark_gone(&self, key_id: &str) {
        self.gone.lock().insert(key_id.to_owned());
    }
}

impl Provisioner for MockProvisioner {
    fn issue<'a>(&'a self, server: &'a Server) -> BoxFuture<'a, anyhow::Result<IssuedKey>> {
        Box::pin(async move {
            self.log.push(Call::Issue { server_id: server.id });
            let fault = *self.issue_fault.lock();
            inject(fault, "issue").await?;
            let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
            Ok(IssuedKey {
                key_id: n.to_string(),
                access_url: format!("ss://secret-{n}@{}:4242/?outline=1", server.address),
                management_url: format!("https://{}:{}/{}", server.address, server.port, server.api_key),
            })
        })
    }

    fn revoke<'a>(
        &'a self,
        _management_url: &'a str,
        key_id: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<Revocation>> {
        Box::pin(async move {
            self.log.push(Call::Revoke { key_id: key_id.to_owned() });
            let fault = self.revoke_faults.lock().get(key_id).copied().unwrap_or_default();
            inject(fault, "revoke").await?;
            if self.gone.lock().contains(key_id) {
                Ok(Revocation::AlreadyGone)
            } else {
                Ok(Revocation::Revoked)
            }
        })
    }
}

/// Store operation a [`Fault`] can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    EligibleServers,
    PickServer,
    Save,
    ListExpired,
    Delete,
    LastIssuedAt,
}

/// In-memory record store.
pub struct MockStore {
    log: CallLog,
    servers: Mutex<Vec<Server>>,
    records: Mutex<Vec<AccessKey>>,
    faults: Mutex<HashMap<StoreOp, Fault>>,
}

impl MockStore {
    pub fn new(log: CallLog, servers: Vec<Server>) -> Self {
        Self {
            log,
            servers: Mutex::new(servers),
            records: Mutex::new(Vec::new()),
            faults: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_fault(&self, op: StoreOp, fault: Fault) {
        self.faults.lock().insert(op, fault);
    }

    pub fn set_servers(&self, servers: Vec<Server>) {
        *self.servers.lock() = servers;
    }

    pub fn servers(&self) -> Vec<Server> {
        self.servers.lock().clone()
    }

    pub fn insert(&self, record: AccessKey) {
        self.records.lock().push(record);
    }

    pub fn records(&self) -> Vec<AccessKey> {
        self.records.lock().clone()
    }

    fn fault(&self, op: StoreOp) -> Fault {
        self.faults.lock().get(&op).copied().unwrap_or_default()
    }
}

impl RecordStore for MockStore {
    fn eligible_servers(&self) -> BoxFuture<'_, anyhow::Result<Vec<Server>>> {
        Box::pin(async move {
            self.log.push(Call::EligibleServers);
            inject(self.fault(StoreOp::EligibleServers), "eligible servers").await?;
            Ok(self.servers.lock().iter().filter(|s| s.active).cloned().collect())
        })
    }

    fn pick_eligible_server(&self) -> BoxFuture<'_, anyhow::Result<Option<Server>>> {
        Box::pin(async move {
            self.log.push(Call::PickServer);
            inject(self.fault(StoreOp::PickServer), "pick server").await?;
            let active: Vec<Server> =
                self.servers.lock().iter().filter(|s| s.active).cloned().collect();
            Ok(active.choose(&mut rand::rng()).cloned())
        })
    }

    fn save<'a>(&'a self, key: &'a AccessKey) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.log.push(Call::Save { record_id: key.id });
            inject(self.fault(StoreOp::Save), "save").await?;
            self.records.lock().push(key.clone());
            Ok(())
        })
    }

    fn list_expired(&self, now: DateTime<Utc>) -> BoxFuture<'_, anyhow::Result<Vec<AccessKey>>> {
        Box::pin(async move {
            self.log.push(Call::ListExpired);
            inject(self.fault(StoreOp::ListExpired), "list expired").await?;
            Ok(self.records.lock().iter().filter(|r| r.expired_at < now).cloned().collect())
        })
    }

    fn delete(&self, id: Uuid) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.log.push(Call::Delete { record_id: id });
            inject(self.fault(StoreOp::Delete), "delete").await?;
            self.records.lock().retain(|r| r.id != id);
            Ok(())
        })
    }

    fn last_issued_at(&self) -> BoxFuture<'_, anyhow::Result<Option<DateTime<Utc>>>> {
        Box::pin(async move {
            self.log.push(Call::LastIssuedAt);
            inject(self.fault(StoreOp::LastIssuedAt), "last issued at").await?;
            Ok(self.records.lock().iter().map(|r| r.created_at).max())
        })
    }
}

/// Broadcaster that records every message.
pub struct MockChannel {
    log: CallLog,
    fault: Mutex<Fault>,
    sent: Mutex<Vec<String>>,
}

impl MockChannel {
    pub fn new(log: CallLog) -> Self {
        Self { log, fault: Mutex::new(Fault::None), sent: Mutex::new(Vec::new()) }
    }

    pub fn set_fault(&self, fault: Fault) {
        *self.fault.lock() = fault;
    }

    /// Texts that were delivered successfully.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

impl Broadcaster for MockChannel {
    fn send<'a>(&'a self, destination: &'a str, text: &'a str) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.log.push(Call::Send { destination: destination.to_owned(), text: text.to_owned() });
            let fault = *self.fault.lock();
            inject(fault, "send").await?;
            self.sent.lock().push(text.to_owned());
            Ok(())
        })
    }
}

/// The three mocks wired to one call log.
pub struct Rig {
    pub log: CallLog,
    pub provisioner: Arc<MockProvisioner>,
    pub store: Arc<MockStore>,
    pub channel: Arc<MockChannel>,
}

impl Default for Rig {
    fn default() -> Self {
        Self::new()
    }
}

impl Rig {
    /// A rig with one active server.
    pub fn new() -> Self {
        Self::with_servers(vec![server(1)])
    }

    pub fn with_servers(servers: Vec<Server>) -> Self {
        let log = CallLog::default();
        Self {
            provisioner: Arc::new(MockProvisioner::new(log.clone())),
            store: Arc::new(MockStore::new(log.clone(), servers)),
            channel: Arc::new(MockChannel::new(log.clone())),
            log,
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            provisioner: Arc::clone(&self.provisioner) as Arc<dyn Provisioner>,
            store: Arc::clone(&self.store) as Arc<dyn RecordStore>,
            channel: Arc::clone(&self.channel) as Arc<dyn Broadcaster>,
        }
    }

    /// Orchestrator over a snapshot of the rig's servers.
    pub fn orchestrator(&self, settings: LifecycleSettings) -> Arc<Orchestrator> {
        self.orchestrator_with(Inventory::snapshot(self.store.servers()), settings)
    }

    pub fn orchestrator_with(
        &self,
        inventory: Inventory,
        settings: LifecycleSettings,
    ) -> Arc<Orchestrator> {
        Orchestrator::new(
            self.collaborators(),
            inventory,
            DESTINATION,
            MessageTemplate::new(Locale::En),
            settings,
        )
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.calls()
    }
}

/// Active server number `n`.
pub fn server(n: u8) -> Server {
    Server {
        id: Uuid::from_u128(u128::from(n)),
        address: format!("10.0.0.{n}"),
        port: 8081,
        api_key: format!("api{n}"),
        active: true,
    }
}

/// A record for `key_id` created at `created_at` with the given validity.
pub fn record(key_id: &str, created_at: DateTime<Utc>, validity: Duration) -> AccessKey {
    AccessKey::issued(
        IssuedKey {
            key_id: key_id.to_owned(),
            access_url: format!("ss://secret-{key_id}@10.0.0.1:4242/?outline=1"),
            management_url: "https://10.0.0.1:8081/api1".to_owned(),
        },
        Some(server(1).id),
        created_at,
        validity,
    )
}

/// A 48-hour record that expired two hours ago.
pub fn expired_record(key_id: &str) -> AccessKey {
    record(key_id, Utc::now() - chrono::Duration::hours(50), Duration::from_secs(48 * 3600))
}

/// A 48-hour record created just now.
pub fn fresh_record(key_id: &str) -> AccessKey {
    record(key_id, Utc::now(), Duration::from_secs(48 * 3600))
}

/// Assert that an expression evaluates to `Err` whose Display output
/// contains the given substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
