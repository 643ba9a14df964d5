// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process bootstrap, shared by `main` and integration tests.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::channel::message::MessageTemplate;
use crate::channel::telegram::TelegramChannel;
use crate::config::{Config, InventoryMode};
use crate::lifecycle::{Collaborators, Inventory, LifecycleSettings, Orchestrator};
use crate::provision::outline::OutlineClient;
use crate::retry::{with_backoff, Backoff};
use crate::store::postgres::PgStore;
use crate::store::RecordStore;

/// A fully wired service ready to run.
///
/// Returned by [`prepare`] so callers can reach the orchestrator and the
/// shutdown token before the loops start.
pub struct PreparedService {
    pub orchestrator: Arc<Orchestrator>,
    pub shutdown: CancellationToken,
    store: PgStore,
}

impl PreparedService {
    /// Run both lifecycle loops until shutdown, then close the pool.
    pub async fn run(self) -> anyhow::Result<()> {
        self.orchestrator.start(self.shutdown.clone()).await;
        self.store.close().await;
        info!("record store closed");
        Ok(())
    }
}

/// Run the service until SIGINT or SIGTERM.
pub async fn run(config: Config) -> anyhow::Result<()> {
    prepare(config).await?.run().await
}

/// Initialize tracing/logging from config.
///
/// Uses `try_init` so it's safe to call multiple times (e.g. from tests).
pub fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}

/// Install the process-wide rustls crypto provider.
///
/// Must run before any HTTP client is built. Repeated calls are no-ops.
pub fn install_crypto_provider() {
    drop(rustls::crypto::ring::default_provider().install_default());
}

/// Load the eligible servers and build the inventory for `mode`.
///
/// An empty inventory is an error in both modes.
pub async fn load_inventory(
    store: &dyn RecordStore,
    mode: InventoryMode,
    policy: Backoff,
) -> anyhow::Result<Inventory> {
    let servers = with_backoff("load server inventory", policy, || store.eligible_servers()).await?;
    if servers.is_empty() {
        anyhow::bail!("no eligible servers in inventory");
    }
    info!(servers = servers.len(), %mode, "server inventory loaded");

    Ok(match mode {
        InventoryMode::Snapshot => Inventory::snapshot(servers),
        InventoryMode::Live => Inventory::Live,
    })
}

/// Connect collaborators and build the orchestrator.
pub async fn prepare(config: Config) -> anyhow::Result<PreparedService> {
    install_crypto_provider();

    let settings = LifecycleSettings::from_config(&config)?;
    let destination = config.destination()?;
    let mode = config.inventory_mode()?;
    let policy = Backoff::new(config.startup_retries);

    let store = with_backoff("connect record store", policy, || {
        PgStore::connect(&config.dsn, config.max_connections, settings.call_timeout)
    })
    .await?;
    info!(max_connections = config.max_connections, "record store connected");

    if config.migrate {
        store.migrate().await?;
        info!("schema migrations applied");
    }

    let inventory = load_inventory(&store, mode, policy).await?;

    if settings.reclaim_interval > settings.issue_interval {
        warn!(
            issue_every = ?settings.issue_interval,
            reclaim_every = ?settings.reclaim_interval,
            "reclaim interval is longer than issue interval; expired keys will pile up"
        );
    }

    let mut template = MessageTemplate::new(config.locale()?)
        .instructions_url(config.instructions_url.clone())
        .footer(config.footer.clone());
    if let Some(ref location) = config.location {
        template = template.location(location.clone());
    }

    let collaborators = Collaborators {
        provisioner: Arc::new(OutlineClient::new(settings.call_timeout, config.verify_tls)),
        store: Arc::new(store.clone()),
        channel: Arc::new(TelegramChannel::new(
            config.telegram_api_url.clone(),
            config.token.clone(),
            settings.call_timeout,
        )),
    };
    let orchestrator = Orchestrator::new(collaborators, inventory, destination, template, settings);

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    Ok(PreparedService { orchestrator, shutdown, store })
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGTERM");
                shutdown.cancel();
            }
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGINT");
                shutdown.cancel();
            }
            _ = shutdown.cancelled() => {}
        }
    });
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
