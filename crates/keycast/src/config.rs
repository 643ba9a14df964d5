// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::channel::message::Locale;

/// Upper bound for loop intervals and key validity.
pub const MAX_PERIOD: Duration = Duration::from_secs(366 * 24 * 3600);

/// Where the issuance loop picks its server from.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InventoryMode {
    /// Eligible servers are read once at startup.
    #[default]
    Snapshot,
    /// The store picks a random eligible server every cycle.
    Live,
}

impl std::fmt::Display for InventoryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Snapshot => f.write_str("snapshot"),
            Self::Live => f.write_str("live"),
        }
    }
}

impl std::str::FromStr for InventoryMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "snapshot" => Ok(Self::Snapshot),
            "live" => Ok(Self::Live),
            other => anyhow::bail!("invalid inventory mode: {other}"),
        }
    }
}

/// What an issuance cycle does when the record cannot be saved after the
/// credential was provisioned.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistFailurePolicy {
    /// Announce the credential anyway and log the unrecorded key.
    #[default]
    Announce,
    /// Revoke the credential right away and stay silent for this cycle.
    Revoke,
}

impl std::fmt::Display for PersistFailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Announce => f.write_str("announce"),
            Self::Revoke => f.write_str("revoke"),
        }
    }
}

impl std::str::FromStr for PersistFailurePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "announce" => Ok(Self::Announce),
            "revoke" => Ok(Self::Revoke),
            other => anyhow::bail!("invalid persist failure policy: {other}"),
        }
    }
}

/// Keycast: time-limited access key issuer for a broadcast channel.
#[derive(Debug, Clone, Parser)]
#[command(name = "keycast", version, about)]
pub struct Config {
    /// PostgreSQL connection string.
    #[arg(long, env = "DSN", default_value = "", hide_env_values = true)]
    pub dsn: String,

    /// Telegram bot token.
    #[arg(long, env = "TOKEN", default_value = "", hide_env_values = true)]
    pub token: String,

    /// Destination chat: numeric id (channels are negative) or `@channel` name.
    #[arg(long, env = "CHANNEL_ID", default_value = "", allow_hyphen_values = true)]
    pub channel_id: String,

    /// Telegram Bot API base URL.
    #[arg(long, env = "KEYCAST_TELEGRAM_API_URL", default_value = "https://api.telegram.org")]
    pub telegram_api_url: String,

    /// Seconds between issuance cycles.
    #[arg(long, env = "KEYCAST_ISSUE_INTERVAL_SECS", default_value_t = 86400)]
    pub issue_interval_secs: u64,

    /// Seconds between reclamation cycles.
    #[arg(long, env = "KEYCAST_RECLAIM_INTERVAL_SECS", default_value_t = 18000)]
    pub reclaim_interval_secs: u64,

    /// Lifetime of an issued key in hours.
    #[arg(long, env = "KEYCAST_VALIDITY_HOURS", default_value_t = 48)]
    pub validity_hours: u64,

    /// Upper bound for any single collaborator call, in seconds.
    #[arg(long, env = "KEYCAST_CALL_TIMEOUT_SECS", default_value_t = 30)]
    pub call_timeout_secs: u64,

    /// Server selection: snapshot or live.
    #[arg(long, env = "KEYCAST_INVENTORY", default_value = "snapshot")]
    pub inventory: String,

    /// Behavior when a provisioned key cannot be recorded: announce or revoke.
    #[arg(long, env = "KEYCAST_ON_PERSIST_FAILURE", default_value = "announce")]
    pub on_persist_failure: String,

    /// Message language: ru or en.
    #[arg(long, env = "KEYCAST_LOCALE", default_value = "ru")]
    pub locale: String,

    /// Location label shown in announcements (defaults to the locale's "Europe").
    #[arg(long, env = "KEYCAST_LOCATION")]
    pub location: Option<String>,

    /// Setup instructions link shown in announcements.
    #[arg(long, env = "KEYCAST_INSTRUCTIONS_URL")]
    pub instructions_url: Option<String>,

    /// Trailing text appended to announcements (HTML allowed).
    #[arg(long, env = "KEYCAST_FOOTER")]
    pub footer: Option<String>,

    /// Verify management endpoint certificates (they are usually self-signed).
    #[arg(long, env = "KEYCAST_VERIFY_TLS")]
    pub verify_tls: bool,

    /// Apply embedded schema migrations before starting.
    #[arg(long, env = "KEYCAST_MIGRATE")]
    pub migrate: bool,

    /// Maximum pooled database connections.
    #[arg(long, env = "KEYCAST_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,

    /// Retries for store connection and inventory load at startup.
    #[arg(long, env = "KEYCAST_STARTUP_RETRIES", default_value_t = 5)]
    pub startup_retries: u32,

    /// Log format (json or text).
    #[arg(long, env = "KEYCAST_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "KEYCAST_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.dsn.trim().is_empty() {
            anyhow::bail!("empty dsn: set --dsn or DSN");
        }
        if self.token.trim().is_empty() {
            anyhow::bail!("empty token: set --token or TOKEN");
        }
        self.destination()?;

        if self.issue_interval_secs == 0 {
            anyhow::bail!("--issue-interval-secs must be positive");
        }
        if self.reclaim_interval_secs == 0 {
            anyhow::bail!("--reclaim-interval-secs must be positive");
        }
        if self.validity_hours == 0 {
            anyhow::bail!("--validity-hours must be positive");
        }
        if self.call_timeout_secs == 0 {
            anyhow::bail!("--call-timeout-secs must be positive");
        }
        if self.issue_interval() > MAX_PERIOD {
            anyhow::bail!("--issue-interval-secs exceeds {} seconds", MAX_PERIOD.as_secs());
        }
        if self.reclaim_interval() > MAX_PERIOD {
            anyhow::bail!("--reclaim-interval-secs exceeds {} seconds", MAX_PERIOD.as_secs());
        }
        if self.validity() > MAX_PERIOD {
            anyhow::bail!("--validity-hours exceeds {} hours", MAX_PERIOD.as_secs() / 3600);
        }

        self.inventory_mode()?;
        self.persist_failure_policy()?;
        self.locale()?;

        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other}"),
        }

        Ok(())
    }

    /// The chat destination, trimmed. Numeric ids and `@name` handles are accepted.
    pub fn destination(&self) -> anyhow::Result<String> {
        let dest = self.channel_id.trim();
        if dest.is_empty() {
            anyhow::bail!("empty channel id: set --channel-id or CHANNEL_ID");
        }
        if dest.starts_with('@') {
            if dest.len() == 1 {
                anyhow::bail!("invalid channel id: {dest}");
            }
            return Ok(dest.to_owned());
        }
        dest.parse::<i64>().map_err(|_| anyhow::anyhow!("invalid channel id: {dest}"))?;
        Ok(dest.to_owned())
    }

    pub fn inventory_mode(&self) -> anyhow::Result<InventoryMode> {
        self.inventory.parse()
    }

    pub fn persist_failure_policy(&self) -> anyhow::Result<PersistFailurePolicy> {
        self.on_persist_failure.parse()
    }

    pub fn locale(&self) -> anyhow::Result<Locale> {
        self.locale.parse()
    }

    pub fn issue_interval(&self) -> Duration {
        Duration::from_secs(self.issue_interval_secs)
    }

    pub fn reclaim_interval(&self) -> Duration {
        Duration::from_secs(self.reclaim_interval_secs)
    }

    pub fn validity(&self) -> Duration {
        Duration::from_secs(self.validity_hours.saturating_mul(3600))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
