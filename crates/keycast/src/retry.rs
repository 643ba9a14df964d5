// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup retries with exponential backoff.
//!
//! Only bootstrap uses this. Lifecycle ticks never retry within a tick.

use std::future::Future;
use std::time::Duration;

/// Backoff schedule for [`with_backoff`].
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub max_retries: u32,
    pub initial: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries, initial: Duration::from_secs(1), max: Duration::from_secs(30) }
    }
}

/// Run `op` until it succeeds or `policy.max_retries` retries are exhausted.
pub async fn with_backoff<T, F, Fut>(label: &str, policy: Backoff, mut op: F) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut delay = policy.initial;

    for attempt in 0..=policy.max_retries {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempt == policy.max_retries {
                    return Err(e.context(format!("{label}: gave up after {} attempts", attempt + 1)));
                }
                tracing::warn!(attempt, err = %e, "{label} failed, retrying in {delay:?}");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(policy.max);
            }
        }
    }

    anyhow::bail!("{label}: exhausted all retries")
}
