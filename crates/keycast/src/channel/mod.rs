// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broadcast channel: delivers announcement text to a fixed destination.

pub mod message;
pub mod telegram;

use futures_util::future::BoxFuture;

/// Delivers a formatted message to a destination.
///
/// Object-safe for use as `Arc<dyn Broadcaster>`.
pub trait Broadcaster: Send + Sync {
    fn send<'a>(&'a self, destination: &'a str, text: &'a str) -> BoxFuture<'a, anyhow::Result<()>>;
}
