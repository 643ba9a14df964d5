// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential provisioning against a server's management endpoint.

pub mod outline;

use futures_util::future::BoxFuture;

use crate::model::{IssuedKey, Revocation, Server};

/// Issues and revokes single credentials on remote servers.
///
/// Object-safe for use as `Arc<dyn Provisioner>`.
pub trait Provisioner: Send + Sync {
    fn issue<'a>(&'a self, server: &'a Server) -> BoxFuture<'a, anyhow::Result<IssuedKey>>;

    fn revoke<'a>(
        &'a self,
        management_url: &'a str,
        key_id: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<Revocation>>;
}
