// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outline-style management API client.
//!
//! Every URL starts with the server's management secret:
//! `https://{address}:{port}/{api_key}/access-keys`.

use std::time::Duration;

use futures_util::future::BoxFuture;
use rand::distr::Alphanumeric;
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::model::{IssuedKey, Revocation, Server};
use crate::provision::Provisioner;

/// Cipher requested for every new key.
pub const CIPHER: &str = "chacha20-ietf-poly1305";

/// Per-key data limit: effectively unlimited (1 PiB).
pub const DATA_LIMIT_BYTES: u64 = 1024 * 1024 * 1024 * 1024 * 1024;

const PASSWORD_LEN: usize = 10;

/// `POST /access-keys` request body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateKeyRequest {
    pub name: String,
    pub method: String,
    pub password: String,
    pub port: u16,
    pub limit: DataLimit,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataLimit {
    pub bytes: u64,
}

/// `POST /access-keys` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateKeyResponse {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub method: Option<String>,
    pub access_url: String,
}

impl CreateKeyRequest {
    /// A request with a random guest name, password and port.
    pub fn random() -> Self {
        let mut rng = rand::rng();
        let name = format!("guest-{:04x}", rng.random::<u16>());
        let password: String =
            (&mut rng).sample_iter(&Alphanumeric).take(PASSWORD_LEN).map(char::from).collect();
        let port = rng.random_range(1024..60000);
        Self {
            name,
            method: CIPHER.to_owned(),
            password,
            port,
            limit: DataLimit { bytes: DATA_LIMIT_BYTES },
        }
    }
}

/// HTTP client for Outline management endpoints.
pub struct OutlineClient {
    scheme: &'static str,
    client: Client,
}

impl OutlineClient {
    /// Build a client. Management endpoints ship self-signed certificates, so
    /// verification is off unless `verify_tls` is set.
    pub fn new(timeout: Duration, verify_tls: bool) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(!verify_tls)
            .build()
            .unwrap_or_default();
        Self { scheme: "https", client }
    }

    /// Talk plain HTTP instead of HTTPS (local fixtures).
    pub fn plain_http(mut self) -> Self {
        self.scheme = "http";
        self
    }

    /// Management base URL for `server`.
    pub fn management_url(&self, server: &Server) -> String {
        format!("{}://{}:{}/{}", self.scheme, server.address, server.port, server.api_key)
    }

    /// Create a key on `server`.
    pub async fn create_key(&self, server: &Server) -> anyhow::Result<IssuedKey> {
        let management_url = self.management_url(server);
        let body = CreateKeyRequest::random();

        tracing::debug!(server_id = %server.id, "creating access key");
        // Management URLs embed the server secret; strip them from errors.
        let resp = self
            .client
            .post(format!("{management_url}/access-keys"))
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("create key request failed: {}", e.without_url()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("create key failed ({status}): {text}");
        }

        let created: CreateKeyResponse = resp
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("invalid create key response: {}", e.without_url()))?;
        if created.access_url.is_empty() {
            anyhow::bail!("create key response has no accessUrl");
        }

        Ok(IssuedKey { key_id: created.id, access_url: created.access_url, management_url })
    }

    /// Delete key `key_id` under `management_url`.
    pub async fn delete_key(
        &self,
        management_url: &str,
        key_id: &str,
    ) -> anyhow::Result<Revocation> {
        let url = format!("{}/access-keys/{}", management_url.trim_end_matches('/'), key_id);
        let resp = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("delete key request failed: {}", e.without_url()))?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(Revocation::AlreadyGone),
            status if status.is_success() => Ok(Revocation::Revoked),
            status => {
                let text = resp.text().await.unwrap_or_default();
                anyhow::bail!("delete key {key_id} failed ({status}): {text}")
            }
        }
    }
}

impl Provisioner for OutlineClient {
    fn issue<'a>(&'a self, server: &'a Server) -> BoxFuture<'a, anyhow::Result<IssuedKey>> {
        Box::pin(self.create_key(server))
    }

    fn revoke<'a>(
        &'a self,
        management_url: &'a str,
        key_id: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<Revocation>> {
        Box::pin(self.delete_key(management_url, key_id))
    }
}
