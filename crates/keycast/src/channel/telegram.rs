// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Telegram Bot API client for channel announcements.

use std::time::Duration;

use futures_util::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::channel::Broadcaster;

/// `sendMessage` request body.
#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

/// Envelope of every Bot API response.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Bot API client bound to one bot token.
pub struct TelegramChannel {
    api_url: String,
    token: String,
    client: Client,
}

impl TelegramChannel {
    pub fn new(api_url: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_default();
        let api_url = api_url.into().trim_end_matches('/').to_owned();
        Self { api_url, token: token.into(), client }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }

    /// Post `text` to `chat_id` as HTML.
    pub async fn send_message(&self, chat_id: &str, text: &str) -> anyhow::Result<()> {
        let body = SendMessage { chat_id, text, parse_mode: "HTML", disable_web_page_preview: true };
        // The URL carries the bot token; keep it out of error chains.
        let resp = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("sendMessage request failed: {}", e.without_url()))?;

        let status = resp.status();
        let bytes = resp.bytes().await.map_err(|e| anyhow::anyhow!("{}", e.without_url()))?;
        let parsed: Option<ApiResponse> = serde_json::from_slice(&bytes).ok();

        match parsed {
            Some(api) if status.is_success() && api.ok => Ok(()),
            Some(api) => {
                let reason = api.description.unwrap_or_else(|| "no description".to_owned());
                anyhow::bail!("sendMessage rejected ({status}): {reason}")
            }
            None => anyhow::bail!("sendMessage failed ({status}): unreadable response body"),
        }
    }
}

impl Broadcaster for TelegramChannel {
    fn send<'a>(&'a self, destination: &'a str, text: &'a str) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(self.send_message(destination, text))
    }
}
