// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Announcement text for newly issued keys.
//!
//! Output is Telegram HTML (`parse_mode = "HTML"`). Only `<b>` and `<code>`
//! are emitted; every interpolated value except the operator footer is escaped.

use serde::{Deserialize, Serialize};

use crate::model::AccessKey;

/// Language of the announcement text.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Ru,
    En,
}

impl Locale {
    fn default_location(&self) -> &'static str {
        match self {
            Self::Ru => "Европа",
            Self::En => "Europe",
        }
    }
}

impl std::fmt::Display for Locale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ru => f.write_str("ru"),
            Self::En => f.write_str("en"),
        }
    }
}

impl std::str::FromStr for Locale {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ru" => Ok(Self::Ru),
            "en" => Ok(Self::En),
            other => anyhow::bail!("unsupported locale: {other}"),
        }
    }
}

/// Constant announcement template. Rendering is pure.
#[derive(Debug, Clone)]
pub struct MessageTemplate {
    locale: Locale,
    location: String,
    instructions_url: Option<String>,
    footer: Option<String>,
}

impl MessageTemplate {
    pub fn new(locale: Locale) -> Self {
        Self {
            locale,
            location: locale.default_location().to_owned(),
            instructions_url: None,
            footer: None,
        }
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn instructions_url(mut self, url: Option<String>) -> Self {
        self.instructions_url = url;
        self
    }

    pub fn footer(mut self, footer: Option<String>) -> Self {
        self.footer = footer;
        self
    }

    /// Render the announcement for `key`.
    pub fn render(&self, key: &AccessKey) -> String {
        let hours = (key.expired_at - key.created_at).num_hours();
        let location = escape_html(&self.location);

        let mut lines = match self.locale {
            Locale::Ru => vec![
                format!("🔑 Новый ключ на <b>{hours} {}</b>", ru_hours(hours)),
                format!("⏳ Действует до: <b>{}</b>", key.expired_at.format("%d.%m.%Y %H:%M UTC")),
                format!("🌍 Локация: <b>{location}</b>"),
            ],
            Locale::En => vec![
                format!("🔑 New key for <b>{hours} {}</b>", if hours == 1 { "hour" } else { "hours" }),
                format!("⏳ Valid until: <b>{}</b>", key.expired_at.format("%Y-%m-%d %H:%M UTC")),
                format!("🌍 Location: <b>{location}</b>"),
            ],
        };

        if let Some(ref url) = self.instructions_url {
            let label = match self.locale {
                Locale::Ru => "Инструкция",
                Locale::En => "Instructions",
            };
            lines.push(format!("💡 {label} - {}", escape_html(url)));
        }

        lines.push(String::new());
        lines.push(format!("<code>{}</code>", escape_html(&key.access_url)));

        if let Some(ref footer) = self.footer {
            lines.push(String::new());
            lines.push(footer.clone());
        }

        lines.join("\n")
    }
}

/// Russian plural form of "hour" for `n`.
fn ru_hours(n: i64) -> &'static str {
    let n = n.abs();
    match (n % 10, n % 100) {
        (_, 11..=14) => "часов",
        (1, _) => "час",
        (2..=4, _) => "часа",
        _ => "часов",
    }
}

/// Escape text for Telegram HTML.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
