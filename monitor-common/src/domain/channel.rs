// This file is part of xrpl-nft-monitor.
// Copyright (C) 2025 xrpl-nft-monitor contributors
// SPDX-License-Identifier: Apache-2.0
// Licensed under the Apache License, Version 2.0 (the "License");
// You may not use this file except in compliance with the License.
// You may obtain a copy of the License at
// http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt::{self, Display},
    sync::LazyLock,
};
use thiserror::Error;
use url::Url;

static DISCORD_WEBHOOK_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://discord(app)?\.com/api/webhooks/\d+/[\w-]+$")
        .expect("Discord webhook regex is valid")
});

static EMAIL_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email address regex is valid")
});

/// A delivery channel of an alert configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationChannel {
    Discord {
        webhook_url: String,
        mentions: Option<Mentions>,
    },

    Email {
        recipients: Vec<String>,
        subject: Option<String>,
    },

    Webhook {
        url: String,

        /// Kept as the raw configured string: an unsupported method must
        /// fail delivery with an error message, not fail row decoding.
        method: String,

        headers: Option<HashMap<String, String>>,
        auth: Option<WebhookAuth>,
    },
}

impl NotificationChannel {
    pub fn kind(&self) -> ChannelKind {
        match self {
            NotificationChannel::Discord { .. } => ChannelKind::Discord,
            NotificationChannel::Email { .. } => ChannelKind::Email,
            NotificationChannel::Webhook { .. } => ChannelKind::Webhook,
        }
    }

    /// Validate this channel configuration without any network interaction.
    /// Invalid channels fail delivery permanently; the error message is
    /// surfaced to the alert owner.
    pub fn validate(&self) -> Result<(), InvalidChannelError> {
        match self {
            NotificationChannel::Discord { webhook_url, .. } => {
                if !DISCORD_WEBHOOK_URL.is_match(webhook_url) {
                    return Err(InvalidChannelError::DiscordWebhookUrl(webhook_url.clone()));
                }
                Ok(())
            }

            NotificationChannel::Email { recipients, .. } => {
                if recipients.is_empty() {
                    return Err(InvalidChannelError::NoRecipients);
                }
                for recipient in recipients {
                    if !EMAIL_ADDRESS.is_match(recipient) {
                        return Err(InvalidChannelError::EmailAddress(recipient.clone()));
                    }
                }
                Ok(())
            }

            NotificationChannel::Webhook { url, .. } => {
                let parsed =
                    Url::parse(url).map_err(|_| InvalidChannelError::WebhookUrl(url.clone()))?;
                if parsed.scheme() != "http" && parsed.scheme() != "https" {
                    return Err(InvalidChannelError::WebhookScheme(
                        parsed.scheme().to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Discord users and roles to mention in the message content.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Mentions {
    #[serde(default)]
    pub users: Vec<String>,

    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WebhookAuth {
    Bearer {
        token: String,
    },

    Basic {
        username: String,
        password: String,
    },

    ApiKey {
        header_name: String,
        token: String,
    },
}

/// The kind of a channel, used for stats and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "CHANNEL_KIND", rename_all = "snake_case")]
pub enum ChannelKind {
    Discord,
    Email,
    Webhook,
}

impl Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChannelKind::Discord => "discord",
            ChannelKind::Email => "email",
            ChannelKind::Webhook => "webhook",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidChannelError {
    #[error("invalid Discord webhook URL: {0}")]
    DiscordWebhookUrl(String),

    #[error("email channel has no recipients")]
    NoRecipients,

    #[error("invalid email address: {0}")]
    EmailAddress(String),

    #[error("invalid webhook URL: {0}")]
    WebhookUrl(String),

    #[error("unsupported webhook URL scheme: {0}")]
    WebhookScheme(String),
}

#[cfg(test)]
mod tests {
    use crate::domain::{InvalidChannelError, NotificationChannel};
    use assert_matches::assert_matches;

    #[test]
    fn test_validate_discord() {
        let channel = NotificationChannel::Discord {
            webhook_url: "https://discord.com/api/webhooks/123456/abc_DEF-ghi".to_string(),
            mentions: None,
        };
        assert_matches!(channel.validate(), Ok(()));

        let channel = NotificationChannel::Discord {
            webhook_url: "https://discordapp.com/api/webhooks/1/token".to_string(),
            mentions: None,
        };
        assert_matches!(channel.validate(), Ok(()));

        let channel = NotificationChannel::Discord {
            webhook_url: "https://example.com/api/webhooks/1/token".to_string(),
            mentions: None,
        };
        assert_matches!(
            channel.validate(),
            Err(InvalidChannelError::DiscordWebhookUrl(_))
        );
    }

    #[test]
    fn test_validate_email() {
        let channel = NotificationChannel::Email {
            recipients: vec!["alice@example.com".to_string()],
            subject: None,
        };
        assert_matches!(channel.validate(), Ok(()));

        let channel = NotificationChannel::Email {
            recipients: vec![],
            subject: None,
        };
        assert_matches!(channel.validate(), Err(InvalidChannelError::NoRecipients));

        let channel = NotificationChannel::Email {
            recipients: vec!["not an address".to_string()],
            subject: None,
        };
        assert_matches!(channel.validate(), Err(InvalidChannelError::EmailAddress(_)));
    }

    #[test]
    fn test_validate_webhook() {
        let channel = NotificationChannel::Webhook {
            url: "https://example.com/hook".to_string(),
            method: "POST".to_string(),
            headers: None,
            auth: None,
        };
        assert_matches!(channel.validate(), Ok(()));

        let channel = NotificationChannel::Webhook {
            url: "ftp://example.com/hook".to_string(),
            method: "PUT".to_string(),
            headers: None,
            auth: None,
        };
        assert_matches!(channel.validate(), Err(InvalidChannelError::WebhookScheme(_)));
    }

    #[test]
    fn test_channel_serde() {
        let json = serde_json::json!({
            "type": "webhook",
            "url": "https://example.com/hook",
            "method": "PATCH",
            "auth": { "type": "api-key", "header_name": "X-Api-Key", "token": "s3cr3t" }
        });

        let channel =
            serde_json::from_value::<NotificationChannel>(json).expect("can be deserialized");
        assert_matches!(
            channel,
            NotificationChannel::Webhook { method, .. } if method == "PATCH"
        );
    }
}
