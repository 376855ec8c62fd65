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

use crate::domain::{NotificationPayload, activity_color, activity_emoji};
use monitor_common::domain::Mentions;
use serde_json::{Value, json};

/// Discord limits: at most 25 embed fields, description at most 4096 chars.
const MAX_EMBED_FIELDS: usize = 25;
const MAX_EMBED_DESCRIPTION: usize = 4096;

/// NFT descriptions are truncated beyond this length.
const MAX_NFT_DESCRIPTION: usize = 200;

/// Build the Discord webhook message (embed plus optional mention content)
/// for a payload.
pub fn build_discord_message(payload: &NotificationPayload, mentions: Option<&Mentions>) -> Value {
    let activity = &payload.activity;

    let title = format!(
        "{} {}",
        activity_emoji(activity.activity_type),
        activity.activity_type.to_string().to_uppercase()
    );

    let mut fields = Vec::new();

    if let Some(from) = &activity.from_address {
        fields.push(json!({ "name": "From", "value": format!("`{from}`"), "inline": true }));
    }
    if let Some(to) = &activity.to_address {
        fields.push(json!({ "name": "To", "value": format!("`{to}`"), "inline": true }));
    }
    if let Some(price) = activity.price_display() {
        fields.push(json!({ "name": "Price", "value": price, "inline": true }));
    }

    let mut description = String::new();
    if let Some(nft) = &payload.nft {
        fields.push(json!({ "name": "NFT", "value": nft.display_name(), "inline": false }));

        if let Some(nft_description) = &nft.description {
            description = truncate(nft_description, MAX_NFT_DESCRIPTION);
        }
    }
    fields.push(json!({
        "name": "Transaction",
        "value": format!("`{}`", activity.transaction_hash),
        "inline": false
    }));
    fields.truncate(MAX_EMBED_FIELDS);

    let mut embed = json!({
        "title": title,
        "color": activity_color(activity.activity_type),
        "fields": fields,
        "footer": { "text": format!("Alert: {}", payload.alert_name) },
    });

    if !description.is_empty() {
        embed["description"] = json!(truncate(&description, MAX_EMBED_DESCRIPTION));
    }

    if let Some(thumbnail) = payload.nft.as_ref().and_then(|nft| nft.image_url.as_deref()) {
        embed["thumbnail"] = json!({ "url": thumbnail });
    }

    let mut message = json!({ "embeds": [embed] });

    if let Some(content) = mention_content(mentions) {
        message["content"] = json!(content);
    }

    message
}

fn mention_content(mentions: Option<&Mentions>) -> Option<String> {
    let mentions = mentions?;

    let parts = mentions
        .users
        .iter()
        .map(|user| format!("<@{user}>"))
        .chain(mentions.roles.iter().map(|role| format!("<@&{role}>")))
        .collect::<Vec<_>>();

    (!parts.is_empty()).then(|| parts.join(" "))
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }

    let truncated = s.chars().take(max_chars.saturating_sub(1)).collect::<String>();
    format!("{truncated}…")
}

#[cfg(test)]
mod tests {
    use crate::domain::{
        NotificationPayload, PayloadActivity, PayloadNft, build_discord_message,
        discord::truncate,
    };
    use bigdecimal::BigDecimal;
    use monitor_common::domain::{ActivityType, Mentions, NotificationChannel};
    use std::str::FromStr;
    use uuid::Uuid;

    fn payload() -> NotificationPayload {
        NotificationPayload {
            notification_id: 1,
            user_id: "user-1".to_string(),
            alert_config_id: Uuid::from_u128(1),
            alert_name: "big sales".to_string(),
            channel: NotificationChannel::Discord {
                webhook_url: "https://discord.com/api/webhooks/1/token".to_string(),
                mentions: None,
            },
            retry_count: 0,
            activity: PayloadActivity {
                activity_type: ActivityType::Sale,
                transaction_hash: "AB".repeat(32),
                ledger_index: 100,
                from_address: Some("rSeller111111111111111111111111111".to_string()),
                to_address: Some("rBuyer1111111111111111111111111111".to_string()),
                price_drops: Some(BigDecimal::from_str("1500000000000").unwrap()),
                currency: Some("XRP".to_string()),
                issuer: None,
                timestamp: 1_672_531_200_000,
            },
            nft: Some(PayloadNft {
                nft_id: "00".repeat(32),
                name: Some("Dragon #1".to_string()),
                description: Some("d".repeat(500)),
                image_url: Some("https://cdn.example.com/dragon.png".to_string()),
                collection_name: Some("Dragons".to_string()),
            }),
        }
    }

    #[test]
    fn test_build_discord_message() {
        let message = build_discord_message(&payload(), None);
        let embed = &message["embeds"][0];

        assert_eq!(embed["title"], "💰 SALE");
        assert_eq!(embed["color"], 0xF1C40F);
        assert_eq!(embed["thumbnail"]["url"], "https://cdn.example.com/dragon.png");

        let fields = embed["fields"].as_array().unwrap();
        assert!(fields.len() <= 25);

        let price = fields
            .iter()
            .find(|field| field["name"] == "Price")
            .expect("price field present");
        assert_eq!(price["value"], "1500000.000000 XRP");

        let from = fields
            .iter()
            .find(|field| field["name"] == "From")
            .expect("from field present");
        assert_eq!(from["value"], "`rSeller111111111111111111111111111`");

        // The 500-char description is truncated.
        let description = embed["description"].as_str().unwrap();
        assert_eq!(description.chars().count(), 200);
        assert!(description.ends_with('…'));
    }

    #[test]
    fn test_mentions() {
        let mentions = Mentions {
            users: vec!["42".to_string()],
            roles: vec!["99".to_string()],
        };

        let message = build_discord_message(&payload(), Some(&mentions));
        assert_eq!(message["content"], "<@42> <@&99>");

        let message = build_discord_message(&payload(), None);
        assert!(message.get("content").is_none());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 200), "short");
        assert_eq!(truncate(&"x".repeat(300), 200).chars().count(), 200);
    }
}
