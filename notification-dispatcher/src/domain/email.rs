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

use crate::domain::NotificationPayload;

/// A rendered email with HTML and plain-text alternatives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Render the email for a payload. A configured subject wins over the
/// default `🚨 <TYPE> Alert: <name>`.
pub fn build_email_message(
    payload: &NotificationPayload,
    configured_subject: Option<&str>,
) -> EmailMessage {
    let activity = &payload.activity;
    let activity_type = activity.activity_type.to_string().to_uppercase();

    let nft_name = payload
        .nft
        .as_ref()
        .map(|nft| nft.display_name().to_string())
        .unwrap_or_else(|| "NFT".to_string());

    let subject = configured_subject
        .map(str::to_string)
        .unwrap_or_else(|| format!("🚨 {activity_type} Alert: {nft_name}"));

    let price_line = activity
        .price_display()
        .map(|price| format!("Price: {price}\n"))
        .unwrap_or_default();
    let from_line = activity
        .from_address
        .as_deref()
        .map(|from| format!("From: {from}\n"))
        .unwrap_or_default();
    let to_line = activity
        .to_address
        .as_deref()
        .map(|to| format!("To: {to}\n"))
        .unwrap_or_default();

    let text = format!(
        "{activity_type} activity for {nft_name}\n\n\
         {price_line}{from_line}{to_line}\
         Transaction: {hash}\n\
         Ledger: {ledger}\n\n\
         Triggered by alert: {alert}\n",
        hash = activity.transaction_hash,
        ledger = activity.ledger_index,
        alert = payload.alert_name,
    );

    let image_html = payload
        .nft
        .as_ref()
        .and_then(|nft| nft.image_url.as_deref())
        .map(|url| format!(r#"<p><img src="{url}" alt="{nft_name}" width="240"></p>"#))
        .unwrap_or_default();
    let price_html = activity
        .price_display()
        .map(|price| format!("<li><strong>Price:</strong> {price}</li>"))
        .unwrap_or_default();
    let from_html = activity
        .from_address
        .as_deref()
        .map(|from| format!("<li><strong>From:</strong> <code>{from}</code></li>"))
        .unwrap_or_default();
    let to_html = activity
        .to_address
        .as_deref()
        .map(|to| format!("<li><strong>To:</strong> <code>{to}</code></li>"))
        .unwrap_or_default();

    let html = format!(
        "<html><body>\
         <h2>{activity_type} activity for {nft_name}</h2>\
         {image_html}\
         <ul>{price_html}{from_html}{to_html}\
         <li><strong>Transaction:</strong> <code>{hash}</code></li>\
         <li><strong>Ledger:</strong> {ledger}</li></ul>\
         <p>Triggered by alert: {alert}</p>\
         </body></html>",
        hash = activity.transaction_hash,
        ledger = activity.ledger_index,
        alert = payload.alert_name,
    );

    EmailMessage {
        subject,
        html,
        text,
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::{
        NotificationPayload, PayloadActivity, PayloadNft, build_email_message,
    };
    use bigdecimal::BigDecimal;
    use monitor_common::domain::{ActivityType, NotificationChannel};
    use std::str::FromStr;
    use uuid::Uuid;

    fn payload() -> NotificationPayload {
        NotificationPayload {
            notification_id: 1,
            user_id: "user-1".to_string(),
            alert_config_id: Uuid::from_u128(1),
            alert_name: "mints".to_string(),
            channel: NotificationChannel::Email {
                recipients: vec!["alice@example.com".to_string()],
                subject: None,
            },
            retry_count: 0,
            activity: PayloadActivity {
                activity_type: ActivityType::Mint,
                transaction_hash: "AB".repeat(32),
                ledger_index: 100,
                from_address: None,
                to_address: Some("rAlice11111111111111111111111111111".to_string()),
                price_drops: None,
                currency: None,
                issuer: None,
                timestamp: 1_672_531_200_000,
            },
            nft: Some(PayloadNft {
                nft_id: "00".repeat(32),
                name: None,
                description: None,
                image_url: None,
                collection_name: Some("Dragons".to_string()),
            }),
        }
    }

    #[test]
    fn test_default_subject() {
        let message = build_email_message(&payload(), None);
        assert_eq!(message.subject, "🚨 MINT Alert: Dragons");

        let message = build_email_message(&payload(), Some("custom subject"));
        assert_eq!(message.subject, "custom subject");
    }

    #[test]
    fn test_alternatives() {
        let message = build_email_message(&payload(), None);

        assert!(message.text.contains("MINT activity for Dragons"));
        assert!(message.text.contains("rAlice11111111111111111111111111111"));
        assert!(!message.text.contains("Price:"));

        assert!(message.html.starts_with("<html>"));
        assert!(message.html.contains("<h2>MINT activity for Dragons</h2>"));
    }

    #[test]
    fn test_price_in_sale_email() {
        let mut payload = payload();
        payload.activity.activity_type = ActivityType::Sale;
        payload.activity.price_drops = Some(BigDecimal::from_str("1500000000000").unwrap());
        payload.activity.currency = Some("XRP".to_string());

        let message = build_email_message(&payload, None);
        assert!(message.text.contains("Price: 1500000.000000 XRP"));
    }
}
