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

pub mod storage;

mod discord;
mod email;
mod webhook;

pub use discord::*;
pub use email::*;
pub use webhook::*;

use bigdecimal::BigDecimal;
use monitor_common::domain::{
    AccountAddress, ActivityType, LedgerIndex, NotificationChannel, TransactionHash, UnixMillis,
    format_drops_as_xrp,
};
use std::time::Duration;
use uuid::Uuid;

/// A notification joined with its activity, NFT, collection and alert
/// configuration; assembled in one query.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationPayload {
    pub notification_id: i64,
    pub user_id: String,
    pub alert_config_id: Uuid,
    pub alert_name: String,
    pub channel: NotificationChannel,
    pub retry_count: u32,
    pub activity: PayloadActivity,
    pub nft: Option<PayloadNft>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PayloadActivity {
    pub activity_type: ActivityType,
    pub transaction_hash: TransactionHash,
    pub ledger_index: LedgerIndex,
    pub from_address: Option<AccountAddress>,
    pub to_address: Option<AccountAddress>,
    pub price_drops: Option<BigDecimal>,
    pub currency: Option<String>,
    pub issuer: Option<AccountAddress>,
    pub timestamp: UnixMillis,
}

impl PayloadActivity {
    /// The price as a display string: XRP with six decimals, issued
    /// currencies verbatim with their code.
    pub fn price_display(&self) -> Option<String> {
        let price = self.price_drops.as_ref()?;

        match self.currency.as_deref() {
            Some("XRP") | None => Some(format!("{} XRP", format_drops_as_xrp(price))),
            Some(currency) => Some(format!("{price} {currency}")),
        }
    }

    /// The price in XRP with six decimals, when priced in XRP.
    pub fn price_xrp(&self) -> Option<String> {
        let price = self.price_drops.as_ref()?;

        matches!(self.currency.as_deref(), Some("XRP") | None)
            .then(|| format_drops_as_xrp(price))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadNft {
    pub nft_id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub collection_name: Option<String>,
}

impl PayloadNft {
    /// The display name: metadata name, collection name or the token id.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.collection_name.as_deref())
            .unwrap_or(&self.nft_id)
    }
}

/// The outcome of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent {
        message_id: Option<String>,
    },

    Failed {
        error: String,

        /// Server-mandated delay (HTTP 429 Retry-After), overriding the
        /// default backoff.
        retry_after: Option<Duration>,

        /// Configuration errors are not retried.
        permanent: bool,
    },
}

impl SendOutcome {
    pub fn permanent_failure(error: impl Into<String>) -> Self {
        SendOutcome::Failed {
            error: error.into(),
            retry_after: None,
            permanent: true,
        }
    }

    pub fn transient_failure(error: impl Into<String>) -> Self {
        SendOutcome::Failed {
            error: error.into(),
            retry_after: None,
            permanent: false,
        }
    }

    pub fn rate_limited(error: impl Into<String>, retry_after: Duration) -> Self {
        SendOutcome::Failed {
            error: error.into(),
            retry_after: Some(retry_after),
            permanent: false,
        }
    }
}

/// Channel sender abstraction.
#[trait_variant::make(Send)]
pub trait Sender
where
    Self: Clone + Send + Sync + 'static,
{
    /// Deliver a payload over its channel; never panics, all failures are
    /// reported in the outcome.
    async fn send(&self, payload: &NotificationPayload) -> SendOutcome;
}

/// Emoji and embed color per activity type for the Discord embed.
pub fn activity_emoji(activity_type: ActivityType) -> &'static str {
    match activity_type {
        ActivityType::Mint => "🌱",
        ActivityType::Sale => "💰",
        ActivityType::OfferCreated => "📝",
        ActivityType::OfferAccepted => "🤝",
        ActivityType::OfferCancelled => "❌",
        ActivityType::Transfer => "🔄",
        ActivityType::Burn => "🔥",
    }
}

pub fn activity_color(activity_type: ActivityType) -> u32 {
    match activity_type {
        ActivityType::Mint => 0x2ECC71,
        ActivityType::Sale => 0xF1C40F,
        ActivityType::OfferCreated => 0x3498DB,
        ActivityType::OfferAccepted => 0x1ABC9C,
        ActivityType::OfferCancelled => 0x95A5A6,
        ActivityType::Transfer => 0x9B59B6,
        ActivityType::Burn => 0xE74C3C,
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::PayloadActivity;
    use bigdecimal::BigDecimal;
    use monitor_common::domain::ActivityType;
    use std::str::FromStr;

    fn activity(price: Option<&str>, currency: Option<&str>) -> PayloadActivity {
        PayloadActivity {
            activity_type: ActivityType::Sale,
            transaction_hash: "AB".repeat(32),
            ledger_index: 100,
            from_address: None,
            to_address: None,
            price_drops: price.map(|price| BigDecimal::from_str(price).unwrap()),
            currency: currency.map(str::to_string),
            issuer: None,
            timestamp: 0,
        }
    }

    #[test]
    fn test_price_display() {
        assert_eq!(
            activity(Some("1500000000000"), Some("XRP")).price_display(),
            Some("1500000.000000 XRP".to_string())
        );
        assert_eq!(
            activity(Some("12.5"), Some("USD")).price_display(),
            Some("12.5 USD".to_string())
        );
        assert_eq!(activity(None, None).price_display(), None);
    }

    #[test]
    fn test_price_xrp() {
        assert_eq!(
            activity(Some("1500000000000"), Some("XRP")).price_xrp(),
            Some("1500000.000000".to_string())
        );
        assert_eq!(activity(Some("12.5"), Some("USD")).price_xrp(), None);
    }
}
