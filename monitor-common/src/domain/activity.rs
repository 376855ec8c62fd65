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

use crate::domain::{AccountAddress, LedgerIndex, TokenId, TransactionHash, UnixMillis};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// The kind of NFT activity extracted from a validated transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "ACTIVITY_TYPE", rename_all = "snake_case")]
pub enum ActivityType {
    Mint,
    Sale,
    OfferCreated,
    OfferAccepted,
    OfferCancelled,
    Transfer,
    Burn,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Mint => "mint",
            ActivityType::Sale => "sale",
            ActivityType::OfferCreated => "offer_created",
            ActivityType::OfferAccepted => "offer_accepted",
            ActivityType::OfferCancelled => "offer_cancelled",
            ActivityType::Transfer => "transfer",
            ActivityType::Burn => "burn",
        }
    }
}

impl Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An append-only NFT activity fact. Immutable after insert; deduplicated by
/// `(transaction_hash, activity_type, nft_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NftActivity {
    pub nft_id: Option<TokenId>,
    pub transaction_hash: TransactionHash,
    pub ledger_index: LedgerIndex,
    pub activity_type: ActivityType,
    pub from_address: Option<AccountAddress>,
    pub to_address: Option<AccountAddress>,

    /// Non-negative price; drops for XRP, the verbatim `value` for issued
    /// currencies. Arbitrary precision as amounts routinely exceed 2^63.
    pub price_drops: Option<BigDecimal>,
    pub currency: Option<String>,
    pub issuer: Option<AccountAddress>,

    pub timestamp: UnixMillis,
    pub metadata: serde_json::Value,
}

/// One row per fully-processed ledger; used to detect gaps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSyncStatus {
    pub ledger_index: LedgerIndex,
    pub ledger_hash: String,
    pub close_time: UnixMillis,
    pub transaction_count: u32,
    pub processed_at: UnixMillis,
}

/// Format a drops amount as XRP with six decimal places.
pub fn format_drops_as_xrp(drops: &BigDecimal) -> String {
    (drops / BigDecimal::from(1_000_000u32))
        .with_scale(6)
        .to_string()
}
