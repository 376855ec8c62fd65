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

mod predicate;

pub use predicate::*;

use bigdecimal::BigDecimal;
use monitor_common::domain::{ActivityType, AlertConfig};
use serde::Serialize;
use uuid::Uuid;

/// An activity joined with the NFT fields relevant for matching; computed in
/// one query to avoid per-candidate lookups.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchActivity {
    pub activity_id: i64,
    pub activity_type: ActivityType,
    pub price_drops: Option<BigDecimal>,
    pub nft: Option<MatchNft>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchNft {
    pub collection_id: Option<i64>,
    pub traits: Option<serde_json::Value>,
}

/// The evaluation result for one candidate configuration; `reasons` carries
/// a human-readable log of every positive and negative decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub alert_config_id: Uuid,
    pub matched: bool,
    pub reasons: Vec<String>,
}

/// Evaluate an activity against candidate configurations; one result per
/// candidate.
pub fn find_matches(activity: &MatchActivity, candidates: &[AlertConfig]) -> Vec<MatchResult> {
    candidates
        .iter()
        .map(|config| evaluate(activity, config))
        .collect()
}
