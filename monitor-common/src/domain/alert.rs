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

use crate::domain::{ActivityType, NotificationChannel};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use uuid::Uuid;

/// A per-user alert configuration. Written by the external CRUD layer; the
/// core only reads rows with `is_active = true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertConfig {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,

    /// `None` means global: the alert applies to every collection.
    pub collection_id: Option<i64>,

    /// Must be non-empty.
    pub activity_types: Vec<ActivityType>,

    /// Inclusive bounds; when both are present, min must be strictly below
    /// max.
    pub min_price_drops: Option<BigDecimal>,
    pub max_price_drops: Option<BigDecimal>,

    pub trait_filters: Option<Vec<TraitFilter>>,

    /// Must contain at least one channel.
    pub notification_channels: Vec<NotificationChannel>,

    pub is_active: bool,
}

/// A single trait predicate of an alert configuration. The operator is kept
/// as the raw configured string: an unknown operator must fail evaluation
/// with a reason, not fail row decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitFilter {
    pub trait_type: String,
    pub value: serde_json::Value,
    pub operator: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraitOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
}

impl std::str::FromStr for TraitOperator {
    type Err = UnknownOperatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "equals" => Ok(TraitOperator::Equals),
            "not_equals" => Ok(TraitOperator::NotEquals),
            "greater_than" => Ok(TraitOperator::GreaterThan),
            "less_than" => Ok(TraitOperator::LessThan),
            "contains" => Ok(TraitOperator::Contains),
            _ => Err(UnknownOperatorError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown operator: {0}")]
pub struct UnknownOperatorError(pub String);

impl Display for TraitOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TraitOperator::Equals => "equals",
            TraitOperator::NotEquals => "not_equals",
            TraitOperator::GreaterThan => "greater_than",
            TraitOperator::LessThan => "less_than",
            TraitOperator::Contains => "contains",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::{TraitFilter, TraitOperator, UnknownOperatorError};
    use serde_json::json;

    #[test]
    fn test_trait_filter_serde() {
        let json = json!({
            "trait_type": "rarity",
            "value": "legendary",
            "operator": "not_equals"
        });

        let filter = serde_json::from_value::<TraitFilter>(json).expect("can be deserialized");
        assert_eq!(filter.trait_type, "rarity");
        assert_eq!(
            filter.operator.parse::<TraitOperator>(),
            Ok(TraitOperator::NotEquals)
        );
        assert_eq!(
            "between".parse::<TraitOperator>(),
            Err(UnknownOperatorError("between".to_string()))
        );
    }
}
