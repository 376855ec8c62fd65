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

use crate::domain::{MatchActivity, MatchResult};
use monitor_common::domain::{AlertConfig, TraitFilter, TraitOperator};
use serde_json::Value;

/// Evaluate one candidate configuration against an activity. All conditions
/// are conjunctive; evaluation stops at the first failing one.
pub fn evaluate(activity: &MatchActivity, config: &AlertConfig) -> MatchResult {
    let mut reasons = Vec::new();

    let matched = check_activity_type(activity, config, &mut reasons)
        && check_collection(activity, config, &mut reasons)
        && check_price(activity, config, &mut reasons)
        && check_traits(activity, config, &mut reasons);

    MatchResult {
        alert_config_id: config.id,
        matched,
        reasons,
    }
}

fn check_activity_type(
    activity: &MatchActivity,
    config: &AlertConfig,
    reasons: &mut Vec<String>,
) -> bool {
    if config.activity_types.contains(&activity.activity_type) {
        reasons.push(format!("activity type {} matches", activity.activity_type));
        true
    } else {
        reasons.push(format!(
            "activity type {} not in alert activity types",
            activity.activity_type
        ));
        false
    }
}

fn check_collection(
    activity: &MatchActivity,
    config: &AlertConfig,
    reasons: &mut Vec<String>,
) -> bool {
    // A configuration without a collection is global.
    let Some(collection_id) = config.collection_id else {
        reasons.push("alert is global (no collection filter)".to_string());
        return true;
    };

    match activity.nft.as_ref().and_then(|nft| nft.collection_id) {
        Some(activity_collection_id) if activity_collection_id == collection_id => {
            reasons.push(format!("collection {collection_id} matches"));
            true
        }

        Some(activity_collection_id) => {
            reasons.push(format!(
                "collection {activity_collection_id} does not match alert collection \
                 {collection_id}"
            ));
            false
        }

        None => {
            reasons.push("alert has a collection filter but activity has no collection".to_string());
            false
        }
    }
}

fn check_price(activity: &MatchActivity, config: &AlertConfig, reasons: &mut Vec<String>) -> bool {
    if config.min_price_drops.is_none() && config.max_price_drops.is_none() {
        return true;
    }

    let Some(price) = &activity.price_drops else {
        reasons.push(
            "alert has price filters but activity has no price information".to_string(),
        );
        return false;
    };

    if let Some(min) = &config.min_price_drops {
        if price < min {
            reasons.push(format!("price {price} below minimum {min}"));
            return false;
        }
    }

    if let Some(max) = &config.max_price_drops {
        if price > max {
            reasons.push(format!("price {price} above maximum {max}"));
            return false;
        }
    }

    reasons.push(format!("price {price} within bounds"));
    true
}

fn check_traits(activity: &MatchActivity, config: &AlertConfig, reasons: &mut Vec<String>) -> bool {
    let filters = match &config.trait_filters {
        Some(filters) if !filters.is_empty() => filters,
        // An empty filter list matches by default.
        _ => return true,
    };

    let Some(traits) = activity.nft.as_ref().and_then(|nft| nft.traits.as_ref()) else {
        reasons.push("alert has trait filters but NFT has no traits".to_string());
        return false;
    };

    for filter in filters {
        if !check_trait_filter(traits, filter, reasons) {
            return false;
        }
    }

    true
}

fn check_trait_filter(traits: &Value, filter: &TraitFilter, reasons: &mut Vec<String>) -> bool {
    let operator = match filter.operator.parse::<TraitOperator>() {
        Ok(operator) => operator,
        Err(error) => {
            reasons.push(error.to_string());
            return false;
        }
    };

    let Some(value) = lookup_trait(traits, &filter.trait_type) else {
        reasons.push(format!("Trait {} not present", filter.trait_type));
        return false;
    };

    let trait_type = &filter.trait_type;
    let actual = coerce_string(&value);
    let expected = coerce_string(&filter.value);

    match operator {
        TraitOperator::Equals => {
            if actual == expected {
                reasons.push(format!("Trait {trait_type} ({actual}) equals {expected}"));
                true
            } else {
                reasons.push(format!(
                    "Trait {trait_type} ({actual}) does not equal {expected}"
                ));
                false
            }
        }

        TraitOperator::NotEquals => {
            if actual != expected {
                reasons.push(format!(
                    "Trait {trait_type} ({actual}) differs from {expected}"
                ));
                true
            } else {
                reasons.push(format!("Trait {trait_type} ({actual}) equals {expected}"));
                false
            }
        }

        TraitOperator::GreaterThan | TraitOperator::LessThan => {
            let (Some(actual_number), Some(expected_number)) =
                (coerce_number(&value), coerce_number(&filter.value))
            else {
                reasons.push(format!(
                    "Trait {trait_type} ({actual}) is not comparable to {expected}"
                ));
                return false;
            };

            let passes = match operator {
                TraitOperator::GreaterThan => actual_number > expected_number,
                _ => actual_number < expected_number,
            };

            if passes {
                reasons.push(format!(
                    "Trait {trait_type} ({actual_number}) is {operator} {expected_number}"
                ));
            } else {
                reasons.push(format!(
                    "Trait {trait_type} ({actual_number}) is not {operator} {expected_number}"
                ));
            }
            passes
        }

        TraitOperator::Contains => {
            let haystack = actual.to_lowercase();
            let needle = expected.to_lowercase();

            if haystack.contains(&needle) {
                reasons.push(format!("Trait {trait_type} ({actual}) contains {expected}"));
                true
            } else {
                reasons.push(format!(
                    "Trait {trait_type} ({actual}) does not contain {expected}"
                ));
                false
            }
        }
    }
}

/// Look a trait up by type, accepting both the array form
/// (`[{trait_type|type|name, value}]`) and the object form
/// (`{trait: value}`); the first matching key wins.
fn lookup_trait(traits: &Value, trait_type: &str) -> Option<Value> {
    match traits {
        Value::Array(entries) => entries.iter().find_map(|entry| {
            let entry_type = entry
                .get("trait_type")
                .or_else(|| entry.get("type"))
                .or_else(|| entry.get("name"))
                .and_then(Value::as_str)?;

            (entry_type == trait_type)
                .then(|| entry.get("value").cloned())
                .flatten()
        }),

        Value::Object(map) => map.get(trait_type).cloned(),

        _ => None,
    }
}

/// Loose string coercion for equality and substring checks.
fn coerce_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Numeric coercion for ordering checks; `None` stands for NaN.
fn coerce_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    number.filter(|number| !number.is_nan())
}

#[cfg(test)]
mod tests {
    use crate::domain::{MatchActivity, MatchNft, evaluate, find_matches};
    use bigdecimal::BigDecimal;
    use monitor_common::domain::{ActivityType, AlertConfig, NotificationChannel, TraitFilter};
    use serde_json::{Value, json};
    use std::str::FromStr;
    use uuid::Uuid;

    fn config() -> AlertConfig {
        AlertConfig {
            id: Uuid::from_u128(1),
            user_id: "user-1".to_string(),
            name: "test alert".to_string(),
            collection_id: None,
            activity_types: vec![ActivityType::Sale],
            min_price_drops: None,
            max_price_drops: None,
            trait_filters: None,
            notification_channels: vec![NotificationChannel::Email {
                recipients: vec!["alice@example.com".to_string()],
                subject: None,
            }],
            is_active: true,
        }
    }

    fn sale(price: Option<&str>, traits: Option<Value>) -> MatchActivity {
        MatchActivity {
            activity_id: 1,
            activity_type: ActivityType::Sale,
            price_drops: price.map(|price| BigDecimal::from_str(price).unwrap()),
            nft: Some(MatchNft {
                collection_id: Some(7),
                traits,
            }),
        }
    }

    fn filter(trait_type: &str, operator: &str, value: Value) -> TraitFilter {
        TraitFilter {
            trait_type: trait_type.to_string(),
            value,
            operator: operator.to_string(),
        }
    }

    #[test]
    fn test_activity_type() {
        let activity = sale(None, None);

        assert!(evaluate(&activity, &config()).matched);

        let config = AlertConfig {
            activity_types: vec![ActivityType::Mint],
            ..config()
        };
        let result = evaluate(&activity, &config);
        assert!(!result.matched);
        assert!(result.reasons[0].contains("not in alert activity types"));
    }

    #[test]
    fn test_collection_scoped_and_global() {
        let activity = sale(None, None);

        // Scoped to the matching collection.
        let scoped = AlertConfig {
            collection_id: Some(7),
            ..config()
        };
        assert!(evaluate(&activity, &scoped).matched);

        // Scoped to another collection.
        let other = AlertConfig {
            collection_id: Some(8),
            ..config()
        };
        assert!(!evaluate(&activity, &other).matched);

        // Global alerts match any collection, including none at all.
        let global = config();
        assert!(evaluate(&activity, &global).matched);

        let no_nft = MatchActivity {
            nft: None,
            ..activity
        };
        assert!(evaluate(&no_nft, &global).matched);
    }

    #[test]
    fn test_price_bounds_inclusive() {
        let config = AlertConfig {
            min_price_drops: Some(BigDecimal::from_str("1000000000").unwrap()),
            max_price_drops: Some(BigDecimal::from_str("2000000000000").unwrap()),
            ..config()
        };

        assert!(evaluate(&sale(Some("1500000000000"), None), &config).matched);

        // Bounds are inclusive.
        assert!(evaluate(&sale(Some("1000000000"), None), &config).matched);
        assert!(evaluate(&sale(Some("2000000000000"), None), &config).matched);

        assert!(!evaluate(&sale(Some("999999999"), None), &config).matched);
        assert!(!evaluate(&sale(Some("2000000000001"), None), &config).matched);
    }

    #[test]
    fn test_price_filter_without_price() {
        let config = AlertConfig {
            min_price_drops: Some(BigDecimal::from_str("1").unwrap()),
            ..config()
        };

        let result = evaluate(&sale(None, None), &config);
        assert!(!result.matched);
        assert!(result.reasons.iter().any(|reason| {
            reason == "alert has price filters but activity has no price information"
        }));
    }

    #[test]
    fn test_price_beyond_u64() {
        // 2^64 - 1 with a minimum one below passes; one above fails.
        let activity = sale(Some("18446744073709551615"), None);

        let config_below = AlertConfig {
            min_price_drops: Some(BigDecimal::from_str("18446744073709551614").unwrap()),
            ..config()
        };
        assert!(evaluate(&activity, &config_below).matched);

        let config_above = AlertConfig {
            min_price_drops: Some(BigDecimal::from_str("18446744073709551616").unwrap()),
            ..config()
        };
        assert!(!evaluate(&activity, &config_above).matched);
    }

    #[test]
    fn test_trait_filters_array_form() {
        let traits = json!([
            { "trait_type": "rarity", "value": "common" },
            { "type": "level", "value": 50 }
        ]);

        let matching = AlertConfig {
            trait_filters: Some(vec![
                filter("rarity", "equals", json!("common")),
                filter("level", "greater_than", json!(40)),
            ]),
            ..config()
        };
        assert!(evaluate(&sale(None, Some(traits.clone())), &matching).matched);

        let rejecting = AlertConfig {
            trait_filters: Some(vec![
                filter("rarity", "equals", json!("legendary")),
                filter("level", "greater_than", json!(90)),
            ]),
            ..config()
        };
        let result = evaluate(&sale(None, Some(traits)), &rejecting);
        assert!(!result.matched);
        assert!(
            result
                .reasons
                .contains(&"Trait rarity (common) does not equal legendary".to_string())
        );
    }

    #[test]
    fn test_trait_filters_object_form() {
        let traits = json!({ "rarity": "common", "level": 50 });

        let config = AlertConfig {
            trait_filters: Some(vec![
                filter("rarity", "contains", json!("COM")),
                filter("level", "less_than", json!("60")),
            ]),
            ..config()
        };

        assert!(evaluate(&sale(None, Some(traits)), &config).matched);
    }

    #[test]
    fn test_trait_equals_loose_coercion() {
        // Numeric 50 equals string "50" after string coercion.
        let traits = json!({ "level": 50 });
        let config = AlertConfig {
            trait_filters: Some(vec![filter("level", "equals", json!("50"))]),
            ..config()
        };

        assert!(evaluate(&sale(None, Some(traits)), &config).matched);
    }

    #[test]
    fn test_trait_nan_fails_with_reason() {
        let traits = json!({ "rarity": "common" });
        let config = AlertConfig {
            trait_filters: Some(vec![filter("rarity", "greater_than", json!(10))]),
            ..config()
        };

        let result = evaluate(&sale(None, Some(traits)), &config);
        assert!(!result.matched);
        assert!(
            result
                .reasons
                .iter()
                .any(|reason| reason.contains("not comparable"))
        );
    }

    #[test]
    fn test_unknown_operator() {
        let traits = json!({ "rarity": "common" });
        let config = AlertConfig {
            trait_filters: Some(vec![filter("rarity", "between", json!(10))]),
            ..config()
        };

        let result = evaluate(&sale(None, Some(traits)), &config);
        assert!(!result.matched);
        assert!(
            result
                .reasons
                .contains(&"Unknown operator: between".to_string())
        );
    }

    #[test]
    fn test_empty_trait_filters_match() {
        let config = AlertConfig {
            trait_filters: Some(vec![]),
            ..config()
        };

        assert!(evaluate(&sale(None, None), &config).matched);
    }

    #[test]
    fn test_trait_filters_without_traits() {
        let config = AlertConfig {
            trait_filters: Some(vec![filter("rarity", "equals", json!("common"))]),
            ..config()
        };

        assert!(!evaluate(&sale(None, None), &config).matched);
    }

    #[test]
    fn test_find_matches_one_result_per_candidate() {
        let candidates = vec![
            config(),
            AlertConfig {
                id: Uuid::from_u128(2),
                activity_types: vec![ActivityType::Mint],
                ..config()
            },
        ];

        let results = find_matches(&sale(None, None), &candidates);
        assert_eq!(results.len(), 2);
        assert!(results[0].matched);
        assert!(!results[1].matched);
    }
}
