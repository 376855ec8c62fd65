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

use serde_json::{Map, Value, json};

/// Key synonyms accepted in off-chain metadata documents, mapped onto their
/// canonical names.
const KEY_SYNONYMS: [(&str, &str); 4] = [
    ("title", "name"),
    ("image_url", "image"),
    ("external_link", "external_url"),
    ("traits", "attributes"),
];

/// Normalized off-chain metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedMetadata {
    /// The full normalized document, unknown top-level keys preserved.
    pub document: Value,

    pub name: Option<String>,
    pub image: Option<String>,

    /// Attribute objects `{trait_type, value, display_type?}`.
    pub attributes: Vec<Value>,
}

/// Normalize an off-chain metadata document: canonicalize key synonyms,
/// coerce attributes to objects, drop attributes without `trait_type` or
/// `value`, keep everything else as-is.
pub fn normalize_metadata(raw: Value) -> NormalizedMetadata {
    let Value::Object(raw) = raw else {
        return NormalizedMetadata {
            document: raw,
            name: None,
            image: None,
            attributes: vec![],
        };
    };

    let mut document = Map::with_capacity(raw.len());

    for (key, value) in raw {
        let key = canonical_key(&key);

        // The first occurrence wins when a synonym and its canonical form
        // are both present.
        document.entry(key).or_insert(value);
    }

    let attributes = document
        .remove("attributes")
        .map(normalize_attributes)
        .unwrap_or_default();
    if !attributes.is_empty() {
        document.insert("attributes".to_string(), Value::Array(attributes.clone()));
    }

    let name = document
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string);
    let image = document
        .get("image")
        .and_then(Value::as_str)
        .map(str::to_string);

    NormalizedMetadata {
        document: Value::Object(document),
        name,
        image,
        attributes,
    }
}

fn canonical_key(key: &str) -> String {
    KEY_SYNONYMS
        .iter()
        .find(|(synonym, _)| *synonym == key)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or_else(|| key.to_string())
}

fn normalize_attributes(attributes: Value) -> Vec<Value> {
    let Value::Array(attributes) = attributes else {
        return vec![];
    };

    attributes
        .into_iter()
        .filter_map(|attribute| {
            let Value::Object(attribute) = attribute else {
                return None;
            };

            let trait_type = attribute
                .get("trait_type")
                .or_else(|| attribute.get("type"))
                .or_else(|| attribute.get("name"))
                .and_then(Value::as_str)?
                .to_string();

            let value = attribute.get("value")?.clone();
            if value.is_null() {
                return None;
            }

            let mut normalized = json!({
                "trait_type": trait_type,
                "value": value,
            });
            if let Some(display_type) = attribute.get("display_type") {
                normalized["display_type"] = display_type.clone();
            }

            Some(normalized)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::domain::normalize_metadata;
    use serde_json::json;

    #[test]
    fn test_synonyms() {
        let normalized = normalize_metadata(json!({
            "title": "Dragon #1",
            "image_url": "ipfs://bafkrei123/dragon.png",
            "external_link": "https://example.com",
            "traits": [
                { "trait_type": "rarity", "value": "legendary" }
            ]
        }));

        assert_eq!(normalized.name.as_deref(), Some("Dragon #1"));
        assert_eq!(normalized.image.as_deref(), Some("ipfs://bafkrei123/dragon.png"));
        assert_eq!(
            normalized.document.get("external_url"),
            Some(&json!("https://example.com"))
        );
        assert_eq!(normalized.attributes.len(), 1);
    }

    #[test]
    fn test_attribute_coercion() {
        let normalized = normalize_metadata(json!({
            "attributes": [
                { "trait_type": "rarity", "value": "common" },
                { "type": "level", "value": 50 },
                { "name": "element", "value": "fire", "display_type": "string" },
                { "value": "no trait type" },
                { "trait_type": "undefined value" },
                { "trait_type": "null value", "value": null },
                "not an object"
            ]
        }));

        assert_eq!(
            normalized.attributes,
            vec![
                json!({ "trait_type": "rarity", "value": "common" }),
                json!({ "trait_type": "level", "value": 50 }),
                json!({ "trait_type": "element", "value": "fire", "display_type": "string" }),
            ]
        );
    }

    #[test]
    fn test_unknown_keys_preserved() {
        let normalized = normalize_metadata(json!({
            "name": "Dragon #1",
            "schema": "ipfs://bafkrei456",
            "nftType": "art.v0"
        }));

        assert_eq!(
            normalized.document.get("schema"),
            Some(&json!("ipfs://bafkrei456"))
        );
        assert_eq!(normalized.document.get("nftType"), Some(&json!("art.v0")));
    }

    #[test]
    fn test_non_object_document() {
        let normalized = normalize_metadata(json!("just a string"));
        assert_eq!(normalized.name, None);
        assert!(normalized.attributes.is_empty());
    }
}
