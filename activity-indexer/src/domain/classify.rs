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

use crate::domain::{ClassifiedActivity, NftUpsert};
use bigdecimal::BigDecimal;
use log::warn;
use monitor_common::domain::{ActivityType, NftActivity, RawTransaction, TokenId};
use serde_json::{Value, json};
use std::{collections::HashSet, str::FromStr};

const ENGINE_RESULT_SUCCESS: &str = "tesSUCCESS";

/// Offer flag bit marking a sell offer (`tfSellNFToken` / `lsfSellNFToken`).
const SELL_OFFER_FLAG: u64 = 0x0000_0001;

/// Turn a validated raw transaction into zero or more NFT activities.
/// Non-successful and non-NFT transactions yield nothing; malformed NFT
/// transactions are logged with their hash and dropped.
pub fn classify(raw: &RawTransaction) -> Vec<ClassifiedActivity> {
    if raw.engine_result != ENGINE_RESULT_SUCCESS {
        return vec![];
    }

    let activities = match raw.transaction_type() {
        Some("NFTokenMint") => classify_mint(raw),
        Some("NFTokenAcceptOffer") => classify_accept_offer(raw),
        Some("NFTokenCreateOffer") => classify_create_offer(raw),
        Some("NFTokenCancelOffer") => classify_cancel_offer(raw),
        Some("NFTokenBurn") => classify_burn(raw),
        _ => return vec![],
    };

    match activities {
        Some(activities) => activities,
        None => {
            warn!(tx_hash = raw.hash.as_str(); "malformed NFT transaction dropped");
            vec![]
        }
    }
}

fn classify_mint(raw: &RawTransaction) -> Option<Vec<ClassifiedActivity>> {
    let account = raw.account()?.to_string();
    let nft_id = minted_token_id(&raw.meta)?;
    let decoded = nft_id.decode();

    let metadata_uri = raw
        .transaction
        .get("URI")
        .and_then(Value::as_str)
        .map(str::to_string);

    let activity = NftActivity {
        nft_id: Some(nft_id.clone()),
        transaction_hash: raw.hash.clone(),
        ledger_index: raw.ledger_index,
        activity_type: ActivityType::Mint,
        from_address: None,
        to_address: Some(account.clone()),
        price_drops: None,
        currency: None,
        issuer: None,
        timestamp: raw.close_time,
        metadata: json!({ "transaction_type": "NFTokenMint" }),
    };

    Some(vec![ClassifiedActivity {
        activity,
        nft: Some(NftUpsert {
            nft_id,
            owner_address: account,
            update_owner: true,
            metadata_uri,
            issuer_address: decoded.issuer,
            taxon: decoded.taxon,
        }),
    }])
}

fn classify_accept_offer(raw: &RawTransaction) -> Option<Vec<ClassifiedActivity>> {
    let account = raw.account()?.to_string();
    let offers = deleted_offers(&raw.meta);

    // A brokered accept deletes both the buy and the sell offer; the sell
    // offer carries the authoritative price and seller.
    let offer = offers
        .iter()
        .find(|offer| offer.is_sell)
        .or_else(|| offers.first())?;

    let (seller, buyer) = if offer.is_sell {
        (offer.owner.clone(), account)
    } else {
        (account, offer.owner.clone())
    };

    let price = normalize_amount(&offer.amount)?;
    let nft_id = offer.nft_id.clone()?;
    let decoded = nft_id.decode();

    let activity = NftActivity {
        nft_id: Some(nft_id.clone()),
        transaction_hash: raw.hash.clone(),
        ledger_index: raw.ledger_index,
        activity_type: ActivityType::Sale,
        from_address: Some(seller),
        to_address: Some(buyer.clone()),
        price_drops: Some(price.drops),
        currency: Some(price.currency),
        issuer: price.issuer,
        timestamp: raw.close_time,
        metadata: json!({
            "transaction_type": "NFTokenAcceptOffer",
            "is_sell_offer": offer.is_sell,
        }),
    };

    Some(vec![ClassifiedActivity {
        activity,
        nft: Some(NftUpsert {
            nft_id,
            owner_address: buyer,
            update_owner: true,
            metadata_uri: None,
            issuer_address: decoded.issuer,
            taxon: decoded.taxon,
        }),
    }])
}

fn classify_create_offer(raw: &RawTransaction) -> Option<Vec<ClassifiedActivity>> {
    let account = raw.account()?.to_string();
    let nft_id = raw
        .transaction
        .get("NFTokenID")
        .and_then(Value::as_str)
        .and_then(|id| TokenId::try_from(id).ok())?;
    let decoded = nft_id.decode();

    let flags = raw
        .transaction
        .get("Flags")
        .and_then(Value::as_u64)
        .unwrap_or_default();
    let is_sell = flags & SELL_OFFER_FLAG != 0;

    let price = raw.transaction.get("Amount").and_then(normalize_amount);

    let to_address = raw
        .transaction
        .get("Destination")
        .and_then(Value::as_str)
        .map(str::to_string);

    let activity = NftActivity {
        nft_id: Some(nft_id.clone()),
        transaction_hash: raw.hash.clone(),
        ledger_index: raw.ledger_index,
        activity_type: ActivityType::OfferCreated,
        from_address: Some(account.clone()),
        to_address,
        price_drops: price.as_ref().map(|price| price.drops.clone()),
        currency: price.as_ref().map(|price| price.currency.clone()),
        issuer: price.as_ref().and_then(|price| price.issuer.clone()),
        timestamp: raw.close_time,
        metadata: json!({
            "transaction_type": "NFTokenCreateOffer",
            "is_sell_offer": is_sell,
        }),
    };

    Some(vec![ClassifiedActivity {
        activity,
        nft: Some(NftUpsert {
            nft_id,
            owner_address: account,
            update_owner: false,
            metadata_uri: None,
            issuer_address: decoded.issuer,
            taxon: decoded.taxon,
        }),
    }])
}

fn classify_cancel_offer(raw: &RawTransaction) -> Option<Vec<ClassifiedActivity>> {
    let offers = deleted_offers(&raw.meta);
    if offers.is_empty() {
        return None;
    }

    let activities = offers
        .into_iter()
        .filter_map(|offer| {
            let nft_id = offer.nft_id?;
            let decoded = nft_id.decode();
            let price = normalize_amount(&offer.amount);

            let activity = NftActivity {
                nft_id: Some(nft_id.clone()),
                transaction_hash: raw.hash.clone(),
                ledger_index: raw.ledger_index,
                activity_type: ActivityType::OfferCancelled,
                from_address: Some(offer.owner.clone()),
                to_address: None,
                price_drops: price.as_ref().map(|price| price.drops.clone()),
                currency: price.as_ref().map(|price| price.currency.clone()),
                issuer: price.as_ref().and_then(|price| price.issuer.clone()),
                timestamp: raw.close_time,
                metadata: json!({
                    "transaction_type": "NFTokenCancelOffer",
                    "is_sell_offer": offer.is_sell,
                }),
            };

            Some(ClassifiedActivity {
                activity,
                nft: Some(NftUpsert {
                    nft_id,
                    owner_address: offer.owner,
                    update_owner: false,
                    metadata_uri: None,
                    issuer_address: decoded.issuer,
                    taxon: decoded.taxon,
                }),
            })
        })
        .collect::<Vec<_>>();

    (!activities.is_empty()).then_some(activities)
}

fn classify_burn(raw: &RawTransaction) -> Option<Vec<ClassifiedActivity>> {
    let account = raw.account()?.to_string();
    let nft_id = raw
        .transaction
        .get("NFTokenID")
        .and_then(Value::as_str)
        .and_then(|id| TokenId::try_from(id).ok())?;
    let decoded = nft_id.decode();

    // The issuer may burn on behalf of the owner; Owner then names the
    // holder of the burned token.
    let owner = raw
        .transaction
        .get("Owner")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| account.clone());

    let activity = NftActivity {
        nft_id: Some(nft_id.clone()),
        transaction_hash: raw.hash.clone(),
        ledger_index: raw.ledger_index,
        activity_type: ActivityType::Burn,
        from_address: Some(owner.clone()),
        to_address: None,
        price_drops: None,
        currency: None,
        issuer: None,
        timestamp: raw.close_time,
        metadata: json!({ "transaction_type": "NFTokenBurn" }),
    };

    Some(vec![ClassifiedActivity {
        activity,
        nft: Some(NftUpsert {
            nft_id,
            owner_address: owner,
            update_owner: false,
            metadata_uri: None,
            issuer_address: decoded.issuer,
            taxon: decoded.taxon,
        }),
    }])
}

/// A normalized price: drops for XRP, the verbatim value for issued
/// currencies.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedAmount {
    pub drops: BigDecimal,
    pub currency: String,
    pub issuer: Option<String>,
}

/// Normalize an XRPL `Amount`: a bare decimal string is XRP drops; an
/// object carries `value`, `currency` and `issuer` verbatim.
pub fn normalize_amount(amount: &Value) -> Option<NormalizedAmount> {
    match amount {
        Value::String(drops) => {
            let drops = BigDecimal::from_str(drops).ok()?;
            Some(NormalizedAmount {
                drops,
                currency: "XRP".to_string(),
                issuer: None,
            })
        }

        Value::Object(fields) => {
            let value = fields.get("value").and_then(Value::as_str)?;
            let currency = fields.get("currency").and_then(Value::as_str)?;
            let issuer = fields
                .get("issuer")
                .and_then(Value::as_str)
                .map(str::to_string);

            Some(NormalizedAmount {
                drops: BigDecimal::from_str(value).ok()?,
                currency: currency.to_string(),
                issuer,
            })
        }

        _ => None,
    }
}

#[derive(Debug, Clone)]
struct DeletedOffer {
    amount: Value,
    owner: String,
    nft_id: Option<TokenId>,
    is_sell: bool,
}

/// The `NFTokenOffer` nodes deleted by this transaction.
fn deleted_offers(meta: &Value) -> Vec<DeletedOffer> {
    let Some(nodes) = meta.get("AffectedNodes").and_then(Value::as_array) else {
        return vec![];
    };

    nodes
        .iter()
        .filter_map(|node| {
            let deleted = node.get("DeletedNode")?;
            if deleted.get("LedgerEntryType").and_then(Value::as_str) != Some("NFTokenOffer") {
                return None;
            }

            let fields = deleted.get("FinalFields")?;
            let owner = fields.get("Owner").and_then(Value::as_str)?.to_string();
            let amount = fields.get("Amount").cloned().unwrap_or(Value::Null);
            let nft_id = fields
                .get("NFTokenID")
                .and_then(Value::as_str)
                .and_then(|id| TokenId::try_from(id).ok());
            let flags = fields.get("Flags").and_then(Value::as_u64).unwrap_or_default();

            Some(DeletedOffer {
                amount,
                owner,
                nft_id,
                is_sell: flags & SELL_OFFER_FLAG != 0,
            })
        })
        .collect()
}

/// The token id of the single NFToken created by a mint: the `nftoken_id`
/// convenience field when present, otherwise the diff of the affected
/// `NFTokenPage` nodes.
fn minted_token_id(meta: &Value) -> Option<TokenId> {
    if let Some(id) = meta.get("nftoken_id").and_then(Value::as_str) {
        return TokenId::try_from(id).ok();
    }

    let nodes = meta.get("AffectedNodes").and_then(Value::as_array)?;

    let mut created = HashSet::new();
    let mut previous = HashSet::new();

    for node in nodes {
        if let Some(node) = node.get("CreatedNode") {
            if node.get("LedgerEntryType").and_then(Value::as_str) == Some("NFTokenPage") {
                collect_page_token_ids(node.get("NewFields"), &mut created);
            }
        }

        if let Some(node) = node.get("ModifiedNode") {
            if node.get("LedgerEntryType").and_then(Value::as_str) == Some("NFTokenPage") {
                collect_page_token_ids(node.get("FinalFields"), &mut created);
                collect_page_token_ids(node.get("PreviousFields"), &mut previous);
            }
        }
    }

    let mut new_ids = created.difference(&previous);
    let id = new_ids.next()?;
    if new_ids.next().is_some() {
        return None;
    }

    TokenId::try_from(id.as_str()).ok()
}

fn collect_page_token_ids(fields: Option<&Value>, into: &mut HashSet<String>) {
    let Some(tokens) = fields
        .and_then(|fields| fields.get("NFTokens"))
        .and_then(Value::as_array)
    else {
        return;
    };

    for token in tokens {
        if let Some(id) = token
            .get("NFToken")
            .and_then(|token| token.get("NFTokenID"))
            .and_then(Value::as_str)
        {
            into.insert(id.to_string());
        }
    }
}
