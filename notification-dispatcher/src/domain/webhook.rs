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
use monitor_common::domain::UnixMillis;
use serde_json::{Value, json};
use uuid::Uuid;

const ENVELOPE_TYPE: &str = "nft_activity_alert";
const ENVELOPE_VERSION: &str = "1.0";

/// Build the canonical JSON envelope delivered to user-configured webhooks.
pub fn build_webhook_envelope(
    payload: &NotificationPayload,
    delivery_id: Uuid,
    now: UnixMillis,
) -> Value {
    let activity = &payload.activity;

    let mut activity_json = json!({
        "type": activity.activity_type,
        "transactionHash": activity.transaction_hash,
        "ledgerIndex": activity.ledger_index,
        "timestamp": activity.timestamp,
        "fromAddress": activity.from_address,
        "toAddress": activity.to_address,
        "priceDrops": activity.price_drops.as_ref().map(|price| price.to_string()),
        "currency": activity.currency,
        "issuer": activity.issuer,
    });

    if let Some(price_xrp) = activity.price_xrp() {
        activity_json["priceXRP"] = json!(price_xrp);
    }

    if let Some(nft) = &payload.nft {
        activity_json["nft"] = json!({
            "nftId": nft.nft_id,
            "name": nft.name,
            "imageUrl": nft.image_url,
            "collectionName": nft.collection_name,
        });
    }

    json!({
        "webhook": {
            "id": delivery_id,
            "timestamp": now,
            "type": ENVELOPE_TYPE,
            "version": ENVELOPE_VERSION,
        },
        "alert": {
            "id": payload.alert_config_id,
            "userId": payload.user_id,
            "triggeredAt": now,
        },
        "activity": activity_json,
    })
}
