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

use activity_indexer::domain::{ClassifiedActivity, storage::SavedActivity};
use alert_matcher::domain::{MatchActivity, MatchNft};
use monitor_common::domain::{
    ActivityType, AlertConfig, ChannelKind, LedgerIndex, LedgerSyncStatus, NftActivity,
    NotificationChannel, NotificationStatus, TokenId, UnixMillis,
};
use notification_dispatcher::domain::{NotificationPayload, PayloadActivity, PayloadNft};
use parking_lot::Mutex;
use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::Arc,
};

/// An in-memory stand-in for the relational store, honoring the same
/// uniqueness constraints. Shared by all stages of an in-process pipeline
/// under test.
#[derive(Debug, Clone, Default)]
pub struct InMemDb {
    state: Arc<Mutex<State>>,
}

#[derive(Debug, Default)]
struct State {
    collections: Vec<CollectionRow>,
    nfts: Vec<NftRow>,
    activities: Vec<ActivityRow>,
    activity_keys: HashSet<(String, ActivityType, Option<String>)>,
    synced_ledgers: BTreeSet<LedgerIndex>,
    enrichment_tasks: HashSet<String>,
    alert_configs: Vec<AlertConfig>,
    notifications: Vec<NotificationRow>,
    matcher_cursor: i64,
}

#[derive(Debug, Clone)]
struct CollectionRow {
    id: i64,
    issuer_address: String,
    taxon: u32,
    name: Option<String>,
}

#[derive(Debug, Clone)]
struct NftRow {
    nft_id: TokenId,
    collection_id: i64,
    metadata_uri: Option<String>,
    metadata_fetched_at: Option<UnixMillis>,
    traits: Option<serde_json::Value>,
    name: Option<serde_json::Value>,
    image_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ActivityRow {
    pub id: i64,
    pub activity: NftActivity,
}

#[derive(Debug, Clone)]
pub struct NotificationRow {
    pub id: i64,
    pub user_id: String,
    pub alert_config_id: uuid::Uuid,
    pub activity_id: i64,
    pub channel: NotificationChannel,
    pub status: NotificationStatus,
    pub retry_count: u32,
    pub scheduled_at: UnixMillis,
    pub error_message: Option<String>,
}

impl InMemDb {
    pub fn seed_alert_config(&self, config: AlertConfig) {
        self.state.lock().alert_configs.push(config);
    }

    pub fn set_nft_traits(&self, nft_id: &TokenId, traits: serde_json::Value) {
        let mut state = self.state.lock();
        let nft = state
            .nfts
            .iter_mut()
            .find(|nft| &nft.nft_id == nft_id)
            .expect("NFT exists");
        nft.traits = Some(traits);
        nft.metadata_fetched_at = Some(1);
    }

    pub fn collection_id(&self, issuer_address: &str, taxon: u32) -> Option<i64> {
        self.state
            .lock()
            .collections
            .iter()
            .find(|collection| {
                collection.issuer_address == issuer_address && collection.taxon == taxon
            })
            .map(|collection| collection.id)
    }

    pub fn activities(&self) -> Vec<ActivityRow> {
        self.state.lock().activities.clone()
    }

    pub fn notifications(&self) -> Vec<NotificationRow> {
        self.state.lock().notifications.clone()
    }

    pub fn synced_ledgers(&self) -> Vec<LedgerIndex> {
        self.state.lock().synced_ledgers.iter().copied().collect()
    }

    pub fn enrichment_task_count(&self) -> usize {
        self.state.lock().enrichment_tasks.len()
    }
}

impl State {
    fn upsert_collection(&mut self, issuer_address: &str, taxon: u32) -> i64 {
        if let Some(collection) = self
            .collections
            .iter()
            .find(|collection| {
                collection.issuer_address == issuer_address && collection.taxon == taxon
            })
        {
            return collection.id;
        }

        let id = self.collections.len() as i64 + 1;
        self.collections.push(CollectionRow {
            id,
            issuer_address: issuer_address.to_string(),
            taxon,
            name: None,
        });
        id
    }
}

impl activity_indexer::domain::storage::Storage for InMemDb {
    async fn save_batch(
        &self,
        batch: &[ClassifiedActivity],
        completed_ledgers: &[LedgerSyncStatus],
    ) -> Result<Vec<SavedActivity>, sqlx::Error> {
        let mut state = self.state.lock();
        let mut saved = Vec::new();

        for classified in batch {
            let mut needs_enrichment = false;

            if let Some(upsert) = &classified.nft {
                let collection_id = state.upsert_collection(&upsert.issuer_address, upsert.taxon);

                match state
                    .nfts
                    .iter_mut()
                    .find(|nft| nft.nft_id == upsert.nft_id)
                {
                    Some(nft) => {
                        if nft.metadata_uri.is_none() {
                            nft.metadata_uri = upsert.metadata_uri.clone();
                        }
                        needs_enrichment =
                            nft.metadata_fetched_at.is_none() && nft.metadata_uri.is_some();
                    }

                    None => {
                        state.nfts.push(NftRow {
                            nft_id: upsert.nft_id.clone(),
                            collection_id,
                            metadata_uri: upsert.metadata_uri.clone(),
                            metadata_fetched_at: None,
                            traits: None,
                            name: None,
                            image_url: None,
                        });
                        needs_enrichment = upsert.metadata_uri.is_some();
                    }
                }
            }

            let activity = &classified.activity;
            let key = (
                activity.transaction_hash.clone(),
                activity.activity_type,
                activity.nft_id.as_ref().map(|id| id.as_str().to_string()),
            );

            // The uniqueness constraint: conflicts are silent no-ops.
            if !state.activity_keys.insert(key) {
                continue;
            }

            let id = state.activities.len() as i64 + 1;
            state.activities.push(ActivityRow {
                id,
                activity: activity.clone(),
            });

            if needs_enrichment {
                if let Some(nft_id) = &activity.nft_id {
                    state
                        .enrichment_tasks
                        .insert(nft_id.as_str().to_string());
                }
            }

            saved.push(SavedActivity {
                activity_id: id,
                ledger_index: activity.ledger_index,
                activity_type: activity.activity_type,
                nft_id: activity.nft_id.clone(),
                needs_enrichment,
            });
        }

        for ledger in completed_ledgers {
            state.synced_ledgers.insert(ledger.ledger_index);
        }

        Ok(saved)
    }

    async fn get_activity_count(&self) -> Result<u64, sqlx::Error> {
        Ok(self.state.lock().activities.len() as u64)
    }
}

impl alert_matcher::domain::storage::Storage for InMemDb {
    async fn get_cursor(&self) -> Result<i64, sqlx::Error> {
        Ok(self.state.lock().matcher_cursor)
    }

    async fn activities_after(
        &self,
        cursor: i64,
        limit: u32,
    ) -> Result<Vec<MatchActivity>, sqlx::Error> {
        let state = self.state.lock();

        Ok(state
            .activities
            .iter()
            .filter(|row| row.id > cursor)
            .take(limit as usize)
            .map(|row| {
                let nft = row.activity.nft_id.as_ref().and_then(|nft_id| {
                    state
                        .nfts
                        .iter()
                        .find(|nft| &nft.nft_id == nft_id)
                        .map(|nft| MatchNft {
                            collection_id: Some(nft.collection_id),
                            traits: nft.traits.clone(),
                        })
                });

                MatchActivity {
                    activity_id: row.id,
                    activity_type: row.activity.activity_type,
                    price_drops: row.activity.price_drops.clone(),
                    nft,
                }
            })
            .collect())
    }

    async fn candidate_configs(
        &self,
        activity_type: ActivityType,
        collection_id: Option<i64>,
    ) -> Result<Vec<AlertConfig>, sqlx::Error> {
        Ok(self
            .state
            .lock()
            .alert_configs
            .iter()
            .filter(|config| {
                config.is_active
                    && config.activity_types.contains(&activity_type)
                    && (config.collection_id.is_none() || config.collection_id == collection_id)
            })
            .cloned()
            .collect())
    }

    async fn record_matches(
        &self,
        activity_id: i64,
        matched_configs: &[AlertConfig],
        scheduled_at: UnixMillis,
    ) -> Result<Vec<i64>, sqlx::Error> {
        let mut state = self.state.lock();
        let mut ids = Vec::new();

        for config in matched_configs {
            for channel in &config.notification_channels {
                let id = state.notifications.len() as i64 + 1;
                state.notifications.push(NotificationRow {
                    id,
                    user_id: config.user_id.clone(),
                    alert_config_id: config.id,
                    activity_id,
                    channel: channel.clone(),
                    status: NotificationStatus::Pending,
                    retry_count: 0,
                    scheduled_at,
                    error_message: None,
                });
                ids.push(id);
            }
        }

        state.matcher_cursor = state.matcher_cursor.max(activity_id);

        Ok(ids)
    }
}

impl notification_dispatcher::domain::storage::Storage for InMemDb {
    async fn claim_due(&self, limit: u32, now: UnixMillis) -> Result<Vec<i64>, sqlx::Error> {
        let mut state = self.state.lock();
        let mut claimed = Vec::new();

        for notification in state.notifications.iter_mut() {
            if claimed.len() >= limit as usize {
                break;
            }
            if notification.status == NotificationStatus::Pending
                && notification.scheduled_at <= now
            {
                notification.status = NotificationStatus::InFlight;
                claimed.push(notification.id);
            }
        }

        Ok(claimed)
    }

    async fn load_payload(
        &self,
        notification_id: i64,
    ) -> Result<Option<NotificationPayload>, sqlx::Error> {
        let state = self.state.lock();

        let Some(notification) = state
            .notifications
            .iter()
            .find(|notification| notification.id == notification_id)
        else {
            return Ok(None);
        };

        let activity_row = state
            .activities
            .iter()
            .find(|row| row.id == notification.activity_id)
            .expect("notification references a committed activity");
        let activity = &activity_row.activity;

        let nft = activity.nft_id.as_ref().and_then(|nft_id| {
            state.nfts.iter().find(|nft| &nft.nft_id == nft_id).map(|nft| {
                let collection_name = state
                    .collections
                    .iter()
                    .find(|collection| collection.id == nft.collection_id)
                    .and_then(|collection| collection.name.clone());

                PayloadNft {
                    nft_id: nft.nft_id.as_str().to_string(),
                    name: nft.name.as_ref().and_then(|name| {
                        name.as_str().map(str::to_string)
                    }),
                    description: None,
                    image_url: nft.image_url.clone(),
                    collection_name,
                }
            })
        });

        let alert_name = state
            .alert_configs
            .iter()
            .find(|config| config.id == notification.alert_config_id)
            .map(|config| config.name.clone())
            .unwrap_or_default();

        Ok(Some(NotificationPayload {
            notification_id,
            user_id: notification.user_id.clone(),
            alert_config_id: notification.alert_config_id,
            alert_name,
            channel: notification.channel.clone(),
            retry_count: notification.retry_count,
            activity: PayloadActivity {
                activity_type: activity.activity_type,
                transaction_hash: activity.transaction_hash.clone(),
                ledger_index: activity.ledger_index,
                from_address: activity.from_address.clone(),
                to_address: activity.to_address.clone(),
                price_drops: activity.price_drops.clone(),
                currency: activity.currency.clone(),
                issuer: activity.issuer.clone(),
                timestamp: activity.timestamp,
            },
            nft,
        }))
    }

    async fn mark_sent(
        &self,
        notification_id: i64,
        _sent_at: UnixMillis,
    ) -> Result<(), sqlx::Error> {
        self.update_notification(notification_id, |notification| {
            notification.status = NotificationStatus::Sent;
            notification.error_message = None;
        });
        Ok(())
    }

    async fn reschedule(
        &self,
        notification_id: i64,
        retry_count: u32,
        scheduled_at: UnixMillis,
        error: &str,
    ) -> Result<(), sqlx::Error> {
        self.update_notification(notification_id, |notification| {
            notification.status = NotificationStatus::Pending;
            notification.retry_count = retry_count;
            notification.scheduled_at = scheduled_at;
            notification.error_message = Some(error.to_string());
        });
        Ok(())
    }

    async fn mark_failed(&self, notification_id: i64, error: &str) -> Result<(), sqlx::Error> {
        self.update_notification(notification_id, |notification| {
            notification.status = NotificationStatus::Failed;
            notification.error_message = Some(error.to_string());
        });
        Ok(())
    }

    async fn insert_notifications(
        &self,
        activity_id: i64,
        config: &AlertConfig,
        scheduled_at: UnixMillis,
    ) -> Result<Vec<i64>, sqlx::Error> {
        alert_matcher::domain::storage::Storage::record_matches(
            self,
            activity_id,
            std::slice::from_ref(config),
            scheduled_at,
        )
        .await
    }

    async fn counts(&self) -> Result<Vec<(NotificationStatus, ChannelKind, u64)>, sqlx::Error> {
        let state = self.state.lock();
        let mut counts: HashMap<(NotificationStatus, ChannelKind), u64> = HashMap::new();

        for notification in &state.notifications {
            *counts
                .entry((notification.status, notification.channel.kind()))
                .or_default() += 1;
        }

        Ok(counts
            .into_iter()
            .map(|((status, kind), count)| (status, kind, count))
            .collect())
    }

    async fn delete_finished_before(&self, cutoff: UnixMillis) -> Result<u64, sqlx::Error> {
        let mut state = self.state.lock();
        let before = state.notifications.len();

        state.notifications.retain(|notification| {
            !(matches!(
                notification.status,
                NotificationStatus::Sent | NotificationStatus::Failed
            ) && notification.scheduled_at < cutoff)
        });

        Ok((before - state.notifications.len()) as u64)
    }

    async fn reset_stale_in_flight(&self, stale_before: UnixMillis) -> Result<u64, sqlx::Error> {
        let mut state = self.state.lock();
        let mut reset = 0;

        for notification in state.notifications.iter_mut() {
            if notification.status == NotificationStatus::InFlight
                && notification.scheduled_at < stale_before
            {
                notification.status = NotificationStatus::Pending;
                reset += 1;
            }
        }

        Ok(reset)
    }
}

impl InMemDb {
    fn update_notification(&self, notification_id: i64, update: impl FnOnce(&mut NotificationRow)) {
        let mut state = self.state.lock();
        let notification = state
            .notifications
            .iter_mut()
            .find(|notification| notification.id == notification_id)
            .expect("notification exists");
        update(notification);
    }
}
