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

use crate::domain::{ActivityBatcher, classify, storage::Storage};
use anyhow::{Context, bail};
use fastrace::trace;
use futures::{Stream, StreamExt};
use log::{debug, info, warn};
use metrics::{counter, gauge};
use monitor_common::domain::{
    ActivityIndexed, EnrichmentRequested, LedgerClosed, LedgerSyncStatus, Publisher,
    RawTransaction, now_unix_millis,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    num::NonZeroUsize,
    pin::pin,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::{select, signal::unix::Signal, time::interval};

const FLUSH_CHECK_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Batch size triggering a flush.
    pub batch_size: usize,

    /// Batch age triggering a flush.
    #[serde(with = "humantime_serde")]
    pub batch_max_age: Duration,

    /// Capacity of the dedup LRU; should be at least 4x the per-ledger
    /// transaction count.
    pub dedup_cache_size: NonZeroUsize,
}

/// Counters exposed by [ActivityIndexer::stats].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexerStats {
    pub queue_size: usize,
    pub active_batches: usize,
    pub processed_count: u64,
    pub dedup_cache_size: usize,
}

/// Classifies raw transactions, dedupes and persists them in batches, and
/// publishes events for committed rows.
#[derive(Clone)]
pub struct ActivityIndexer<S, P> {
    batcher: Arc<Mutex<ActivityBatcher>>,
    pending_ledgers: Arc<Mutex<Vec<LedgerSyncStatus>>>,
    active_batches: Arc<AtomicUsize>,
    storage: S,
    publisher: P,
}

impl<S, P> ActivityIndexer<S, P>
where
    S: Storage,
    P: Publisher,
{
    pub fn new(config: &Config, storage: S, publisher: P) -> Self {
        Self {
            batcher: Arc::new(Mutex::new(ActivityBatcher::new(
                config.batch_size,
                config.batch_max_age,
                config.dedup_cache_size,
            ))),
            pending_ledgers: Arc::new(Mutex::new(Vec::new())),
            active_batches: Arc::new(AtomicUsize::new(0)),
            storage,
            publisher,
        }
    }

    /// Classify one raw transaction and enqueue the resulting activities;
    /// never blocks.
    pub fn ingest(&self, raw: &RawTransaction) {
        let activities = classify(raw);

        let mut batcher = self.batcher.lock();
        for activity in activities {
            if batcher.push(activity) {
                counter!("indexer_activities_total").increment(1);
            } else {
                counter!("indexer_duplicates_total").increment(1);
            }
        }
    }

    /// Record a closed ledger for the sync status advance of the next flush.
    pub fn record_ledger_closed(&self, ledger: LedgerClosed) {
        self.pending_ledgers.lock().push(LedgerSyncStatus {
            ledger_index: ledger.ledger_index,
            ledger_hash: ledger.ledger_hash,
            close_time: ledger.close_time,
            transaction_count: ledger.transaction_count,
            processed_at: now_unix_millis(),
        });
    }

    /// Flush the current batch to persistence immediately.
    pub async fn force_flush(&self) -> anyhow::Result<()> {
        self.flush().await
    }

    pub fn stats(&self) -> IndexerStats {
        let batcher = self.batcher.lock().stats();

        IndexerStats {
            queue_size: batcher.queue_size,
            active_batches: self.active_batches.load(Ordering::Relaxed),
            processed_count: batcher.processed_count,
            dedup_cache_size: batcher.dedup_cache_size,
        }
    }

    fn should_flush(&self) -> bool {
        self.batcher.lock().should_flush() || !self.pending_ledgers.lock().is_empty()
    }

    #[trace]
    async fn flush(&self) -> anyhow::Result<()> {
        let batch = self.batcher.lock().take_batch();
        let ledgers = std::mem::take(&mut *self.pending_ledgers.lock());

        if batch.is_empty() && ledgers.is_empty() {
            return Ok(());
        }

        self.active_batches.fetch_add(1, Ordering::Relaxed);
        let result = self.storage.save_batch(&batch, &ledgers).await;
        self.active_batches.fetch_sub(1, Ordering::Relaxed);

        let saved = match result {
            Ok(saved) => saved,

            Err(error) => {
                // Keep the batch for the next flush; the uniqueness
                // constraint makes replays harmless.
                self.batcher.lock().restore_batch(batch);
                self.pending_ledgers.lock().extend(ledgers);
                return Err(error).context("save activity batch");
            }
        };

        gauge!("indexer_batch_size").set(saved.len() as f64);
        debug!(
            batch_len = batch.len(),
            saved_len = saved.len();
            "activity batch flushed"
        );

        // Events are only published for committed rows, so every consumer
        // can resolve the carried ids.
        for activity in saved {
            let activity_indexed = ActivityIndexed {
                activity_id: activity.activity_id,
                ledger_index: activity.ledger_index,
                activity_type: activity.activity_type,
                nft_id: activity.nft_id.clone(),
            };
            if let Err(error) = self.publisher.publish(&activity_indexed).await {
                warn!(activity_id = activity.activity_id, error:%; "cannot publish ActivityIndexed");
            }

            if activity.needs_enrichment {
                if let Some(nft_id) = activity.nft_id {
                    let enrichment_requested = EnrichmentRequested { nft_id };
                    if let Err(error) = self.publisher.publish(&enrichment_requested).await {
                        warn!(error:%; "cannot publish EnrichmentRequested");
                    }
                }
            }
        }

        Ok(())
    }
}

/// Consume the supervisor streams until SIGTERM, flushing a final batch on
/// shutdown.
pub async fn run<S, P>(
    config: Config,
    transactions: impl Stream<Item = RawTransaction>,
    ledgers: impl Stream<Item = LedgerClosed>,
    storage: S,
    publisher: P,
    mut sigterm: Signal,
) -> anyhow::Result<()>
where
    S: Storage,
    P: Publisher,
{
    let indexer = ActivityIndexer::new(&config, storage, publisher);
    info!(batch_size = config.batch_size; "starting activity indexing");

    let mut transactions = pin!(transactions);
    let mut ledgers = pin!(ledgers);
    let mut flush_ticker = interval(FLUSH_CHECK_INTERVAL);

    loop {
        select! {
            transaction = transactions.next() => {
                let Some(transaction) = transaction else {
                    bail!("transaction stream ended");
                };

                indexer.ingest(&transaction);

                if indexer.batcher.lock().should_flush() {
                    if let Err(error) = indexer.flush().await {
                        warn!(error:?; "flush failed, batch kept");
                    }
                }
            }

            ledger = ledgers.next() => {
                let Some(ledger) = ledger else {
                    bail!("ledger stream ended");
                };

                indexer.record_ledger_closed(ledger);
            }

            _ = flush_ticker.tick() => {
                if indexer.should_flush() {
                    if let Err(error) = indexer.flush().await {
                        warn!(error:?; "flush failed, batch kept");
                    }
                }
            }

            _ = sigterm.recv() => {
                warn!("SIGTERM received");

                if let Err(error) = indexer.force_flush().await {
                    warn!(error:?; "final flush failed");
                }

                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        application::{ActivityIndexer, Config},
        domain::{
            ClassifiedActivity,
            storage::{SavedActivity, Storage},
        },
    };
    use futures::StreamExt;
    use monitor_common::{
        domain::{
            ActivityIndexed, ActivityType, EnrichmentRequested, LedgerSyncStatus, RawTransaction,
            Subscriber,
        },
        infra::pub_sub::in_mem::InMemPubSub,
    };
    use parking_lot::Mutex;
    use serde_json::json;
    use std::{
        collections::HashSet,
        num::NonZeroUsize,
        pin::pin,
        sync::Arc,
        time::Duration,
    };

    const NFT_ID: &str = "000827103B94ECBB7BF0A0A6ED62B3607801A27B65D4679A16E5DA9C00000D9A";

    fn config() -> Config {
        Config {
            batch_size: 100,
            batch_max_age: Duration::from_secs(2),
            dedup_cache_size: NonZeroUsize::new(1_024).unwrap(),
        }
    }

    fn mint_raw(hash: &str) -> RawTransaction {
        RawTransaction {
            hash: hash.to_string(),
            ledger_index: 100,
            engine_result: "tesSUCCESS".to_string(),
            close_time: 1_672_531_200_000,
            transaction: json!({
                "TransactionType": "NFTokenMint",
                "Account": "rAlice11111111111111111111111111111",
                "URI": "697066733A2F2F6261666B726569",
                "hash": hash,
            }),
            meta: json!({
                "TransactionResult": "tesSUCCESS",
                "nftoken_id": NFT_ID,
            }),
        }
    }

    /// Mock storage emulating the uniqueness constraint on
    /// `(transaction_hash, activity_type, nft_id)`.
    #[derive(Debug, Clone, Default)]
    struct MockStorage {
        seen: Arc<Mutex<HashSet<String>>>,
        next_id: Arc<Mutex<i64>>,
        ledgers: Arc<Mutex<Vec<LedgerSyncStatus>>>,
    }

    impl Storage for MockStorage {
        async fn save_batch(
            &self,
            batch: &[ClassifiedActivity],
            completed_ledgers: &[LedgerSyncStatus],
        ) -> Result<Vec<SavedActivity>, sqlx::Error> {
            self.ledgers.lock().extend_from_slice(completed_ledgers);

            let mut saved = Vec::new();
            for classified in batch {
                let activity = &classified.activity;
                let key = format!(
                    "{}:{}:{:?}",
                    activity.transaction_hash, activity.activity_type, activity.nft_id
                );
                if !self.seen.lock().insert(key) {
                    continue;
                }

                let mut next_id = self.next_id.lock();
                *next_id += 1;

                saved.push(SavedActivity {
                    activity_id: *next_id,
                    ledger_index: activity.ledger_index,
                    activity_type: activity.activity_type,
                    nft_id: activity.nft_id.clone(),
                    needs_enrichment: classified
                        .nft
                        .as_ref()
                        .is_some_and(|nft| nft.metadata_uri.is_some()),
                });
            }

            Ok(saved)
        }

        async fn get_activity_count(&self) -> Result<u64, sqlx::Error> {
            Ok(self.seen.lock().len() as u64)
        }
    }

    #[tokio::test]
    async fn test_ingest_flush_publish() {
        let storage = MockStorage::default();
        let pub_sub = InMemPubSub::default();
        let indexer = ActivityIndexer::new(&config(), storage.clone(), pub_sub.clone());

        let mut activity_events = pin!(pub_sub.subscribe::<ActivityIndexed>());
        let mut enrichment_events = pin!(pub_sub.subscribe::<EnrichmentRequested>());

        indexer.ingest(&mint_raw(&"AB".repeat(32)));
        indexer.force_flush().await.expect("flush succeeds");

        let event = activity_events
            .next()
            .await
            .expect("event published")
            .expect("event deserializes");
        assert_eq!(event.activity_type, ActivityType::Mint);
        assert_eq!(event.activity_id, 1);

        // The mint carries a URI, so enrichment was requested.
        let event = enrichment_events
            .next()
            .await
            .expect("event published")
            .expect("event deserializes");
        assert_eq!(event.nft_id.as_str(), NFT_ID);
    }

    #[tokio::test]
    async fn test_ingest_dedups_redundant_copies() {
        let storage = MockStorage::default();
        let indexer = ActivityIndexer::new(&config(), storage.clone(), InMemPubSub::default());

        // The same transaction arriving from two feeds.
        let raw = mint_raw(&"AB".repeat(32));
        indexer.ingest(&raw);
        indexer.ingest(&raw);
        indexer.force_flush().await.expect("flush succeeds");

        assert_eq!(storage.get_activity_count().await.unwrap(), 1);

        let stats = indexer.stats();
        assert_eq!(stats.processed_count, 1);
        assert_eq!(stats.queue_size, 0);
    }
}
