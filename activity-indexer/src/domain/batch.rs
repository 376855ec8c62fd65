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

use crate::domain::ClassifiedActivity;
use lru::LruCache;
use monitor_common::domain::NftActivity;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::{
    num::NonZeroUsize,
    time::{Duration, Instant},
};

/// Accumulates classified activities into batches and drops duplicates with
/// an LRU keyed by `sha256(tx_hash ‖ activity_type ‖ nft_id)`. The LRU is an
/// optimization only; the uniqueness constraint in the store is the
/// authority.
#[derive(Debug)]
pub struct ActivityBatcher {
    dedup: LruCache<[u8; 32], ()>,
    batch: Vec<ClassifiedActivity>,
    batch_started_at: Option<Instant>,
    max_batch_size: usize,
    max_batch_age: Duration,
    processed_count: u64,
}

/// Counters exposed by [ActivityBatcher::stats].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatcherStats {
    pub queue_size: usize,
    pub processed_count: u64,
    pub dedup_cache_size: usize,
}

impl ActivityBatcher {
    pub fn new(max_batch_size: usize, max_batch_age: Duration, dedup_capacity: NonZeroUsize) -> Self {
        Self {
            dedup: LruCache::new(dedup_capacity),
            batch: Vec::with_capacity(max_batch_size),
            batch_started_at: None,
            max_batch_size,
            max_batch_age,
            processed_count: 0,
        }
    }

    /// Add an activity unless it is a duplicate; returns whether it was
    /// added.
    pub fn push(&mut self, activity: ClassifiedActivity) -> bool {
        let key = dedup_key(&activity.activity);
        if self.dedup.put(key, ()).is_some() {
            return false;
        }

        if self.batch.is_empty() {
            self.batch_started_at = Some(Instant::now());
        }
        self.batch.push(activity);
        self.processed_count += 1;

        true
    }

    /// Whether the batch reached its size or age trigger.
    pub fn should_flush(&self) -> bool {
        if self.batch.len() >= self.max_batch_size {
            return true;
        }

        self.batch_started_at
            .is_some_and(|started_at| started_at.elapsed() >= self.max_batch_age)
    }

    /// Take the current batch, leaving an empty one behind.
    pub fn take_batch(&mut self) -> Vec<ClassifiedActivity> {
        self.batch_started_at = None;
        std::mem::take(&mut self.batch)
    }

    /// Put a batch back after a failed flush; the items keep their dedup
    /// marks.
    pub fn restore_batch(&mut self, mut batch: Vec<ClassifiedActivity>) {
        if self.batch_started_at.is_none() {
            self.batch_started_at = Some(Instant::now());
        }
        batch.extend(self.batch.drain(..));
        self.batch = batch;
    }

    pub fn stats(&self) -> BatcherStats {
        BatcherStats {
            queue_size: self.batch.len(),
            processed_count: self.processed_count,
            dedup_cache_size: self.dedup.len(),
        }
    }
}

fn dedup_key(activity: &NftActivity) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(activity.transaction_hash.as_bytes());
    hasher.update(activity.activity_type.as_str().as_bytes());
    if let Some(nft_id) = &activity.nft_id {
        hasher.update(nft_id.as_str().as_bytes());
    }

    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use crate::domain::{ActivityBatcher, ClassifiedActivity};
    use monitor_common::domain::{ActivityType, NftActivity, TokenId};
    use std::{num::NonZeroUsize, time::Duration};

    fn activity(hash: &str, activity_type: ActivityType) -> ClassifiedActivity {
        ClassifiedActivity {
            activity: NftActivity {
                nft_id: Some(
                    TokenId::try_from(format!("{:0>64}", "ABC")).expect("token id is valid"),
                ),
                transaction_hash: hash.to_string(),
                ledger_index: 100,
                activity_type,
                from_address: None,
                to_address: None,
                price_drops: None,
                currency: None,
                issuer: None,
                timestamp: 0,
                metadata: serde_json::json!({}),
            },
            nft: None,
        }
    }

    fn batcher(max_batch_size: usize) -> ActivityBatcher {
        ActivityBatcher::new(
            max_batch_size,
            Duration::from_secs(2),
            NonZeroUsize::new(128).unwrap(),
        )
    }

    #[test]
    fn test_dedup() {
        let mut batcher = batcher(100);

        assert!(batcher.push(activity("A1", ActivityType::Mint)));
        assert!(!batcher.push(activity("A1", ActivityType::Mint)));

        // Same hash with a different type is distinct.
        assert!(batcher.push(activity("A1", ActivityType::Burn)));

        assert_eq!(batcher.stats().queue_size, 2);
    }

    #[test]
    fn test_size_trigger() {
        let mut batcher = batcher(2);

        batcher.push(activity("A1", ActivityType::Mint));
        assert!(!batcher.should_flush());

        batcher.push(activity("B2", ActivityType::Mint));
        assert!(batcher.should_flush());

        let batch = batcher.take_batch();
        assert_eq!(batch.len(), 2);
        assert!(!batcher.should_flush());
    }

    #[test]
    fn test_age_trigger() {
        let mut batcher =
            ActivityBatcher::new(100, Duration::ZERO, NonZeroUsize::new(128).unwrap());

        assert!(!batcher.should_flush());
        batcher.push(activity("A1", ActivityType::Mint));
        assert!(batcher.should_flush());
    }

    #[test]
    fn test_restore_batch() {
        let mut batcher = batcher(100);

        batcher.push(activity("A1", ActivityType::Mint));
        let batch = batcher.take_batch();
        batcher.push(activity("B2", ActivityType::Mint));

        batcher.restore_batch(batch);
        let batch = batcher.take_batch();
        let hashes = batch
            .iter()
            .map(|a| a.activity.transaction_hash.as_str())
            .collect::<Vec<_>>();
        assert_eq!(hashes, ["A1", "B2"]);
    }
}
