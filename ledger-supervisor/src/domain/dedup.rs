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

use monitor_common::domain::{LedgerIndex, TransactionHash};
use std::collections::{BTreeMap, HashSet};

/// First-copy-wins deduplication across redundant upstream feeds, bounded by
/// a ring of the most recent ledgers. Only an optimization: the classifier
/// and the store dedup again downstream.
#[derive(Debug)]
pub struct DedupRing {
    max_ledgers: usize,
    transactions_by_ledger: BTreeMap<LedgerIndex, HashSet<TransactionHash>>,
    closed_ledgers: HashSet<LedgerIndex>,
}

impl DedupRing {
    pub fn new(max_ledgers: usize) -> Self {
        Self {
            max_ledgers,
            transactions_by_ledger: BTreeMap::new(),
            closed_ledgers: HashSet::new(),
        }
    }

    /// Record a `(ledger_index, tx_hash)` sighting; `true` for the first
    /// copy, `false` for any further one.
    pub fn record_transaction(&mut self, ledger_index: LedgerIndex, hash: &str) -> bool {
        let first_copy = self
            .transactions_by_ledger
            .entry(ledger_index)
            .or_default()
            .insert(hash.to_string());

        self.evict();

        first_copy
    }

    /// Record a closed-ledger sighting; `true` for the first copy.
    pub fn record_ledger_closed(&mut self, ledger_index: LedgerIndex) -> bool {
        let first_copy = self.closed_ledgers.insert(ledger_index);
        self.evict();
        first_copy
    }

    fn evict(&mut self) {
        while self.transactions_by_ledger.len() > self.max_ledgers {
            let (&oldest, _) = self
                .transactions_by_ledger
                .first_key_value()
                .expect("map is non-empty while over capacity");
            self.transactions_by_ledger.remove(&oldest);
            self.closed_ledgers.remove(&oldest);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::DedupRing;

    #[test]
    fn test_first_copy_wins() {
        let mut ring = DedupRing::new(4);

        assert!(ring.record_transaction(100, "AA"));
        assert!(!ring.record_transaction(100, "AA"));
        assert!(ring.record_transaction(100, "BB"));
        assert!(ring.record_transaction(101, "AA"));

        assert!(ring.record_ledger_closed(100));
        assert!(!ring.record_ledger_closed(100));
    }

    #[test]
    fn test_eviction() {
        let mut ring = DedupRing::new(2);

        ring.record_transaction(100, "AA");
        ring.record_transaction(101, "BB");
        ring.record_transaction(102, "CC");

        // Ledger 100 has been evicted, so its hash is fresh again.
        assert!(ring.record_transaction(100, "AA"));
    }
}
