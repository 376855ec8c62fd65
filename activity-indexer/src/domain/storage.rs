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
use monitor_common::domain::{ActivityType, LedgerIndex, LedgerSyncStatus, TokenId};

/// Storage abstraction.
#[trait_variant::make(Send)]
pub trait Storage
where
    Self: Clone + Send + Sync + 'static,
{
    /// Persist a batch in a single transaction: upsert collections, upsert
    /// NFTs, insert activities (conflicts skipped silently), enqueue
    /// enrichment tasks for NFTs without fetched metadata and advance the
    /// ledger sync status. Returns one entry per newly inserted activity.
    async fn save_batch(
        &self,
        batch: &[ClassifiedActivity],
        completed_ledgers: &[LedgerSyncStatus],
    ) -> Result<Vec<SavedActivity>, sqlx::Error>;

    /// Get the number of stored activities.
    async fn get_activity_count(&self) -> Result<u64, sqlx::Error>;
}

/// A newly inserted activity row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedActivity {
    pub activity_id: i64,
    pub ledger_index: LedgerIndex,
    pub activity_type: ActivityType,
    pub nft_id: Option<TokenId>,

    /// Whether the NFT lacks fetched metadata and has a URI to fetch, i.e.
    /// an enrichment task was enqueued.
    pub needs_enrichment: bool,
}
