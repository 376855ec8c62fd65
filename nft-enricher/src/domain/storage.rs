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

use monitor_common::domain::{TokenId, UnixMillis};
use serde_json::Value;

/// Storage abstraction.
#[trait_variant::make(Send)]
pub trait Storage
where
    Self: Clone + Send + Sync + 'static,
{
    /// Claim due pending tasks, bounded by `limit`. Claiming pushes
    /// `next_retry_at` forward by the lease duration, which acts as a
    /// TTL'd lock across replicas.
    async fn claim_due_tasks(
        &self,
        max_retry_count: u32,
        limit: u32,
        lease_millis: u64,
    ) -> Result<Vec<EnrichmentTask>, sqlx::Error>;

    /// Enqueue a task unless one already exists.
    async fn insert_task(&self, nft_id: &TokenId) -> Result<(), sqlx::Error>;

    /// The NFT fields relevant for enrichment.
    async fn get_nft(&self, nft_id: &TokenId) -> Result<Option<NftToEnrich>, sqlx::Error>;

    /// Record fetched metadata on the NFT row; the metadata is immutable
    /// from here on.
    async fn save_metadata(
        &self,
        nft_id: &TokenId,
        document: &Value,
        traits: &Value,
        image_url: Option<&str>,
        name: Option<&str>,
        fetched_at: UnixMillis,
    ) -> Result<(), sqlx::Error>;

    /// Record a terminal metadata fetch error on the NFT row.
    async fn save_metadata_error(&self, nft_id: &TokenId, error: &str) -> Result<(), sqlx::Error>;

    /// Record the cached image URL on the NFT row.
    async fn save_cached_image(
        &self,
        nft_id: &TokenId,
        cached_image_url: &str,
        fetched_at: UnixMillis,
    ) -> Result<(), sqlx::Error>;

    /// Record an image fetch error on the NFT row.
    async fn save_image_error(&self, nft_id: &TokenId, error: &str) -> Result<(), sqlx::Error>;

    /// Mark a task completed.
    async fn complete_task(&self, nft_id: &TokenId) -> Result<(), sqlx::Error>;

    /// Reschedule a task for a later retry.
    async fn reschedule_task(
        &self,
        nft_id: &TokenId,
        retry_count: u32,
        next_retry_at: UnixMillis,
    ) -> Result<(), sqlx::Error>;

    /// Mark a task failed for good.
    async fn fail_task(&self, nft_id: &TokenId, retry_count: u32) -> Result<(), sqlx::Error>;

    /// Task counts by status: `(pending, completed, failed)`.
    async fn task_counts(&self) -> Result<(u64, u64, u64), sqlx::Error>;
}

/// A claimed enrichment task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentTask {
    pub nft_id: TokenId,
    pub retry_count: u32,
}

/// The NFT fields the enricher works with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NftToEnrich {
    pub nft_id: TokenId,
    pub metadata_uri: Option<String>,
    pub metadata_fetched_at: Option<UnixMillis>,
    pub cached_image_url: Option<String>,
}
