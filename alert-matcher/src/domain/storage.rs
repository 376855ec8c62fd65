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

use crate::domain::MatchActivity;
use monitor_common::domain::{ActivityType, AlertConfig, UnixMillis};

/// Storage abstraction.
#[trait_variant::make(Send)]
pub trait Storage
where
    Self: Clone + Send + Sync + 'static,
{
    /// The highest activity id the matcher has evaluated.
    async fn get_cursor(&self) -> Result<i64, sqlx::Error>;

    /// Committed activities after the cursor in id order, joined with their
    /// NFT fields, bounded by `limit`.
    async fn activities_after(
        &self,
        cursor: i64,
        limit: u32,
    ) -> Result<Vec<MatchActivity>, sqlx::Error>;

    /// Active configurations that could match: activity type contained and
    /// collection filter absent or equal.
    async fn candidate_configs(
        &self,
        activity_type: ActivityType,
        collection_id: Option<i64>,
    ) -> Result<Vec<AlertConfig>, sqlx::Error>;

    /// In one transaction: insert one pending notification per enabled
    /// channel of each matched configuration and advance the cursor.
    /// Returns the new notification ids.
    async fn record_matches(
        &self,
        activity_id: i64,
        matched_configs: &[AlertConfig],
        scheduled_at: UnixMillis,
    ) -> Result<Vec<i64>, sqlx::Error>;
}
