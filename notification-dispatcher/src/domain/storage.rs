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
use monitor_common::domain::{AlertConfig, ChannelKind, NotificationStatus, UnixMillis};

/// Storage abstraction.
#[trait_variant::make(Send)]
pub trait Storage
where
    Self: Clone + Send + Sync + 'static,
{
    /// Claim due pending notifications via the `pending → in_flight`
    /// compare-and-set; each returned id is owned by this worker only.
    async fn claim_due(&self, limit: u32, now: UnixMillis) -> Result<Vec<i64>, sqlx::Error>;

    /// Assemble the payload by joining the notification with its activity,
    /// NFT, collection and alert configuration.
    async fn load_payload(
        &self,
        notification_id: i64,
    ) -> Result<Option<NotificationPayload>, sqlx::Error>;

    /// `in_flight → sent`.
    async fn mark_sent(&self, notification_id: i64, sent_at: UnixMillis)
    -> Result<(), sqlx::Error>;

    /// `in_flight → pending` with increased retry count and a later
    /// schedule.
    async fn reschedule(
        &self,
        notification_id: i64,
        retry_count: u32,
        scheduled_at: UnixMillis,
        error: &str,
    ) -> Result<(), sqlx::Error>;

    /// `in_flight → failed`, terminally.
    async fn mark_failed(&self, notification_id: i64, error: &str) -> Result<(), sqlx::Error>;

    /// Insert one pending notification per enabled channel of the given
    /// configuration; returns the new ids.
    async fn insert_notifications(
        &self,
        activity_id: i64,
        config: &AlertConfig,
        scheduled_at: UnixMillis,
    ) -> Result<Vec<i64>, sqlx::Error>;

    /// Notification counts by status and channel.
    async fn counts(&self) -> Result<Vec<(NotificationStatus, ChannelKind, u64)>, sqlx::Error>;

    /// Delete notifications finished before the cutoff; returns the number
    /// of deleted rows.
    async fn delete_finished_before(&self, cutoff: UnixMillis) -> Result<u64, sqlx::Error>;

    /// Reset in-flight rows whose worker apparently died back to pending;
    /// returns the number of reset rows.
    async fn reset_stale_in_flight(&self, stale_before: UnixMillis) -> Result<u64, sqlx::Error>;
}
