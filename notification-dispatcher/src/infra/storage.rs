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

use crate::domain::{self, NotificationPayload, PayloadActivity, PayloadNft};
use bigdecimal::BigDecimal;
use fastrace::trace;
use indoc::indoc;
use monitor_common::{
    domain::{
        ActivityType, AlertConfig, ChannelKind, NotificationChannel, NotificationStatus,
        UnixMillis,
    },
    infra::pool::PostgresPool,
};
use sqlx::types::Json;
use uuid::Uuid;

/// Postgres storage implementation.
#[derive(Debug, Clone)]
pub struct Storage {
    pool: PostgresPool,
}

impl Storage {
    pub fn new(pool: PostgresPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PayloadRow {
    notification_id: i64,
    user_id: String,
    alert_config_id: Uuid,
    alert_name: String,
    channel: Json<NotificationChannel>,
    retry_count: i32,
    activity_type: ActivityType,
    transaction_hash: String,
    ledger_index: i64,
    from_address: Option<String>,
    to_address: Option<String>,
    price_drops: Option<BigDecimal>,
    currency: Option<String>,
    issuer: Option<String>,
    activity_timestamp: i64,
    nft_id: Option<String>,
    nft_name: Option<String>,
    nft_description: Option<String>,
    nft_image_url: Option<String>,
    collection_name: Option<String>,
}

impl From<PayloadRow> for NotificationPayload {
    fn from(row: PayloadRow) -> Self {
        let nft = row.nft_id.map(|nft_id| PayloadNft {
            nft_id: nft_id.trim().to_string(),
            name: row.nft_name,
            description: row.nft_description,
            image_url: row.nft_image_url,
            collection_name: row.collection_name,
        });

        NotificationPayload {
            notification_id: row.notification_id,
            user_id: row.user_id,
            alert_config_id: row.alert_config_id,
            alert_name: row.alert_name,
            channel: row.channel.0,
            retry_count: row.retry_count as u32,
            activity: PayloadActivity {
                activity_type: row.activity_type,
                transaction_hash: row.transaction_hash.trim().to_string(),
                ledger_index: row.ledger_index as u32,
                from_address: row.from_address,
                to_address: row.to_address,
                price_drops: row.price_drops,
                currency: row.currency,
                issuer: row.issuer,
                timestamp: row.activity_timestamp as u64,
            },
            nft,
        }
    }
}

impl domain::storage::Storage for Storage {
    #[trace]
    async fn claim_due(&self, limit: u32, now: UnixMillis) -> Result<Vec<i64>, sqlx::Error> {
        // scheduled_at is bumped to the claim time so stale in-flight rows
        // are detectable.
        let query = indoc! {"
            UPDATE notifications
            SET status = 'in_flight', scheduled_at = $1
            WHERE id IN (
                SELECT id
                FROM notifications
                WHERE status = 'pending' AND scheduled_at <= $1
                ORDER BY scheduled_at
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id
        "};

        let ids = sqlx::query_as::<_, (i64,)>(query)
            .bind(now as i64)
            .bind(limit as i64)
            .fetch_all(&*self.pool)
            .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    #[trace(properties = { "notification_id": "{notification_id}" })]
    async fn load_payload(
        &self,
        notification_id: i64,
    ) -> Result<Option<NotificationPayload>, sqlx::Error> {
        let query = indoc! {"
            SELECT
                n.id AS notification_id,
                n.user_id,
                n.alert_config_id,
                ac.name AS alert_name,
                n.channel,
                n.retry_count,
                a.activity_type,
                a.transaction_hash,
                a.ledger_index,
                a.from_address,
                a.to_address,
                a.price_drops,
                a.currency,
                a.issuer,
                a.timestamp AS activity_timestamp,
                f.nft_id,
                f.metadata ->> 'name' AS nft_name,
                f.metadata ->> 'description' AS nft_description,
                COALESCE(f.cached_image_url, f.image_url) AS nft_image_url,
                c.name AS collection_name
            FROM notifications n
            JOIN alert_configs ac ON ac.id = n.alert_config_id
            JOIN nft_activities a ON a.id = n.activity_id
            LEFT JOIN nfts f ON f.nft_id = a.nft_id
            LEFT JOIN collections c ON c.id = f.collection_id
            WHERE n.id = $1
        "};

        let row = sqlx::query_as::<_, PayloadRow>(query)
            .bind(notification_id)
            .fetch_optional(&*self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    #[trace(properties = { "notification_id": "{notification_id}" })]
    async fn mark_sent(
        &self,
        notification_id: i64,
        sent_at: UnixMillis,
    ) -> Result<(), sqlx::Error> {
        let query = indoc! {"
            UPDATE notifications
            SET status = 'sent', sent_at = $2, error_message = NULL
            WHERE id = $1
        "};

        sqlx::query(query)
            .bind(notification_id)
            .bind(sent_at as i64)
            .execute(&*self.pool)
            .await?;

        Ok(())
    }

    #[trace(properties = { "notification_id": "{notification_id}" })]
    async fn reschedule(
        &self,
        notification_id: i64,
        retry_count: u32,
        scheduled_at: UnixMillis,
        error: &str,
    ) -> Result<(), sqlx::Error> {
        let query = indoc! {"
            UPDATE notifications
            SET status = 'pending', retry_count = $2, scheduled_at = $3, error_message = $4
            WHERE id = $1
        "};

        sqlx::query(query)
            .bind(notification_id)
            .bind(retry_count as i32)
            .bind(scheduled_at as i64)
            .bind(error)
            .execute(&*self.pool)
            .await?;

        Ok(())
    }

    #[trace(properties = { "notification_id": "{notification_id}" })]
    async fn mark_failed(&self, notification_id: i64, error: &str) -> Result<(), sqlx::Error> {
        let query = indoc! {"
            UPDATE notifications
            SET status = 'failed', error_message = $2
            WHERE id = $1
        "};

        sqlx::query(query)
            .bind(notification_id)
            .bind(error)
            .execute(&*self.pool)
            .await?;

        Ok(())
    }

    #[trace]
    async fn insert_notifications(
        &self,
        activity_id: i64,
        config: &AlertConfig,
        scheduled_at: UnixMillis,
    ) -> Result<Vec<i64>, sqlx::Error> {
        let query = indoc! {"
            INSERT INTO notifications (
                user_id,
                alert_config_id,
                activity_id,
                channel,
                channel_kind,
                status,
                retry_count,
                scheduled_at
            )
            VALUES ($1, $2, $3, $4, $5, 'pending', 0, $6)
            RETURNING id
        "};

        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(config.notification_channels.len());

        for channel in &config.notification_channels {
            let (id,) = sqlx::query_as::<_, (i64,)>(query)
                .bind(&config.user_id)
                .bind(config.id)
                .bind(activity_id)
                .bind(Json(channel))
                .bind(channel.kind())
                .bind(scheduled_at as i64)
                .fetch_one(&mut *tx)
                .await?;
            ids.push(id);
        }

        tx.commit().await?;

        Ok(ids)
    }

    #[trace]
    async fn counts(&self) -> Result<Vec<(NotificationStatus, ChannelKind, u64)>, sqlx::Error> {
        let query = indoc! {"
            SELECT status, channel_kind, count(*)
            FROM notifications
            GROUP BY status, channel_kind
        "};

        let rows = sqlx::query_as::<_, (NotificationStatus, ChannelKind, i64)>(query)
            .fetch_all(&*self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(status, kind, count)| (status, kind, count as u64))
            .collect())
    }

    #[trace]
    async fn delete_finished_before(&self, cutoff: UnixMillis) -> Result<u64, sqlx::Error> {
        let query = indoc! {"
            DELETE FROM notifications
            WHERE status IN ('sent', 'failed') AND scheduled_at < $1
        "};

        let result = sqlx::query(query)
            .bind(cutoff as i64)
            .execute(&*self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    #[trace]
    async fn reset_stale_in_flight(&self, stale_before: UnixMillis) -> Result<u64, sqlx::Error> {
        let query = indoc! {"
            UPDATE notifications
            SET status = 'pending'
            WHERE status = 'in_flight' AND scheduled_at < $1
        "};

        let result = sqlx::query(query)
            .bind(stale_before as i64)
            .execute(&*self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
