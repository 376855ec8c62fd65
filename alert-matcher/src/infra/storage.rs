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

use crate::domain::{self, MatchActivity, MatchNft};
use bigdecimal::BigDecimal;
use fastrace::trace;
use indoc::indoc;
use monitor_common::{
    domain::{ActivityType, AlertConfig, NotificationChannel, TraitFilter, UnixMillis},
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

type AlertConfigRow = (
    Uuid,
    String,
    String,
    Option<i64>,
    Vec<ActivityType>,
    Option<BigDecimal>,
    Option<BigDecimal>,
    Option<Json<Vec<TraitFilter>>>,
    Json<Vec<NotificationChannel>>,
    bool,
);

fn alert_config_from_row(row: AlertConfigRow) -> AlertConfig {
    let (
        id,
        user_id,
        name,
        collection_id,
        activity_types,
        min_price_drops,
        max_price_drops,
        trait_filters,
        notification_channels,
        is_active,
    ) = row;

    AlertConfig {
        id,
        user_id,
        name,
        collection_id,
        activity_types,
        min_price_drops,
        max_price_drops,
        trait_filters: trait_filters.map(|Json(filters)| filters),
        notification_channels: notification_channels.0,
        is_active,
    }
}

impl domain::storage::Storage for Storage {
    #[trace]
    async fn get_cursor(&self) -> Result<i64, sqlx::Error> {
        let query = indoc! {"
            SELECT last_activity_id
            FROM matcher_cursor
        "};

        let (cursor,) = sqlx::query_as::<_, (i64,)>(query)
            .fetch_one(&*self.pool)
            .await?;

        Ok(cursor)
    }

    #[trace]
    async fn activities_after(
        &self,
        cursor: i64,
        limit: u32,
    ) -> Result<Vec<MatchActivity>, sqlx::Error> {
        let query = indoc! {"
            SELECT
                a.id,
                a.activity_type,
                a.price_drops,
                n.id,
                n.collection_id,
                n.traits
            FROM nft_activities a
            LEFT JOIN nfts n ON n.nft_id = a.nft_id
            WHERE a.id > $1
            ORDER BY a.id
            LIMIT $2
        "};

        type Row = (
            i64,
            ActivityType,
            Option<BigDecimal>,
            Option<i64>,
            Option<i64>,
            Option<Json<serde_json::Value>>,
        );

        let rows = sqlx::query_as::<_, Row>(query)
            .bind(cursor)
            .bind(limit as i64)
            .fetch_all(&*self.pool)
            .await?;

        let activities = rows
            .into_iter()
            .map(
                |(activity_id, activity_type, price_drops, nft_row_id, collection_id, traits)| {
                    MatchActivity {
                        activity_id,
                        activity_type,
                        price_drops,
                        nft: nft_row_id.map(|_| MatchNft {
                            collection_id,
                            traits: traits.map(|Json(traits)| traits),
                        }),
                    }
                },
            )
            .collect();

        Ok(activities)
    }

    #[trace]
    async fn candidate_configs(
        &self,
        activity_type: ActivityType,
        collection_id: Option<i64>,
    ) -> Result<Vec<AlertConfig>, sqlx::Error> {
        let query = indoc! {"
            SELECT
                id,
                user_id,
                name,
                collection_id,
                activity_types,
                min_price_drops,
                max_price_drops,
                trait_filters,
                notification_channels,
                is_active
            FROM alert_configs
            WHERE is_active
                AND $1 = ANY (activity_types)
                AND (collection_id IS NULL OR collection_id = $2)
        "};

        let rows = sqlx::query_as::<_, AlertConfigRow>(query)
            .bind(activity_type)
            .bind(collection_id)
            .fetch_all(&*self.pool)
            .await?;

        Ok(rows.into_iter().map(alert_config_from_row).collect())
    }

    #[trace]
    async fn record_matches(
        &self,
        activity_id: i64,
        matched_configs: &[AlertConfig],
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
        let mut notification_ids = Vec::new();

        for config in matched_configs {
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
                notification_ids.push(id);
            }
        }

        let query = indoc! {"
            UPDATE matcher_cursor
            SET last_activity_id = GREATEST(last_activity_id, $1)
        "};

        sqlx::query(query)
            .bind(activity_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(notification_ids)
    }
}
