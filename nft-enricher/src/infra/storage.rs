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

use crate::domain::{
    self,
    storage::{EnrichmentTask, NftToEnrich},
};
use fastrace::trace;
use indoc::indoc;
use monitor_common::{
    domain::{TokenId, UnixMillis, now_unix_millis},
    infra::pool::PostgresPool,
};
use serde_json::Value;
use sqlx::types::Json;

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

impl domain::storage::Storage for Storage {
    #[trace]
    async fn claim_due_tasks(
        &self,
        max_retry_count: u32,
        limit: u32,
        lease_millis: u64,
    ) -> Result<Vec<EnrichmentTask>, sqlx::Error> {
        // Pushing next_retry_at forward leases the tasks to this replica;
        // the lease expiry doubles as a TTL'd distributed lock.
        let query = indoc! {"
            UPDATE enrichment_tasks
            SET last_attempt_at = $1, next_retry_at = $2
            WHERE nft_id IN (
                SELECT nft_id
                FROM enrichment_tasks
                WHERE status = 'pending' AND retry_count < $3 AND next_retry_at <= $1
                ORDER BY next_retry_at
                LIMIT $4
                FOR UPDATE SKIP LOCKED
            )
            RETURNING nft_id, retry_count
        "};

        let now = now_unix_millis();
        let rows = sqlx::query_as::<_, (String, i32)>(query)
            .bind(now as i64)
            .bind((now + lease_millis) as i64)
            .bind(max_retry_count as i32)
            .bind(limit as i64)
            .fetch_all(&*self.pool)
            .await?;

        rows.into_iter()
            .map(|(nft_id, retry_count)| {
                let nft_id = TokenId::try_from(nft_id.trim())
                    .map_err(|error| sqlx::Error::Decode(error.into()))?;

                Ok(EnrichmentTask {
                    nft_id,
                    retry_count: retry_count as u32,
                })
            })
            .collect()
    }

    #[trace]
    async fn insert_task(&self, nft_id: &TokenId) -> Result<(), sqlx::Error> {
        let query = indoc! {"
            INSERT INTO enrichment_tasks (nft_id)
            VALUES ($1)
            ON CONFLICT (nft_id) DO NOTHING
        "};

        sqlx::query(query)
            .bind(nft_id.as_str())
            .execute(&*self.pool)
            .await?;

        Ok(())
    }

    #[trace]
    async fn get_nft(&self, nft_id: &TokenId) -> Result<Option<NftToEnrich>, sqlx::Error> {
        let query = indoc! {"
            SELECT metadata_uri, metadata_fetched_at, cached_image_url
            FROM nfts
            WHERE nft_id = $1
        "};

        let row = sqlx::query_as::<_, (Option<String>, Option<i64>, Option<String>)>(query)
            .bind(nft_id.as_str())
            .fetch_optional(&*self.pool)
            .await?;

        Ok(row.map(
            |(metadata_uri, metadata_fetched_at, cached_image_url)| NftToEnrich {
                nft_id: nft_id.clone(),
                metadata_uri,
                metadata_fetched_at: metadata_fetched_at.map(|at| at as u64),
                cached_image_url,
            },
        ))
    }

    #[trace]
    async fn save_metadata(
        &self,
        nft_id: &TokenId,
        document: &Value,
        traits: &Value,
        image_url: Option<&str>,
        name: Option<&str>,
        fetched_at: UnixMillis,
    ) -> Result<(), sqlx::Error> {
        let query = indoc! {"
            UPDATE nfts
            SET
                metadata = $2,
                traits = $3,
                image_url = $4,
                metadata_fetched_at = $5,
                metadata_fetch_error = NULL
            WHERE nft_id = $1
        "};

        sqlx::query(query)
            .bind(nft_id.as_str())
            .bind(Json(document))
            .bind(Json(traits))
            .bind(image_url)
            .bind(fetched_at as i64)
            .execute(&*self.pool)
            .await?;

        // A collection is named after the first named NFT seen in it.
        if let Some(name) = name {
            let query = indoc! {"
                UPDATE collections
                SET name = $2
                WHERE name IS NULL AND id = (SELECT collection_id FROM nfts WHERE nft_id = $1)
            "};

            sqlx::query(query)
                .bind(nft_id.as_str())
                .bind(collection_name(name))
                .execute(&*self.pool)
                .await?;
        }

        Ok(())
    }

    #[trace]
    async fn save_metadata_error(&self, nft_id: &TokenId, error: &str) -> Result<(), sqlx::Error> {
        let query = indoc! {"
            UPDATE nfts
            SET metadata_fetch_error = $2, metadata_fetched_at = NULL
            WHERE nft_id = $1
        "};

        sqlx::query(query)
            .bind(nft_id.as_str())
            .bind(error)
            .execute(&*self.pool)
            .await?;

        Ok(())
    }

    #[trace]
    async fn save_cached_image(
        &self,
        nft_id: &TokenId,
        cached_image_url: &str,
        fetched_at: UnixMillis,
    ) -> Result<(), sqlx::Error> {
        let query = indoc! {"
            UPDATE nfts
            SET cached_image_url = $2, image_fetched_at = $3, image_fetch_error = NULL
            WHERE nft_id = $1
        "};

        sqlx::query(query)
            .bind(nft_id.as_str())
            .bind(cached_image_url)
            .bind(fetched_at as i64)
            .execute(&*self.pool)
            .await?;

        Ok(())
    }

    #[trace]
    async fn save_image_error(&self, nft_id: &TokenId, error: &str) -> Result<(), sqlx::Error> {
        let query = indoc! {"
            UPDATE nfts
            SET image_fetch_error = $2, image_fetched_at = NULL
            WHERE nft_id = $1
        "};

        sqlx::query(query)
            .bind(nft_id.as_str())
            .bind(error)
            .execute(&*self.pool)
            .await?;

        Ok(())
    }

    #[trace]
    async fn complete_task(&self, nft_id: &TokenId) -> Result<(), sqlx::Error> {
        let query = indoc! {"
            UPDATE enrichment_tasks
            SET status = 'completed'
            WHERE nft_id = $1
        "};

        sqlx::query(query)
            .bind(nft_id.as_str())
            .execute(&*self.pool)
            .await?;

        Ok(())
    }

    #[trace]
    async fn reschedule_task(
        &self,
        nft_id: &TokenId,
        retry_count: u32,
        next_retry_at: UnixMillis,
    ) -> Result<(), sqlx::Error> {
        let query = indoc! {"
            UPDATE enrichment_tasks
            SET status = 'pending', retry_count = $2, next_retry_at = $3
            WHERE nft_id = $1
        "};

        sqlx::query(query)
            .bind(nft_id.as_str())
            .bind(retry_count as i32)
            .bind(next_retry_at as i64)
            .execute(&*self.pool)
            .await?;

        Ok(())
    }

    #[trace]
    async fn fail_task(&self, nft_id: &TokenId, retry_count: u32) -> Result<(), sqlx::Error> {
        let query = indoc! {"
            UPDATE enrichment_tasks
            SET status = 'failed', retry_count = $2
            WHERE nft_id = $1
        "};

        sqlx::query(query)
            .bind(nft_id.as_str())
            .bind(retry_count as i32)
            .execute(&*self.pool)
            .await?;

        Ok(())
    }

    #[trace]
    async fn task_counts(&self) -> Result<(u64, u64, u64), sqlx::Error> {
        let query = indoc! {"
            SELECT count(*)
            FROM enrichment_tasks
            WHERE status = $1::ENRICHMENT_STATUS
        "};

        let mut counts = [0u64; 3];
        for (i, status) in ["pending", "completed", "failed"].iter().enumerate() {
            let (count,) = sqlx::query_as::<_, (i64,)>(query)
                .bind(status)
                .fetch_one(&*self.pool)
                .await?;
            counts[i] = count as u64;
        }

        Ok((counts[0], counts[1], counts[2]))
    }
}

/// A collection display name derived from an NFT name: the trailing number
/// suffix (`Dragon #17` -> `Dragon`) is dropped.
fn collection_name(nft_name: &str) -> String {
    match nft_name.rsplit_once('#') {
        Some((prefix, suffix)) if suffix.chars().all(|c| c.is_ascii_digit()) => {
            prefix.trim_end().to_string()
        }
        _ => nft_name.to_string(),
    }
}
