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
    self, ClassifiedActivity, NftUpsert,
    storage::SavedActivity,
};
use fastrace::trace;
use indoc::indoc;
use monitor_common::{
    domain::{LedgerSyncStatus, now_unix_millis},
    infra::pool::PostgresPool,
};
use sqlx::types::Json;
use std::collections::HashMap;

type SqlxTransaction = sqlx::Transaction<'static, sqlx::Postgres>;

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
    async fn save_batch(
        &self,
        batch: &[ClassifiedActivity],
        completed_ledgers: &[LedgerSyncStatus],
    ) -> Result<Vec<SavedActivity>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let collection_ids = upsert_collections(batch, &mut tx).await?;
        let enrichment_by_nft = upsert_nfts(batch, &collection_ids, &mut tx).await?;
        let saved = insert_activities(batch, &enrichment_by_nft, &mut tx).await?;
        enqueue_enrichment_tasks(&saved, &mut tx).await?;
        advance_ledger_sync_status(completed_ledgers, &mut tx).await?;

        tx.commit().await?;

        Ok(saved)
    }

    #[trace]
    async fn get_activity_count(&self) -> Result<u64, sqlx::Error> {
        let query = indoc! {"
            SELECT count(*)
            FROM nft_activities
        "};

        let (count,) = sqlx::query_as::<_, (i64,)>(query)
            .fetch_one(&*self.pool)
            .await?;

        Ok(count as u64)
    }
}

/// Upsert the collections implied by the batch, returning ids by
/// `(issuer_address, taxon)`.
async fn upsert_collections(
    batch: &[ClassifiedActivity],
    tx: &mut SqlxTransaction,
) -> Result<HashMap<(String, u32), i64>, sqlx::Error> {
    let query = indoc! {"
        INSERT INTO collections (issuer_address, taxon)
        VALUES ($1, $2)
        ON CONFLICT (issuer_address, taxon) DO UPDATE SET taxon = EXCLUDED.taxon
        RETURNING id
    "};

    let mut ids = HashMap::new();

    for upsert in batch.iter().filter_map(|classified| classified.nft.as_ref()) {
        let key = (upsert.issuer_address.clone(), upsert.taxon);
        if ids.contains_key(&key) {
            continue;
        }

        let (id,) = sqlx::query_as::<_, (i64,)>(query)
            .bind(&upsert.issuer_address)
            .bind(upsert.taxon as i64)
            .fetch_one(&mut **tx)
            .await?;
        ids.insert(key, id);
    }

    Ok(ids)
}

/// Upsert the NFT rows implied by the batch, returning whether each NFT
/// still needs enrichment.
async fn upsert_nfts(
    batch: &[ClassifiedActivity],
    collection_ids: &HashMap<(String, u32), i64>,
    tx: &mut SqlxTransaction,
) -> Result<HashMap<String, bool>, sqlx::Error> {
    // Ownership only changes on mint, sale and burn; other activities must
    // not clobber it.
    let query_with_owner = indoc! {"
        INSERT INTO nfts (nft_id, collection_id, owner_address, metadata_uri, last_activity_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (nft_id) DO UPDATE SET
            owner_address = EXCLUDED.owner_address,
            metadata_uri = COALESCE(nfts.metadata_uri, EXCLUDED.metadata_uri),
            last_activity_at = GREATEST(COALESCE(nfts.last_activity_at, 0), EXCLUDED.last_activity_at)
        RETURNING (metadata_fetched_at IS NULL AND metadata_uri IS NOT NULL)
    "};

    let query_keep_owner = indoc! {"
        INSERT INTO nfts (nft_id, collection_id, owner_address, metadata_uri, last_activity_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (nft_id) DO UPDATE SET
            metadata_uri = COALESCE(nfts.metadata_uri, EXCLUDED.metadata_uri),
            last_activity_at = GREATEST(COALESCE(nfts.last_activity_at, 0), EXCLUDED.last_activity_at)
        RETURNING (metadata_fetched_at IS NULL AND metadata_uri IS NOT NULL)
    "};

    let mut needs_enrichment = HashMap::new();

    for classified in batch {
        let Some(upsert) = &classified.nft else {
            continue;
        };
        let NftUpsert {
            nft_id,
            owner_address,
            update_owner,
            metadata_uri,
            issuer_address,
            taxon,
        } = upsert;

        let collection_id = collection_ids.get(&(issuer_address.clone(), *taxon));
        let query = if *update_owner {
            query_with_owner
        } else {
            query_keep_owner
        };

        let (needs,) = sqlx::query_as::<_, (bool,)>(query)
            .bind(nft_id.as_str())
            .bind(collection_id)
            .bind(owner_address)
            .bind(metadata_uri)
            .bind(classified.activity.timestamp as i64)
            .fetch_one(&mut **tx)
            .await?;

        needs_enrichment.insert(nft_id.as_str().to_string(), needs);
    }

    Ok(needs_enrichment)
}

/// Insert the activities, silently skipping duplicates by the uniqueness
/// constraint on `(transaction_hash, activity_type, nft_id)`.
async fn insert_activities(
    batch: &[ClassifiedActivity],
    enrichment_by_nft: &HashMap<String, bool>,
    tx: &mut SqlxTransaction,
) -> Result<Vec<SavedActivity>, sqlx::Error> {
    let query = indoc! {"
        INSERT INTO nft_activities (
            nft_id,
            transaction_hash,
            ledger_index,
            activity_type,
            from_address,
            to_address,
            price_drops,
            currency,
            issuer,
            timestamp,
            metadata
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (transaction_hash, activity_type, nft_id) DO NOTHING
        RETURNING id
    "};

    let mut saved = Vec::with_capacity(batch.len());

    for classified in batch {
        let activity = &classified.activity;

        let row = sqlx::query_as::<_, (i64,)>(query)
            .bind(activity.nft_id.as_ref().map(|id| id.as_str()))
            .bind(&activity.transaction_hash)
            .bind(activity.ledger_index as i64)
            .bind(activity.activity_type)
            .bind(&activity.from_address)
            .bind(&activity.to_address)
            .bind(&activity.price_drops)
            .bind(&activity.currency)
            .bind(&activity.issuer)
            .bind(activity.timestamp as i64)
            .bind(Json(&activity.metadata))
            .fetch_optional(&mut **tx)
            .await?;

        // A conflict is an idempotent no-op.
        let Some((activity_id,)) = row else {
            continue;
        };

        let needs_enrichment = activity
            .nft_id
            .as_ref()
            .and_then(|nft_id| enrichment_by_nft.get(nft_id.as_str()))
            .copied()
            .unwrap_or_default();

        saved.push(SavedActivity {
            activity_id,
            ledger_index: activity.ledger_index,
            activity_type: activity.activity_type,
            nft_id: activity.nft_id.clone(),
            needs_enrichment,
        });
    }

    Ok(saved)
}

/// Enqueue a durable enrichment task per NFT that still lacks metadata.
async fn enqueue_enrichment_tasks(
    saved: &[SavedActivity],
    tx: &mut SqlxTransaction,
) -> Result<(), sqlx::Error> {
    let query = indoc! {"
        INSERT INTO enrichment_tasks (nft_id)
        VALUES ($1)
        ON CONFLICT (nft_id) DO NOTHING
    "};

    for activity in saved.iter().filter(|saved| saved.needs_enrichment) {
        let Some(nft_id) = &activity.nft_id else {
            continue;
        };

        sqlx::query(query)
            .bind(nft_id.as_str())
            .execute(&mut **tx)
            .await?;
    }

    Ok(())
}

async fn advance_ledger_sync_status(
    completed_ledgers: &[LedgerSyncStatus],
    tx: &mut SqlxTransaction,
) -> Result<(), sqlx::Error> {
    let query = indoc! {"
        INSERT INTO ledger_sync_status (
            ledger_index,
            ledger_hash,
            close_time,
            transaction_count,
            processed_at
        )
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (ledger_index) DO NOTHING
    "};

    for ledger in completed_ledgers {
        sqlx::query(query)
            .bind(ledger.ledger_index as i64)
            .bind(&ledger.ledger_hash)
            .bind(ledger.close_time as i64)
            .bind(ledger.transaction_count as i32)
            .bind(now_unix_millis() as i64)
            .execute(&mut **tx)
            .await?;
    }

    Ok(())
}
