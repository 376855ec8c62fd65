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
    EnrichmentOutcome, FetchedImage, Fetcher, normalize_metadata, resolve_uri,
    storage::{EnrichmentTask, Storage},
};
use anyhow::Context;
use fastrace::trace;
use futures::StreamExt;
use log::{debug, info, warn};
use metrics::{counter, gauge};
use monitor_common::domain::{
    EnrichmentRequested, ObjectStore, Subscriber, TokenId, now_unix_millis,
};
use serde::Deserialize;
use serde_json::Value;
use std::{pin::pin, sync::Arc, time::Duration};
use tokio::{select, signal::unix::Signal, time::interval};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// How often due tasks are processed.
    #[serde(with = "humantime_serde", default = "process_interval_default")]
    pub process_interval: Duration,

    /// Tasks claimed per processing pass.
    #[serde(default = "batch_size_default")]
    pub batch_size: u32,

    /// Attempts before a task fails for good.
    #[serde(default = "max_retry_count_default")]
    pub max_retry_count: u32,

    /// Backoff per retry; the last entry is reused beyond its length.
    #[serde(
        deserialize_with = "deserialize_durations",
        default = "retry_backoff_default"
    )]
    pub retry_backoff: Vec<Duration>,

    /// Lease per claimed task, doubling as the TTL'd cross-replica lock.
    #[serde(with = "humantime_serde", default = "lease_default")]
    pub lease: Duration,

    /// Ordered IPFS gateway prefixes.
    pub ipfs_gateways: Vec<String>,
}

const fn process_interval_default() -> Duration {
    Duration::from_secs(5)
}

const fn batch_size_default() -> u32 {
    10
}

const fn max_retry_count_default() -> u32 {
    3
}

fn retry_backoff_default() -> Vec<Duration> {
    vec![
        Duration::from_secs(60),
        Duration::from_secs(300),
        Duration::from_secs(1_800),
    ]
}

const fn lease_default() -> Duration {
    Duration::from_secs(30)
}

fn deserialize_durations<'de, D>(deserializer: D) -> Result<Vec<Duration>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let durations = Vec::<humantime_serde::Serde<Duration>>::deserialize(deserializer)?;
    Ok(durations
        .into_iter()
        .map(humantime_serde::Serde::into_inner)
        .collect())
}

/// Fetches, normalizes and caches off-chain metadata and images for NFTs.
/// The object store is optional: without one, image caching is skipped but
/// metadata fetching continues.
#[derive(Clone)]
pub struct Enricher<S, F, O> {
    config: Arc<Config>,
    storage: S,
    fetcher: F,
    object_store: Option<O>,
}

impl<S, F, O> Enricher<S, F, O>
where
    S: Storage,
    F: Fetcher,
    O: ObjectStore,
{
    pub fn new(config: Config, storage: S, fetcher: F, object_store: Option<O>) -> Self {
        Self {
            config: Arc::new(config),
            storage,
            fetcher,
            object_store,
        }
    }

    /// Enqueue an NFT for enrichment; a no-op if a task already exists.
    pub async fn enqueue_nft(&self, nft_id: &TokenId) -> Result<(), sqlx::Error> {
        self.storage.insert_task(nft_id).await
    }

    /// Enrich one NFT right away, bypassing the queue.
    #[trace]
    pub async fn enrich_now(&self, nft_id: &TokenId) -> EnrichmentOutcome {
        match self.enrich(nft_id).await {
            Ok(outcome) => outcome,
            Err(error) => EnrichmentOutcome {
                error: Some(format!("{error:#}")),
                ..EnrichmentOutcome::default()
            },
        }
    }

    /// Record the queue depth by status as gauges.
    pub async fn record_queue_depth(&self) -> Result<(), sqlx::Error> {
        let (pending, completed, failed) = self.storage.task_counts().await?;

        gauge!("enricher_tasks_pending").set(pending as f64);
        gauge!("enricher_tasks_completed").set(completed as f64);
        gauge!("enricher_tasks_failed").set(failed as f64);

        Ok(())
    }

    /// Claim and process due tasks once; per-task failures are isolated.
    #[trace]
    pub async fn process_due(&self) -> anyhow::Result<usize> {
        let tasks = self
            .storage
            .claim_due_tasks(
                self.config.max_retry_count,
                self.config.batch_size,
                self.config.lease.as_millis() as u64,
            )
            .await
            .context("claim due enrichment tasks")?;
        let claimed = tasks.len();

        for task in tasks {
            if let Err(error) = self.process_task(&task).await {
                warn!(nft_id = task.nft_id.as_str(), error:%; "enrichment task failed");
            }
        }

        Ok(claimed)
    }

    async fn process_task(&self, task: &EnrichmentTask) -> Result<(), sqlx::Error> {
        match self.enrich(&task.nft_id).await {
            Ok(outcome) if outcome.error.is_none() => {
                counter!("enricher_completed_total").increment(1);
                self.storage.complete_task(&task.nft_id).await
            }

            Ok(outcome) => {
                // Permanent failure, e.g. an unsupported URI: no retry.
                counter!("enricher_failed_total").increment(1);
                self.storage
                    .save_metadata_error(
                        &task.nft_id,
                        outcome.error.as_deref().unwrap_or("enrichment failed"),
                    )
                    .await?;
                self.storage
                    .fail_task(&task.nft_id, task.retry_count)
                    .await
            }

            // Transient failure: back off and retry, up to the limit.
            Err(error) => {
                let retry_count = task.retry_count + 1;

                if retry_count >= self.config.max_retry_count {
                    counter!("enricher_failed_total").increment(1);
                    self.storage
                        .save_metadata_error(&task.nft_id, &error.to_string())
                        .await?;
                    self.storage.fail_task(&task.nft_id, retry_count).await
                } else {
                    counter!("enricher_retried_total").increment(1);
                    let backoff = retry_backoff(&self.config.retry_backoff, task.retry_count);
                    self.storage
                        .reschedule_task(
                            &task.nft_id,
                            retry_count,
                            now_unix_millis() + backoff.as_millis() as u64,
                        )
                        .await
                }
            }
        }
    }

    /// Fetch metadata and cache the image for one NFT.
    ///
    /// `Ok` with an error set means a permanent failure; `Err` means a
    /// transient one worth retrying.
    async fn enrich(&self, nft_id: &TokenId) -> Result<EnrichmentOutcome, EnrichError> {
        let nft = self.storage.get_nft(nft_id).await?;

        let Some(nft) = nft else {
            return Ok(EnrichmentOutcome {
                error: Some("unknown NFT".to_string()),
                ..EnrichmentOutcome::default()
            });
        };

        // Metadata is immutable: a successful fetch is cached forever.
        if nft.metadata_fetched_at.is_some() {
            return Ok(EnrichmentOutcome {
                metadata_fetched: true,
                image_cached: nft.cached_image_url.is_some(),
                ..EnrichmentOutcome::default()
            });
        }

        let Some(metadata_uri) = nft.metadata_uri.as_deref() else {
            return Ok(EnrichmentOutcome {
                error: Some("NFT has no metadata URI".to_string()),
                ..EnrichmentOutcome::default()
            });
        };

        let candidates = match resolve_uri(metadata_uri, &self.config.ipfs_gateways) {
            Ok(candidates) => candidates,
            Err(error) => {
                return Ok(EnrichmentOutcome {
                    error: Some(error.to_string()),
                    ..EnrichmentOutcome::default()
                });
            }
        };

        let document = self.fetch_first(&candidates).await?;
        let normalized = normalize_metadata(document);

        self.storage
            .save_metadata(
                nft_id,
                &normalized.document,
                &Value::Array(normalized.attributes.clone()),
                normalized.image.as_deref(),
                normalized.name.as_deref(),
                now_unix_millis(),
            )
            .await?;

        debug!(nft_id = nft_id.as_str(); "metadata fetched");

        // Image failures never block the metadata result.
        let image_cached = match &normalized.image {
            Some(image) => match self.cache_image(nft_id, image).await {
                Ok(cached) => cached,
                Err(error) => {
                    warn!(nft_id = nft_id.as_str(), error:%; "image caching failed");
                    self.storage
                        .save_image_error(nft_id, &error.to_string())
                        .await?;
                    false
                }
            },
            None => false,
        };

        Ok(EnrichmentOutcome {
            metadata_fetched: true,
            image_cached,
            error: None,
        })
    }

    /// Try candidate URLs in order; the first success wins.
    async fn fetch_first(&self, candidates: &[String]) -> Result<Value, EnrichError> {
        let mut last_error = None;

        for url in candidates {
            match self.fetcher.fetch_json(url).await {
                Ok(document) => return Ok(document),
                Err(error) => {
                    debug!(url = url.as_str(), error:%; "metadata fetch failed, trying next");
                    last_error = Some(error);
                }
            }
        }

        Err(EnrichError::AllGatewaysFailed(
            last_error.map(|error| error.to_string()).unwrap_or_default(),
        ))
    }

    async fn cache_image(&self, nft_id: &TokenId, image: &str) -> Result<bool, EnrichError> {
        let Some(object_store) = &self.object_store else {
            return Ok(false);
        };

        let candidates = resolve_uri(image, &self.config.ipfs_gateways)
            .map_err(|error| EnrichError::Image(error.to_string()))?;

        let mut last_error = None;
        for url in &candidates {
            match self.fetcher.fetch_image(url).await {
                Ok(image) => {
                    let key = image_key(nft_id, &image);
                    let cached_url = object_store
                        .put(&key, image.bytes)
                        .await
                        .map_err(|error| EnrichError::Image(error.to_string()))?;

                    self.storage
                        .save_cached_image(nft_id, &cached_url, now_unix_millis())
                        .await?;

                    return Ok(true);
                }

                Err(error) => last_error = Some(error),
            }
        }

        Err(EnrichError::Image(
            last_error.map(|error| error.to_string()).unwrap_or_default(),
        ))
    }
}

fn image_key(nft_id: &TokenId, image: &FetchedImage) -> String {
    format!("images/{}.{}", nft_id.as_str(), image.extension())
}

fn retry_backoff(backoff: &[Duration], retry_count: u32) -> Duration {
    backoff
        .get(retry_count as usize)
        .or_else(|| backoff.last())
        .copied()
        .unwrap_or(Duration::from_secs(60))
}

#[derive(Debug, thiserror::Error)]
enum EnrichError {
    #[error(transparent)]
    Storage(#[from] sqlx::Error),

    #[error("all gateways failed: {0}")]
    AllGatewaysFailed(String),

    #[error("image fetch failed: {0}")]
    Image(String),
}

/// Process due enrichment tasks until SIGTERM; `EnrichmentRequested` events
/// wake the processor early, the interval is the fallback.
pub async fn run<S, F, O>(
    config: Config,
    storage: S,
    fetcher: F,
    object_store: Option<O>,
    subscriber: impl Subscriber,
    mut sigterm: Signal,
) -> anyhow::Result<()>
where
    S: Storage,
    F: Fetcher,
    O: ObjectStore,
{
    let enricher = Enricher::new(config.clone(), storage, fetcher, object_store);
    info!(
        batch_size = config.batch_size,
        process_interval:? = config.process_interval;
        "starting enrichment"
    );

    let mut requests = pin!(subscriber.subscribe::<EnrichmentRequested>());
    let mut ticker = interval(config.process_interval);

    loop {
        select! {
            _ = ticker.tick() => {
                if let Err(error) = enricher.process_due().await {
                    warn!(error:?; "enrichment pass failed");
                }
                if let Err(error) = enricher.record_queue_depth().await {
                    warn!(error:%; "cannot record queue depth");
                }
            }

            request = requests.next() => {
                match request {
                    Some(Ok(_)) => {
                        if let Err(error) = enricher.process_due().await {
                            warn!(error:?; "enrichment pass failed");
                        }
                    }

                    Some(Err(error)) => warn!(error:%; "cannot receive EnrichmentRequested"),

                    None => warn!("EnrichmentRequested stream ended"),
                }
            }

            _ = sigterm.recv() => {
                warn!("SIGTERM received");
                return Ok(());
            }
        }
    }
}
