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

use crate::domain::{self, MatchActivity, MatchResult, storage::Storage};
use anyhow::Context;
use fastrace::trace;
use futures::StreamExt;
use log::{debug, info, warn};
use metrics::counter;
use monitor_common::domain::{
    ActivityIndexed, NotificationEnqueued, Publisher, Subscriber, now_unix_millis,
};
use serde::Deserialize;
use std::{pin::pin, time::Duration};
use tokio::{select, signal::unix::Signal, time::interval};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Fallback poll interval; `ActivityIndexed` events wake the matcher
    /// earlier.
    #[serde(with = "humantime_serde", default = "poll_interval_default")]
    pub poll_interval: Duration,

    /// Activities evaluated per pass.
    #[serde(default = "batch_size_default")]
    pub batch_size: u32,
}

const fn poll_interval_default() -> Duration {
    Duration::from_secs(1)
}

const fn batch_size_default() -> u32 {
    100
}

/// Evaluates committed activities against all active alert configurations
/// and enqueues notifications for the matches.
#[derive(Clone)]
pub struct Matcher<S, P> {
    storage: S,
    publisher: P,
    batch_size: u32,
}

impl<S, P> Matcher<S, P>
where
    S: Storage,
    P: Publisher,
{
    pub fn new(config: &Config, storage: S, publisher: P) -> Self {
        Self {
            storage,
            publisher,
            batch_size: config.batch_size,
        }
    }

    /// Evaluate one activity against all candidate configurations; one
    /// result per candidate.
    #[trace]
    pub async fn find_matches(
        &self,
        activity: &MatchActivity,
    ) -> Result<Vec<MatchResult>, sqlx::Error> {
        let collection_id = activity.nft.as_ref().and_then(|nft| nft.collection_id);
        let candidates = self
            .storage
            .candidate_configs(activity.activity_type, collection_id)
            .await?;

        Ok(domain::find_matches(activity, &candidates))
    }

    /// Evaluate activities past the cursor once, in id order. Returns the
    /// number of evaluated activities.
    #[trace]
    pub async fn process_pending(&self) -> anyhow::Result<usize> {
        let cursor = self.storage.get_cursor().await.context("get cursor")?;
        let activities = self
            .storage
            .activities_after(cursor, self.batch_size)
            .await
            .context("get activities after cursor")?;
        let count = activities.len();

        for activity in activities {
            // Stop at the first failure so the cursor never skips an
            // activity; the next pass retries it.
            self.match_one(&activity)
                .await
                .with_context(|| format!("match activity {}", activity.activity_id))?;
        }

        Ok(count)
    }

    async fn match_one(&self, activity: &MatchActivity) -> anyhow::Result<()> {
        let collection_id = activity.nft.as_ref().and_then(|nft| nft.collection_id);
        let candidates = self
            .storage
            .candidate_configs(activity.activity_type, collection_id)
            .await
            .context("get candidate configs")?;

        let results = domain::find_matches(activity, &candidates);

        for result in &results {
            debug!(
                activity_id = activity.activity_id,
                alert_config_id:% = result.alert_config_id,
                matched = result.matched,
                reasons:? = result.reasons;
                "alert evaluated"
            );
        }

        let matched_configs = candidates
            .into_iter()
            .zip(&results)
            .filter_map(|(config, result)| result.matched.then_some(config))
            .collect::<Vec<_>>();

        counter!("matcher_activities_total").increment(1);
        counter!("matcher_matches_total").increment(matched_configs.len() as u64);

        // The notification rows and the cursor advance commit atomically;
        // events are published only afterwards.
        let notification_ids = self
            .storage
            .record_matches(activity.activity_id, &matched_configs, now_unix_millis())
            .await
            .context("record matches")?;

        if !notification_ids.is_empty() {
            info!(
                activity_id = activity.activity_id,
                notifications = notification_ids.len();
                "notifications enqueued"
            );
        }

        for notification_id in notification_ids {
            let enqueued = NotificationEnqueued { notification_id };
            if let Err(error) = self.publisher.publish(&enqueued).await {
                warn!(notification_id, error:%; "cannot publish NotificationEnqueued");
            }
        }

        Ok(())
    }
}

/// Match committed activities until SIGTERM; `ActivityIndexed` events wake
/// the matcher early, the interval is the fallback.
pub async fn run<S, P>(
    config: Config,
    storage: S,
    publisher: P,
    subscriber: impl Subscriber,
    mut sigterm: Signal,
) -> anyhow::Result<()>
where
    S: Storage,
    P: Publisher,
{
    let matcher = Matcher::new(&config, storage, publisher);
    info!(batch_size = config.batch_size; "starting alert matching");

    let mut indexed = pin!(subscriber.subscribe::<ActivityIndexed>());
    let mut ticker = interval(config.poll_interval);

    loop {
        select! {
            _ = ticker.tick() => {
                if let Err(error) = matcher.process_pending().await {
                    warn!(error:?; "matching pass failed");
                }
            }

            event = indexed.next() => {
                match event {
                    Some(Ok(_)) => {
                        if let Err(error) = matcher.process_pending().await {
                            warn!(error:?; "matching pass failed");
                        }
                    }

                    Some(Err(error)) => warn!(error:%; "cannot receive ActivityIndexed"),

                    None => warn!("ActivityIndexed stream ended"),
                }
            }

            _ = sigterm.recv() => {
                warn!("SIGTERM received");
                return Ok(());
            }
        }
    }
}
