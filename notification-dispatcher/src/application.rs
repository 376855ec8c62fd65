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

use crate::domain::{SendOutcome, Sender, storage::Storage};
use anyhow::Context;
use fastrace::trace;
use futures::StreamExt;
use log::{info, warn};
use metrics::counter;
use monitor_common::domain::{
    AlertConfig, ChannelKind, NotificationEnqueued, NotificationStatus, Subscriber, UnixMillis,
    now_unix_millis,
};
use serde::Deserialize;
use std::{pin::pin, sync::Arc, time::Duration};
use tokio::{
    select,
    signal::unix::Signal,
    sync::Notify,
    task,
    time::{interval, sleep},
};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "worker_count_default")]
    pub worker_count: usize,

    /// Fallback poll interval per worker; `NotificationEnqueued` events
    /// wake workers earlier.
    #[serde(with = "humantime_serde", default = "poll_interval_default")]
    pub poll_interval: Duration,

    #[serde(default = "claim_batch_size_default")]
    pub claim_batch_size: u32,

    #[serde(default = "max_retries_default")]
    pub max_retries: u32,

    /// Backoff per retry; the last entry is reused beyond its length. A
    /// server-mandated Retry-After overrides it.
    #[serde(
        deserialize_with = "deserialize_durations",
        default = "retry_delays_default"
    )]
    pub retry_delays: Vec<Duration>,

    #[serde(with = "humantime_serde", default = "cleanup_interval_default")]
    pub cleanup_interval: Duration,

    /// Finished notifications older than this are deleted.
    #[serde(with = "humantime_serde", default = "retention_default")]
    pub retention: Duration,

    /// In-flight rows claimed longer ago than this are handed back to the
    /// pool.
    #[serde(with = "humantime_serde", default = "stale_in_flight_after_default")]
    pub stale_in_flight_after: Duration,
}

const fn worker_count_default() -> usize {
    4
}

const fn poll_interval_default() -> Duration {
    Duration::from_secs(1)
}

const fn claim_batch_size_default() -> u32 {
    10
}

const fn max_retries_default() -> u32 {
    3
}

fn retry_delays_default() -> Vec<Duration> {
    vec![
        Duration::from_secs(1),
        Duration::from_secs(5),
        Duration::from_secs(15),
    ]
}

const fn cleanup_interval_default() -> Duration {
    Duration::from_secs(60 * 60)
}

const fn retention_default() -> Duration {
    Duration::from_secs(30 * 24 * 60 * 60)
}

const fn stale_in_flight_after_default() -> Duration {
    Duration::from_secs(10 * 60)
}

fn deserialize_durations<'de, D>(deserializer: D) -> Result<Vec<Duration>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    let durations = Vec::<humantime_serde::Serde<Duration>>::deserialize(deserializer)?;
    Ok(durations
        .into_iter()
        .map(humantime_serde::Serde::into_inner)
        .collect())
}

/// Durably delivers notifications over their channels with bounded retry.
#[derive(Clone)]
pub struct Dispatcher<S, Se> {
    storage: S,
    sender: Se,
    config: Arc<Config>,
}

impl<S, Se> Dispatcher<S, Se>
where
    S: Storage,
    Se: Sender,
{
    pub fn new(config: Config, storage: S, sender: Se) -> Self {
        Self {
            storage,
            sender,
            config: Arc::new(config),
        }
    }

    /// Persist one pending notification per enabled channel of the given
    /// configuration; returns the new ids.
    pub async fn enqueue(
        &self,
        activity_id: i64,
        config: &AlertConfig,
    ) -> Result<Vec<i64>, sqlx::Error> {
        self.storage
            .insert_notifications(activity_id, config, now_unix_millis())
            .await
    }

    /// Notification counts by status and channel.
    pub async fn stats(
        &self,
    ) -> Result<Vec<(NotificationStatus, ChannelKind, u64)>, sqlx::Error> {
        self.storage.counts().await
    }

    /// Claim and deliver due notifications once; returns the number of
    /// claimed rows. Per-notification failures are isolated.
    #[trace]
    pub async fn process_batch(&self) -> anyhow::Result<usize> {
        let ids = self
            .storage
            .claim_due(self.config.claim_batch_size, now_unix_millis())
            .await
            .context("claim due notifications")?;
        let claimed = ids.len();

        for notification_id in ids {
            if let Err(error) = self.process_one(notification_id).await {
                warn!(notification_id, error:?; "notification processing failed");
            }
        }

        Ok(claimed)
    }

    async fn process_one(&self, notification_id: i64) -> anyhow::Result<()> {
        let payload = self
            .storage
            .load_payload(notification_id)
            .await
            .context("load notification payload")?;

        let Some(payload) = payload else {
            // The row vanished under cleanup; nothing to deliver.
            warn!(notification_id; "claimed notification no longer exists");
            return Ok(());
        };

        let channel_kind = payload.channel.kind();

        match self.sender.send(&payload).await {
            SendOutcome::Sent { message_id } => {
                self.storage
                    .mark_sent(notification_id, now_unix_millis())
                    .await
                    .context("mark notification sent")?;

                counter!("dispatcher_sent_total", "channel" => channel_kind.to_string())
                    .increment(1);
                info!(
                    notification_id,
                    channel:% = channel_kind,
                    message_id:? = message_id,
                    retry_count = payload.retry_count;
                    "notification sent"
                );
            }

            SendOutcome::Failed {
                error,
                retry_after,
                permanent,
            } => {
                let exhausted = payload.retry_count >= self.config.max_retries;

                if permanent || exhausted {
                    self.storage
                        .mark_failed(notification_id, &error)
                        .await
                        .context("mark notification failed")?;

                    counter!("dispatcher_failed_total", "channel" => channel_kind.to_string())
                        .increment(1);
                    warn!(
                        notification_id,
                        channel:% = channel_kind,
                        error = error.as_str(),
                        permanent;
                        "notification failed"
                    );
                } else {
                    // A server-mandated Retry-After bypasses the default
                    // backoff.
                    let delay = retry_after
                        .unwrap_or_else(|| retry_delay(&self.config.retry_delays, payload.retry_count));
                    let retry_count = payload.retry_count + 1;

                    self.storage
                        .reschedule(
                            notification_id,
                            retry_count,
                            now_unix_millis() + delay.as_millis() as u64,
                            &error,
                        )
                        .await
                        .context("reschedule notification")?;

                    counter!("dispatcher_retried_total", "channel" => channel_kind.to_string())
                        .increment(1);
                    warn!(
                        notification_id,
                        channel:% = channel_kind,
                        error = error.as_str(),
                        retry_count,
                        delay:?;
                        "notification delivery rescheduled"
                    );
                }
            }
        }

        Ok(())
    }

    /// Delete old finished notifications and hand stale in-flight rows
    /// back.
    #[trace]
    pub async fn cleanup(&self) -> anyhow::Result<()> {
        let now = now_unix_millis();

        let deleted = self
            .storage
            .delete_finished_before(now - self.config.retention.as_millis() as u64)
            .await
            .context("delete old notifications")?;

        let reset = self
            .storage
            .reset_stale_in_flight(now - self.config.stale_in_flight_after.as_millis() as u64)
            .await
            .context("reset stale in-flight notifications")?;

        if deleted > 0 || reset > 0 {
            info!(deleted, reset; "notification cleanup completed");
        }

        Ok(())
    }
}

fn retry_delay(delays: &[Duration], retry_count: u32) -> Duration {
    delays
        .get(retry_count as usize)
        .or_else(|| delays.last())
        .copied()
        .unwrap_or(Duration::from_secs(1))
}

/// Deliver notifications with a pool of workers until SIGTERM.
pub async fn run<S, Se>(
    config: Config,
    storage: S,
    sender: Se,
    subscriber: impl Subscriber,
    mut sigterm: Signal,
) -> anyhow::Result<()>
where
    S: Storage,
    Se: Sender,
{
    let dispatcher = Dispatcher::new(config.clone(), storage, sender);
    let wakeup = Arc::new(Notify::new());
    info!(worker_count = config.worker_count; "starting notification dispatch");

    let mut tasks = Vec::new();

    for worker in 0..config.worker_count {
        let dispatcher = dispatcher.clone();
        let wakeup = wakeup.clone();
        let poll_interval = config.poll_interval;

        tasks.push(task::spawn(async move {
            loop {
                match dispatcher.process_batch().await {
                    Ok(0) => {
                        select! {
                            _ = wakeup.notified() => {}
                            _ = sleep(poll_interval) => {}
                        }
                    }

                    Ok(_) => {}

                    Err(error) => {
                        warn!(worker, error:?; "dispatch batch failed");
                        sleep(poll_interval).await;
                    }
                }
            }
        }));
    }

    // Events wake idle workers early.
    tasks.push(task::spawn({
        let wakeup = wakeup.clone();
        async move {
            let mut enqueued = pin!(subscriber.subscribe::<NotificationEnqueued>());
            while let Some(event) = enqueued.next().await {
                match event {
                    Ok(_) => wakeup.notify_waiters(),
                    Err(error) => warn!(error:%; "cannot receive NotificationEnqueued"),
                }
            }
            warn!("NotificationEnqueued stream ended");
        }
    }));

    tasks.push(task::spawn({
        let dispatcher = dispatcher.clone();
        let cleanup_interval = config.cleanup_interval;
        async move {
            let mut ticker = interval(cleanup_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(error) = dispatcher.cleanup().await {
                    warn!(error:?; "notification cleanup failed");
                }
            }
        }
    }));

    sigterm.recv().await;
    warn!("SIGTERM received");
    for task in tasks {
        task.abort();
    }

    Ok(())
}
