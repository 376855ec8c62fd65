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
    CircuitBreaker, DedupRing, Gap, GapRegistry, NodeHealth, NodeState, SupervisorHealth,
    circuit_breaker,
    node::{Node, NodeEvent},
};
use async_stream::stream;
use fastrace::trace;
use futures::{Stream, StreamExt, future};
use log::{debug, info, warn};
use metrics::{counter, gauge};
use monitor_common::{
    domain::{LedgerClosed, LedgerIndex, RawTransaction, UnixMillis, now_unix_millis},
    error::BoxError,
};
use parking_lot::Mutex;
use rand::Rng;
use serde::Deserialize;
use std::{pin::pin, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{
    select,
    signal::unix::Signal,
    sync::broadcast,
    task,
    time::{interval, sleep},
};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(with = "humantime_serde")]
    pub health_check_interval: Duration,

    /// Failed health checks after which a node is marked unhealthy and its
    /// breaker tripped.
    pub max_consecutive_failures: u32,

    #[serde(with = "humantime_serde")]
    pub reconnect_base_delay: Duration,

    #[serde(with = "humantime_serde")]
    pub reconnect_max_delay: Duration,

    /// Size of the first-copy-wins dedup ring in ledgers.
    pub dedup_ledger_window: usize,

    pub backfill_max_attempts: u32,

    #[serde(with = "humantime_serde")]
    pub backfill_base_delay: Duration,

    #[serde(rename = "circuit_breaker")]
    pub circuit_breaker_config: circuit_breaker::Config,

    /// Capacity of the broadcast channels feeding subscribers.
    pub subscription_buffer: usize,
}

/// A node handed to the supervisor along with its identity and priority.
pub struct SupervisedNode<N> {
    pub node: N,
    pub url: String,
    pub priority: u32,
}

/// Supervises a set of redundant upstream nodes and exposes deduplicated
/// `ledger` and `transactions` streams, gap detection and backfill.
pub struct Supervisor<N> {
    inner: Arc<Inner<N>>,
}

impl<N> Clone for Supervisor<N> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<N> {
    config: Config,
    nodes: Vec<NodeSlot<N>>,
    dedup: Mutex<DedupRing>,
    gaps: Mutex<GapRegistry>,
    ledgers_tx: broadcast::Sender<LedgerClosed>,
    transactions_tx: broadcast::Sender<RawTransaction>,
}

struct NodeSlot<N> {
    node: N,
    url: String,
    priority: u32,
    status: Mutex<NodeStatus>,
    breaker: CircuitBreaker,
}

#[derive(Debug, Clone, Copy)]
struct NodeStatus {
    state: NodeState,
    consecutive_failures: u32,
    last_check: Option<UnixMillis>,
    last_ping: Option<Duration>,
}

impl<N> Supervisor<N>
where
    N: Node,
{
    pub fn new(config: Config, nodes: Vec<SupervisedNode<N>>) -> Self {
        let (ledgers_tx, _) = broadcast::channel(config.subscription_buffer);
        let (transactions_tx, _) = broadcast::channel(config.subscription_buffer);

        let nodes = nodes
            .into_iter()
            .map(|SupervisedNode { node, url, priority }| NodeSlot {
                node,
                url,
                priority,
                status: Mutex::new(NodeStatus {
                    state: NodeState::Disconnected,
                    consecutive_failures: 0,
                    last_check: None,
                    last_ping: None,
                }),
                breaker: CircuitBreaker::new(config.circuit_breaker_config.clone()),
            })
            .collect();

        Self {
            inner: Arc::new(Inner {
                dedup: Mutex::new(DedupRing::new(config.dedup_ledger_window)),
                gaps: Mutex::new(GapRegistry::default()),
                config,
                nodes,
                ledgers_tx,
                transactions_tx,
            }),
        }
    }

    /// Subscribe to deduplicated closed-ledger events. Dropping the stream
    /// unsubscribes.
    pub fn subscribe_ledgers(&self) -> impl Stream<Item = LedgerClosed> + Send + 'static {
        subscription(self.inner.ledgers_tx.subscribe())
    }

    /// Subscribe to deduplicated validated transactions, including ones
    /// re-emitted by backfills. Dropping the stream unsubscribes.
    pub fn subscribe_transactions(&self) -> impl Stream<Item = RawTransaction> + Send + 'static {
        subscription(self.inner.transactions_tx.subscribe())
    }

    /// The gaps observed since start that have not been backfilled yet.
    pub fn detect_ledger_gaps(&self) -> Vec<Gap> {
        self.inner.gaps.lock().outstanding()
    }

    /// Health snapshot over all supervised nodes.
    pub fn health(&self) -> SupervisorHealth {
        let nodes = self
            .inner
            .nodes
            .iter()
            .map(|slot| {
                let status = slot.status.lock();
                NodeHealth {
                    url: slot.url.clone(),
                    is_healthy: status.state.is_healthy() && !slot.breaker.is_open(),
                    consecutive_failures: status.consecutive_failures,
                    last_check: status.last_check,
                }
            })
            .collect::<Vec<_>>();

        let healthy_nodes = nodes.iter().filter(|node| node.is_healthy).count();

        SupervisorHealth {
            total_nodes: self.inner.nodes.len(),
            healthy_nodes,
            nodes,
        }
    }

    /// Pull every transaction in the inclusive ledger range through a
    /// healthy node and re-emit them on the transaction stream as if
    /// freshly observed.
    #[trace(properties = { "start_ledger": "{start_ledger}", "end_ledger": "{end_ledger}" })]
    pub async fn backfill_range(
        &self,
        start_ledger: LedgerIndex,
        end_ledger: LedgerIndex,
    ) -> Result<(), BackfillError> {
        for ledger_index in start_ledger..=end_ledger {
            let node = self.healthy_node().ok_or(BackfillError::NoHealthyNode)?;

            let ledger = node
                .fetch_ledger(ledger_index)
                .await
                .map_err(|error| BackfillError::Node(error.into()))?;

            let ledger_closed = LedgerClosed {
                ledger_index: ledger.ledger_index,
                ledger_hash: ledger.ledger_hash,
                close_time: ledger.close_time,
                transaction_count: ledger.transactions.len() as u32,
            };
            let _ = self.inner.ledgers_tx.send(ledger_closed);

            for transaction in ledger.transactions {
                counter!("supervisor_backfilled_transactions_total").increment(1);
                let _ = self.inner.transactions_tx.send(transaction);
            }

            self.inner.gaps.lock().drain(ledger_index, ledger_index);
            debug!(ledger_index; "ledger backfilled");
        }

        Ok(())
    }

    /// Run all node subscription loops and the health check loop; never
    /// completes.
    pub async fn run(self) {
        let mut tasks = (0..self.inner.nodes.len())
            .map(|index| task::spawn(self.clone().run_node(index)))
            .collect::<Vec<_>>();
        tasks.push(task::spawn(self.clone().run_health_checks()));

        future::join_all(tasks).await;
    }

    /// The healthy node with the lowest priority integer; ties broken by the
    /// lowest observed ping.
    fn healthy_node(&self) -> Option<N> {
        self.inner
            .nodes
            .iter()
            .filter(|slot| {
                let status = slot.status.lock();
                status.state.is_healthy() && slot.breaker.call_permitted()
            })
            .min_by_key(|slot| {
                let status = slot.status.lock();
                (
                    slot.priority,
                    status.last_ping.unwrap_or(Duration::MAX),
                )
            })
            .map(|slot| slot.node.clone())
    }

    async fn run_node(self, index: usize) {
        let slot = &self.inner.nodes[index];

        loop {
            slot.status.lock().state = NodeState::Connecting;
            debug!(url = slot.url.as_str(); "connecting");

            let mut node = slot.node.clone();
            let mut first_event_seen = false;
            {
                let events = node.events();
                let mut events = pin!(events);
                slot.status.lock().state = NodeState::Subscribed;

                while let Some(event) = events.next().await {
                    match event {
                        Ok(event) => {
                            if !first_event_seen {
                                first_event_seen = true;
                                let mut status = slot.status.lock();
                                status.state = NodeState::Healthy;
                                status.consecutive_failures = 0;
                                slot.breaker.record_success();
                                info!(url = slot.url.as_str(); "node subscribed");
                            }

                            self.handle_event(event);
                        }

                        Err(error) => {
                            warn!(url = slot.url.as_str(), error:%; "node stream failed");
                            break;
                        }
                    }
                }
            }

            let failures = {
                let mut status = slot.status.lock();
                status.state = NodeState::Disconnected;
                status.consecutive_failures += 1;
                status.consecutive_failures
            };
            slot.breaker.record_failure();

            let delay = reconnect_delay(
                self.inner.config.reconnect_base_delay,
                self.inner.config.reconnect_max_delay,
                failures,
            );
            debug!(url = slot.url.as_str(), failures, delay:?; "reconnecting after delay");
            sleep(delay).await;
        }
    }

    fn handle_event(&self, event: NodeEvent) {
        match event {
            NodeEvent::LedgerClosed(ledger_closed) => {
                let first_copy = self
                    .inner
                    .dedup
                    .lock()
                    .record_ledger_closed(ledger_closed.ledger_index);
                if !first_copy {
                    return;
                }

                gauge!("supervisor_highest_ledger").set(ledger_closed.ledger_index as f64);
                info!(
                    ledger_index = ledger_closed.ledger_index,
                    transaction_count = ledger_closed.transaction_count;
                    "ledger closed"
                );

                let gap = self.inner.gaps.lock().record_closed(ledger_closed.ledger_index);
                let _ = self.inner.ledgers_tx.send(ledger_closed);

                if let Some(gap) = gap {
                    counter!("supervisor_gaps_total").increment(1);
                    warn!(
                        start_ledger = gap.start_ledger,
                        end_ledger = gap.end_ledger;
                        "ledger gap detected"
                    );

                    task::spawn(self.clone().backfill_with_retry(gap));
                }
            }

            NodeEvent::Transaction(transaction) => {
                let first_copy = self
                    .inner
                    .dedup
                    .lock()
                    .record_transaction(transaction.ledger_index, &transaction.hash);
                if !first_copy {
                    return;
                }

                counter!("supervisor_transactions_total").increment(1);
                let _ = self.inner.transactions_tx.send(transaction);
            }
        }
    }

    async fn backfill_with_retry(self, gap: Gap) {
        let max_attempts = self.inner.config.backfill_max_attempts;

        for attempt in 1..=max_attempts {
            match self.backfill_range(gap.start_ledger, gap.end_ledger).await {
                Ok(()) => {
                    info!(
                        start_ledger = gap.start_ledger,
                        end_ledger = gap.end_ledger,
                        attempt;
                        "gap backfilled"
                    );
                    return;
                }

                Err(error) => {
                    warn!(
                        start_ledger = gap.start_ledger,
                        end_ledger = gap.end_ledger,
                        attempt,
                        error:%;
                        "backfill attempt failed"
                    );

                    let delay = reconnect_delay(
                        self.inner.config.backfill_base_delay,
                        self.inner.config.reconnect_max_delay,
                        attempt,
                    );
                    sleep(delay).await;
                }
            }
        }

        // The gap stays outstanding and visible via detect_ledger_gaps.
        warn!(
            start_ledger = gap.start_ledger,
            end_ledger = gap.end_ledger;
            "backfill gave up, gap remains outstanding"
        );
    }

    async fn run_health_checks(self) {
        let mut ticker = interval(self.inner.config.health_check_interval);
        ticker.tick().await;

        loop {
            ticker.tick().await;

            for slot in &self.inner.nodes {
                if !slot.breaker.call_permitted() {
                    continue;
                }

                match slot.node.ping().await {
                    Ok(latency) => {
                        let mut status = slot.status.lock();
                        status.last_check = Some(now_unix_millis());
                        status.last_ping = Some(latency);
                        status.consecutive_failures = 0;
                        if status.state == NodeState::Degraded {
                            status.state = NodeState::Healthy;
                        }
                        slot.breaker.record_success();
                    }

                    Err(error) => {
                        let failures = {
                            let mut status = slot.status.lock();
                            status.last_check = Some(now_unix_millis());
                            status.consecutive_failures += 1;
                            if status.state.is_healthy() {
                                status.state = NodeState::Degraded;
                            }
                            status.consecutive_failures
                        };

                        warn!(url = slot.url.as_str(), failures, error:%; "health check failed");

                        if failures > self.inner.config.max_consecutive_failures {
                            slot.breaker.trip();
                            slot.status.lock().state = NodeState::Disconnected;
                        }
                    }
                }
            }

            let healthy = self.health().healthy_nodes;
            gauge!("supervisor_healthy_nodes").set(healthy as f64);
        }
    }
}

/// Run the supervisor until SIGTERM.
pub async fn run<N>(supervisor: Supervisor<N>, mut sigterm: Signal) -> anyhow::Result<()>
where
    N: Node,
{
    select! {
        _ = supervisor.run() => {
            warn!("supervisor completed");
            Ok(())
        }

        _ = sigterm.recv() => {
            warn!("SIGTERM received");
            Ok(())
        }
    }
}

fn subscription<T>(receiver: broadcast::Receiver<T>) -> impl Stream<Item = T> + Send + 'static
where
    T: Clone + Send + 'static,
{
    stream! {
        let mut receiver = receiver;
        loop {
            match receiver.recv().await {
                Ok(item) => yield item,

                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped; "subscription lagged, skipping");
                }

                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }
}

fn reconnect_delay(base: Duration, max: Duration, failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(16);
    let delay = base.saturating_mul(2u32.saturating_pow(exponent)).min(max);

    // Jitter against thundering herds.
    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..250));
    delay + jitter
}

/// Error possibly returned by [Supervisor::backfill_range].
#[derive(Debug, Error)]
pub enum BackfillError {
    #[error("no healthy node available")]
    NoHealthyNode,

    #[error("node error")]
    Node(#[source] BoxError),
}

#[cfg(test)]
mod tests {
    use crate::{
        application::{Config, SupervisedNode, Supervisor},
        domain::{
            Gap, circuit_breaker,
            node::{LedgerTransactions, Node, NodeEvent},
        },
    };
    use futures::{Stream, StreamExt, stream};
    use monitor_common::domain::{LedgerClosed, LedgerIndex, RawTransaction};
    use std::{convert::Infallible, time::Duration};
    use tokio::time::timeout;

    fn config() -> Config {
        Config {
            health_check_interval: Duration::from_millis(100),
            max_consecutive_failures: 3,
            reconnect_base_delay: Duration::from_millis(10),
            reconnect_max_delay: Duration::from_secs(1),
            dedup_ledger_window: 1_024,
            backfill_max_attempts: 3,
            backfill_base_delay: Duration::from_millis(10),
            circuit_breaker_config: circuit_breaker::Config {
                failure_threshold: 5,
                reset_timeout: Duration::from_secs(30),
            },
            subscription_buffer: 256,
        }
    }

    fn ledger_closed(ledger_index: LedgerIndex) -> LedgerClosed {
        LedgerClosed {
            ledger_index,
            ledger_hash: format!("{ledger_index:064X}"),
            close_time: 1_672_531_200_000,
            transaction_count: 1,
        }
    }

    fn transaction(ledger_index: LedgerIndex, hash: &str) -> RawTransaction {
        RawTransaction {
            hash: hash.to_string(),
            ledger_index,
            engine_result: "tesSUCCESS".to_string(),
            close_time: 1_672_531_200_000,
            transaction: serde_json::json!({ "TransactionType": "NFTokenMint", "hash": hash }),
            meta: serde_json::Value::Null,
        }
    }

    #[derive(Clone)]
    struct MockNode;

    impl Node for MockNode {
        type Error = Infallible;

        fn events(&mut self) -> impl Stream<Item = Result<NodeEvent, Self::Error>> + Send {
            let script = vec![
                NodeEvent::LedgerClosed(ledger_closed(100)),
                NodeEvent::Transaction(transaction(100, "A1")),
                NodeEvent::LedgerClosed(ledger_closed(101)),
                NodeEvent::Transaction(transaction(101, "B2")),
                NodeEvent::LedgerClosed(ledger_closed(104)),
            ];

            stream::iter(script.into_iter().map(Ok)).chain(stream::pending())
        }

        async fn ping(&self) -> Result<Duration, Self::Error> {
            Ok(Duration::from_millis(10))
        }

        async fn fetch_ledger(
            &self,
            ledger_index: LedgerIndex,
        ) -> Result<LedgerTransactions, Self::Error> {
            Ok(LedgerTransactions {
                ledger_index,
                ledger_hash: format!("{ledger_index:064X}"),
                close_time: 1_672_531_200_000,
                transactions: vec![transaction(ledger_index, &format!("F{ledger_index}"))],
            })
        }
    }

    #[tokio::test]
    async fn test_dedup_gap_and_backfill() {
        let nodes = vec![
            SupervisedNode {
                node: MockNode,
                url: "wss://one.example.com".to_string(),
                priority: 1,
            },
            SupervisedNode {
                node: MockNode,
                url: "wss://two.example.com".to_string(),
                priority: 2,
            },
        ];
        let supervisor = Supervisor::new(config(), nodes);

        let transactions = supervisor.subscribe_transactions();
        let mut transactions = Box::pin(transactions);

        tokio::spawn(supervisor.clone().run());

        // Both nodes emit the same script; each transaction must come
        // through exactly once, and the gap (102, 103) must be backfilled.
        let mut hashes = Vec::new();
        for _ in 0..4 {
            let transaction = timeout(Duration::from_secs(5), transactions.next())
                .await
                .expect("transaction within timeout")
                .expect("stream is open");
            hashes.push(transaction.hash);
        }

        hashes.sort();
        assert_eq!(hashes, ["A1", "B2", "F102", "F103"]);

        // The backfill drained the gap.
        assert_eq!(supervisor.detect_ledger_gaps(), Vec::<Gap>::new());
    }

    #[tokio::test]
    async fn test_gap_detection() {
        let nodes = vec![SupervisedNode {
            node: MockNode,
            url: "wss://one.example.com".to_string(),
            priority: 1,
        }];

        let supervisor = Supervisor::new(config(), nodes);
        let mut ledgers = Box::pin(supervisor.subscribe_ledgers());

        tokio::spawn(supervisor.clone().run());

        let mut seen = Vec::new();
        for _ in 0..3 {
            let ledger = timeout(Duration::from_secs(5), ledgers.next())
                .await
                .expect("ledger within timeout")
                .expect("stream is open");
            seen.push(ledger.ledger_index);
        }
        assert_eq!(seen, vec![100, 101, 104]);
    }
}
