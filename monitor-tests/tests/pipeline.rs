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

//! End-to-end pipeline scenarios over the in-memory harness: classifier →
//! matcher → dispatcher share one [InMemDb]; the supervisor runs against
//! scripted nodes.

use activity_indexer::application::{ActivityIndexer, Config as IndexerConfig};
use alert_matcher::{
    application::{Config as MatcherConfig, Matcher},
    domain::find_matches,
};
use bigdecimal::BigDecimal;
use futures::{Stream, StreamExt, stream};
use ledger_supervisor::{
    application::{Config as SupervisorConfig, SupervisedNode, Supervisor},
    domain::{
        circuit_breaker,
        node::{LedgerTransactions, Node, NodeEvent},
    },
};
use monitor_common::{
    domain::{
        ActivityType, AlertConfig, ChannelKind, LedgerClosed, LedgerIndex, NotificationChannel,
        NotificationStatus, RawTransaction, Subscriber, TokenId, TraitFilter,
    },
    infra::pub_sub::in_mem::InMemPubSub,
};
use monitor_tests::{db::InMemDb, sender::RecordingSender};
use notification_dispatcher::application::{Config as DispatcherConfig, Dispatcher};
use serde_json::json;
use std::{convert::Infallible, num::NonZeroUsize, str::FromStr, time::Duration};
use uuid::Uuid;

const NFT_ID: &str = "000827103B94ECBB7BF0A0A6ED62B3607801A27B65D4679A16E5DA9C00000D9A";

fn indexer_config() -> IndexerConfig {
    IndexerConfig {
        batch_size: 100,
        batch_max_age: Duration::from_secs(2),
        dedup_cache_size: NonZeroUsize::new(4_096).unwrap(),
    }
}

fn matcher_config() -> MatcherConfig {
    MatcherConfig {
        poll_interval: Duration::from_secs(1),
        batch_size: 100,
    }
}

fn dispatcher_config() -> DispatcherConfig {
    DispatcherConfig {
        worker_count: 1,
        poll_interval: Duration::from_secs(1),
        claim_batch_size: 10,
        max_retries: 3,
        retry_delays: vec![
            Duration::from_secs(1),
            Duration::from_secs(5),
            Duration::from_secs(15),
        ],
        cleanup_interval: Duration::from_secs(3_600),
        retention: Duration::from_secs(30 * 24 * 3_600),
        stale_in_flight_after: Duration::from_secs(600),
    }
}

fn email_alert(collection_id: Option<i64>, activity_types: Vec<ActivityType>) -> AlertConfig {
    AlertConfig {
        id: Uuid::from_u128(1),
        user_id: "user-1".to_string(),
        name: "my alert".to_string(),
        collection_id,
        activity_types,
        min_price_drops: None,
        max_price_drops: None,
        trait_filters: None,
        notification_channels: vec![NotificationChannel::Email {
            recipients: vec!["alice@example.com".to_string()],
            subject: None,
        }],
        is_active: true,
    }
}

fn mint_raw(hash: &str, account: &str) -> RawTransaction {
    RawTransaction {
        hash: hash.to_string(),
        ledger_index: 100,
        engine_result: "tesSUCCESS".to_string(),
        close_time: 1_672_531_200_000,
        transaction: json!({
            "TransactionType": "NFTokenMint",
            "Account": account,
            "NFTokenTaxon": 1,
            "URI": "697066733A2F2F6261666B726569",
            "hash": hash,
        }),
        meta: json!({
            "TransactionResult": "tesSUCCESS",
            "nftoken_id": NFT_ID,
        }),
    }
}

fn sale_raw(hash: &str, amount: serde_json::Value) -> RawTransaction {
    RawTransaction {
        hash: hash.to_string(),
        ledger_index: 101,
        engine_result: "tesSUCCESS".to_string(),
        close_time: 1_672_531_200_000,
        transaction: json!({
            "TransactionType": "NFTokenAcceptOffer",
            "Account": "rBuyer1111111111111111111111111111",
            "hash": hash,
        }),
        meta: json!({
            "TransactionResult": "tesSUCCESS",
            "AffectedNodes": [
                {
                    "DeletedNode": {
                        "LedgerEntryType": "NFTokenOffer",
                        "FinalFields": {
                            "Amount": amount,
                            "Owner": "rSeller111111111111111111111111111",
                            "NFTokenID": NFT_ID,
                            "Flags": 1
                        }
                    }
                }
            ]
        }),
    }
}

/// Scenario: a mint matched by a collection-scoped alert ends as one sent
/// email notification.
#[tokio::test]
async fn test_mint_collection_scoped_alert() {
    let db = InMemDb::default();
    let pub_sub = InMemPubSub::default();

    let indexer = ActivityIndexer::new(&indexer_config(), db.clone(), pub_sub.clone());
    indexer.ingest(&mint_raw(&"A1".repeat(32), "rAlice11111111111111111111111111111"));
    indexer.force_flush().await.expect("flush succeeds");

    // The collection was created lazily from the decoded token id.
    let decoded = TokenId::try_from(NFT_ID).unwrap().decode();
    let collection_id = db
        .collection_id(&decoded.issuer, decoded.taxon)
        .expect("collection created on first sighting");

    db.seed_alert_config(email_alert(Some(collection_id), vec![ActivityType::Mint]));

    let matcher = Matcher::new(&matcher_config(), db.clone(), pub_sub.clone());
    matcher.process_pending().await.expect("matching succeeds");

    let sender = RecordingSender::default();
    let dispatcher = Dispatcher::new(dispatcher_config(), db.clone(), sender.clone());
    dispatcher.process_batch().await.expect("dispatch succeeds");

    let notifications = db.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].status, NotificationStatus::Sent);
    assert_eq!(notifications[0].channel.kind(), ChannelKind::Email);

    let payloads = sender.payloads();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].activity.activity_type, ActivityType::Mint);
    assert_eq!(
        payloads[0].activity.to_address.as_deref(),
        Some("rAlice11111111111111111111111111111")
    );
}

/// Scenario: a sale passing the price filter carries the XRP price with six
/// decimals in the payload.
#[tokio::test]
async fn test_sale_with_price_filter() {
    let db = InMemDb::default();
    let pub_sub = InMemPubSub::default();

    let mut alert = email_alert(None, vec![ActivityType::Sale]);
    alert.min_price_drops = Some(BigDecimal::from_str("1000000000").unwrap());
    db.seed_alert_config(alert);

    let indexer = ActivityIndexer::new(&indexer_config(), db.clone(), pub_sub.clone());
    indexer.ingest(&sale_raw(&"B2".repeat(32), json!("1500000000000")));
    indexer.force_flush().await.expect("flush succeeds");

    let matcher = Matcher::new(&matcher_config(), db.clone(), pub_sub.clone());
    matcher.process_pending().await.expect("matching succeeds");

    let sender = RecordingSender::default();
    let dispatcher = Dispatcher::new(dispatcher_config(), db.clone(), sender.clone());
    dispatcher.process_batch().await.expect("dispatch succeeds");

    let payloads = sender.payloads();
    assert_eq!(payloads.len(), 1);
    assert_eq!(
        payloads[0].activity.price_xrp().as_deref(),
        Some("1500000.000000")
    );

    assert_eq!(db.notifications()[0].status, NotificationStatus::Sent);
}

/// Scenario: trait filters reject with a readable reason and produce no
/// notification.
#[tokio::test]
async fn test_trait_filter_rejection() {
    let db = InMemDb::default();
    let pub_sub = InMemPubSub::default();

    let indexer = ActivityIndexer::new(&indexer_config(), db.clone(), pub_sub.clone());
    indexer.ingest(&mint_raw(&"C3".repeat(32), "rAlice11111111111111111111111111111"));
    indexer.force_flush().await.expect("flush succeeds");

    let nft_id = TokenId::try_from(NFT_ID).unwrap();
    db.set_nft_traits(&nft_id, json!({ "rarity": "common", "level": 50 }));

    let mut alert = email_alert(None, vec![ActivityType::Mint]);
    alert.trait_filters = Some(vec![
        TraitFilter {
            trait_type: "rarity".to_string(),
            value: json!("legendary"),
            operator: "equals".to_string(),
        },
        TraitFilter {
            trait_type: "level".to_string(),
            value: json!(90),
            operator: "greater_than".to_string(),
        },
    ]);
    db.seed_alert_config(alert.clone());

    // The reasons log names the first failing filter.
    let activities = alert_matcher::domain::storage::Storage::activities_after(&db, 0, 10)
        .await
        .unwrap();
    let results = find_matches(&activities[0], &[alert]);
    assert!(!results[0].matched);
    assert!(
        results[0]
            .reasons
            .contains(&"Trait rarity (common) does not equal legendary".to_string())
    );

    let matcher = Matcher::new(&matcher_config(), db.clone(), pub_sub.clone());
    matcher.process_pending().await.expect("matching succeeds");
    assert!(db.notifications().is_empty());
}

/// P1: identical raw transactions ingested by two replicas yield exactly
/// one activity row.
#[tokio::test]
async fn test_dedup_across_replicas() {
    let db = InMemDb::default();
    let pub_sub = InMemPubSub::default();

    let replica_one = ActivityIndexer::new(&indexer_config(), db.clone(), pub_sub.clone());
    let replica_two = ActivityIndexer::new(&indexer_config(), db.clone(), pub_sub.clone());

    let raw = mint_raw(&"D4".repeat(32), "rAlice11111111111111111111111111111");
    replica_one.ingest(&raw);
    replica_two.ingest(&raw);
    replica_one.force_flush().await.expect("flush succeeds");
    replica_two.force_flush().await.expect("flush succeeds");

    assert_eq!(db.activities().len(), 1);
}

#[derive(Clone)]
struct ScriptedNode;

fn ledger_closed(ledger_index: LedgerIndex) -> LedgerClosed {
    LedgerClosed {
        ledger_index,
        ledger_hash: format!("{ledger_index:064X}"),
        close_time: 1_672_531_200_000,
        transaction_count: 1,
    }
}

impl Node for ScriptedNode {
    type Error = Infallible;

    fn events(&mut self) -> impl Stream<Item = Result<NodeEvent, Self::Error>> + Send {
        let script = vec![
            NodeEvent::LedgerClosed(ledger_closed(100)),
            NodeEvent::Transaction(mint_raw(
                &"E5".repeat(32),
                "rAlice11111111111111111111111111111",
            )),
            NodeEvent::LedgerClosed(ledger_closed(101)),
            NodeEvent::LedgerClosed(ledger_closed(104)),
        ];

        stream::iter(script.into_iter().map(Ok)).chain(stream::pending())
    }

    async fn ping(&self) -> Result<Duration, Self::Error> {
        Ok(Duration::from_millis(5))
    }

    async fn fetch_ledger(
        &self,
        ledger_index: LedgerIndex,
    ) -> Result<LedgerTransactions, Self::Error> {
        let mut raw = sale_raw(&format!("{ledger_index:064}"), json!("2000000"));
        raw.ledger_index = ledger_index;

        Ok(LedgerTransactions {
            ledger_index,
            ledger_hash: format!("{ledger_index:064X}"),
            close_time: 1_672_531_200_000,
            transactions: vec![raw],
        })
    }
}

/// P4: after a gap is backfilled, every transaction in the range is
/// materialized in the activity store.
#[tokio::test]
async fn test_gap_backfill_materializes_activities() {
    let supervisor_config = SupervisorConfig {
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
    };

    let supervisor = Supervisor::new(
        supervisor_config,
        vec![SupervisedNode {
            node: ScriptedNode,
            url: "wss://one.example.com".to_string(),
            priority: 1,
        }],
    );

    let mut transactions = Box::pin(supervisor.subscribe_transactions());
    tokio::spawn(supervisor.clone().run());

    let db = InMemDb::default();
    let indexer = ActivityIndexer::new(
        &indexer_config(),
        db.clone(),
        InMemPubSub::default(),
    );

    // One live mint plus the two backfilled sales for the gap (102, 103).
    for _ in 0..3 {
        let raw = tokio::time::timeout(Duration::from_secs(5), transactions.next())
            .await
            .expect("transaction within timeout")
            .expect("stream is open");
        indexer.ingest(&raw);
    }
    indexer.force_flush().await.expect("flush succeeds");

    let mut ledgers = db
        .activities()
        .iter()
        .map(|row| row.activity.ledger_index)
        .collect::<Vec<_>>();
    ledgers.sort();
    assert_eq!(ledgers, vec![100, 102, 103]);

    assert!(supervisor.detect_ledger_gaps().is_empty());
}

/// At-least-once: a transiently failing send ends sent after a retry, and
/// event wake-ups are not required for progress.
#[tokio::test]
async fn test_retry_until_sent() {
    let db = InMemDb::default();
    let pub_sub = InMemPubSub::default();

    db.seed_alert_config(email_alert(None, vec![ActivityType::Sale]));

    let indexer = ActivityIndexer::new(&indexer_config(), db.clone(), pub_sub.clone());
    indexer.ingest(&sale_raw(&"F6".repeat(32), json!("5000000")));
    indexer.force_flush().await.expect("flush succeeds");

    let matcher = Matcher::new(&matcher_config(), db.clone(), pub_sub.clone());
    matcher.process_pending().await.expect("matching succeeds");

    let sender = RecordingSender::with_outcomes(vec![
        notification_dispatcher::domain::SendOutcome::transient_failure("HTTP 502: Bad Gateway"),
    ]);
    let dispatcher = Dispatcher::new(dispatcher_config(), db.clone(), sender.clone());

    dispatcher.process_batch().await.expect("dispatch succeeds");
    let notification = &db.notifications()[0];
    assert_eq!(notification.status, NotificationStatus::Pending);
    assert_eq!(notification.retry_count, 1);

    // Fast-forward the schedule and deliver again.
    notification_dispatcher::domain::storage::Storage::reschedule(
        &db,
        notification.id,
        notification.retry_count,
        0,
        "HTTP 502: Bad Gateway",
    )
    .await
    .unwrap();

    dispatcher.process_batch().await.expect("dispatch succeeds");
    assert_eq!(db.notifications()[0].status, NotificationStatus::Sent);
    assert_eq!(sender.payloads().len(), 2);
}

/// Direct enqueueing persists one pending row per enabled channel.
#[tokio::test]
async fn test_enqueue_row_per_channel() {
    let db = InMemDb::default();

    let indexer = ActivityIndexer::new(&indexer_config(), db.clone(), InMemPubSub::default());
    indexer.ingest(&mint_raw(&"B8".repeat(32), "rAlice11111111111111111111111111111"));
    indexer.force_flush().await.expect("flush succeeds");

    let mut alert = email_alert(None, vec![ActivityType::Mint]);
    alert.notification_channels.push(NotificationChannel::Webhook {
        url: "https://example.com/hook".to_string(),
        method: "POST".to_string(),
        headers: None,
        auth: None,
    });
    db.seed_alert_config(alert.clone());

    let sender = RecordingSender::default();
    let dispatcher = Dispatcher::new(dispatcher_config(), db.clone(), sender.clone());

    let ids = dispatcher.enqueue(1, &alert).await.expect("enqueue succeeds");
    assert_eq!(ids.len(), 2);

    dispatcher.process_batch().await.expect("dispatch succeeds");
    let notifications = db.notifications();
    assert_eq!(notifications.len(), 2);
    assert!(
        notifications
            .iter()
            .all(|notification| notification.status == NotificationStatus::Sent)
    );

    let kinds = notifications
        .iter()
        .map(|notification| notification.channel.kind())
        .collect::<Vec<_>>();
    assert_eq!(kinds, vec![ChannelKind::Email, ChannelKind::Webhook]);
}

/// Events published by the indexer reach subscribers of the shared broker.
#[tokio::test]
async fn test_events_flow_through_broker() {
    let db = InMemDb::default();
    let pub_sub = InMemPubSub::default();

    let mut indexed = Box::pin(
        pub_sub.subscribe::<monitor_common::domain::ActivityIndexed>(),
    );

    let indexer = ActivityIndexer::new(&indexer_config(), db.clone(), pub_sub.clone());
    indexer.ingest(&mint_raw(&"A7".repeat(32), "rAlice11111111111111111111111111111"));
    indexer.force_flush().await.expect("flush succeeds");

    let event = indexed
        .next()
        .await
        .expect("event published")
        .expect("event deserializes");
    assert_eq!(event.activity_type, ActivityType::Mint);
    assert_eq!(db.enrichment_task_count(), 1);
}
