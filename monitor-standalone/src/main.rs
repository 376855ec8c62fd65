// This file is part of xrpl-nft-monitor.
// Copyright (C) 2025 xrpl-nft-monitor contributors
// SPDX-License-Identifier: Apache-2.0

use serde::Deserialize;

#[tokio::main]
async fn main() {
    use log::error;
    use monitor_common::telemetry;
    use std::panic;

    telemetry::init_logging();
    panic::set_hook(Box::new(|panic| error!(panic:%; "process panicked")));

    if let Err(error) = run().await {
        let backtrace = error.backtrace();
        let error = format!("{error:#}");
        error!(error, backtrace:%; "process exited with ERROR");
        std::process::exit(1);
    }
}

#[derive(Debug, Clone, Deserialize)]
struct Config {
    run_migrations: bool,

    #[serde(rename = "telemetry")]
    telemetry_config: monitor_common::telemetry::Config,

    #[serde(rename = "storage")]
    storage_config: monitor_common::infra::pool::Config,

    #[serde(rename = "nodes")]
    node_configs: Vec<ledger_supervisor::infra::ws_node::Config>,

    #[serde(rename = "supervisor")]
    supervisor_config: ledger_supervisor::application::Config,

    #[serde(rename = "indexer")]
    indexer_config: activity_indexer::application::Config,

    #[serde(rename = "enricher")]
    enricher_config: nft_enricher::application::Config,

    #[serde(rename = "fetcher")]
    fetcher_config: nft_enricher::infra::fetcher::Config,

    #[serde(rename = "matcher")]
    matcher_config: alert_matcher::application::Config,

    #[serde(rename = "dispatcher")]
    dispatcher_config: notification_dispatcher::application::Config,

    #[serde(rename = "senders")]
    sender_config: notification_dispatcher::infra::senders::Config,

    #[cfg(feature = "cloud")]
    #[serde(rename = "broker")]
    broker_config: monitor_common::infra::pub_sub::nats::Config,

    #[cfg(feature = "cloud")]
    #[serde(rename = "object_store")]
    object_store_config: Option<monitor_common::infra::object_store::nats::Config>,
}

async fn run() -> anyhow::Result<()> {
    use anyhow::Context;
    use log::info;
    use monitor_common::{config::ConfigExt, infra::pool::PostgresPool};

    let config = Config::load().context("load configuration")?;
    info!(config:?; "starting");

    monitor_common::telemetry::init_tracing(config.telemetry_config.tracing_config.clone());
    monitor_common::telemetry::init_metrics(config.telemetry_config.metrics_config.clone());

    let pool = PostgresPool::new(config.storage_config.clone())
        .await
        .context("create DB pool for Postgres")?;

    if config.run_migrations {
        monitor_common::infra::migrations::run(&pool)
            .await
            .context("run migrations")?;
    }

    #[cfg(feature = "cloud")]
    {
        use monitor_common::infra::{object_store::nats::NatsObjectStore, pub_sub::nats::NatsPubSub};

        let pub_sub = NatsPubSub::new(config.broker_config.clone())
            .await
            .context("connect to NATS broker")?;

        let object_store = match config.object_store_config.clone() {
            Some(object_store_config) => Some(
                NatsObjectStore::new(object_store_config)
                    .await
                    .context("create NATS object store")?,
            ),
            None => None,
        };

        return run_pipeline(config, pool, pub_sub, object_store).await;
    }

    #[cfg(not(feature = "cloud"))]
    {
        use monitor_common::infra::{
            object_store::in_mem::InMemObjectStore, pub_sub::in_mem::InMemPubSub,
        };

        let pub_sub = InMemPubSub::default();

        // No object store in single-process mode: image caching is skipped.
        run_pipeline(config, pool, pub_sub, None::<InMemObjectStore>).await
    }
}

/// Assemble and run all five pipeline stages until the first one fails or
/// SIGTERM arrives.
async fn run_pipeline<PS, O>(
    config: Config,
    pool: monitor_common::infra::pool::PostgresPool,
    pub_sub: PS,
    object_store: Option<O>,
) -> anyhow::Result<()>
where
    PS: monitor_common::domain::Publisher + monitor_common::domain::Subscriber,
    O: monitor_common::domain::ObjectStore,
{
    use anyhow::Context;
    use ledger_supervisor::{
        application::{SupervisedNode, Supervisor},
        infra::ws_node::WsNode,
    };
    use log::warn;
    use tokio::{
        select,
        signal::unix::{SignalKind, signal},
        task,
    };

    let sigterm = || signal(SignalKind::terminate()).context("register SIGTERM handler");

    let nodes = config
        .node_configs
        .iter()
        .map(|node_config| SupervisedNode {
            url: node_config.url.clone(),
            priority: node_config.priority,
            node: WsNode::new(node_config.clone()),
        })
        .collect::<Vec<_>>();
    let supervisor = Supervisor::new(config.supervisor_config, nodes);

    let transactions = supervisor.subscribe_transactions();
    let ledgers = supervisor.subscribe_ledgers();

    let supervisor_task = task::spawn(ledger_supervisor::application::run(
        supervisor.clone(),
        sigterm()?,
    ));

    let indexer_task = task::spawn(activity_indexer::application::run(
        config.indexer_config,
        transactions,
        ledgers,
        activity_indexer::infra::storage::Storage::new(pool.clone()),
        pub_sub.clone(),
        sigterm()?,
    ));

    let fetcher = nft_enricher::infra::fetcher::HttpFetcher::new(config.fetcher_config)
        .context("create HTTP fetcher")?;
    let enricher_task = task::spawn(nft_enricher::application::run(
        config.enricher_config,
        nft_enricher::infra::storage::Storage::new(pool.clone()),
        fetcher,
        object_store,
        pub_sub.clone(),
        sigterm()?,
    ));

    let matcher_task = task::spawn(alert_matcher::application::run(
        config.matcher_config,
        alert_matcher::infra::storage::Storage::new(pool.clone()),
        pub_sub.clone(),
        pub_sub.clone(),
        sigterm()?,
    ));

    let sender = notification_dispatcher::infra::senders::HttpSender::new(config.sender_config)
        .context("create HTTP sender")?;
    let dispatcher_task = task::spawn(notification_dispatcher::application::run(
        config.dispatcher_config,
        notification_dispatcher::infra::storage::Storage::new(pool),
        sender,
        pub_sub,
        sigterm()?,
    ));

    select! {
        result = supervisor_task => result
            .context("supervisor task panicked")
            .and_then(|r| r.context("supervisor task failed")),

        result = indexer_task => result
            .context("indexer task panicked")
            .and_then(|r| r.context("indexer task failed")),

        result = enricher_task => result
            .context("enricher task panicked")
            .and_then(|r| r.context("enricher task failed")),

        result = matcher_task => result
            .context("matcher task panicked")
            .and_then(|r| r.context("matcher task failed")),

        result = dispatcher_task => result
            .context("dispatcher task panicked")
            .and_then(|r| r.context("dispatcher task failed")),
    }
    .inspect(|_| warn!("pipeline stage completed"))
}
