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

use crate::domain::node::{LedgerTransactions, Node, NodeEvent};
use async_stream::stream;
use futures::{SinkExt, Stream, StreamExt};
use log::warn;
use monitor_common::domain::{
    LedgerClosed, LedgerIndex, RawTransaction, ripple_time_to_unix_millis,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};
use thiserror::Error;
use tokio::{net::TcpStream, time::timeout};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{self, Message},
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Configuration for one upstream node.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub url: String,

    /// Lower wins when several healthy nodes are available.
    pub priority: u32,

    #[serde(with = "humantime_serde", default = "connect_timeout_default")]
    pub connect_timeout: Duration,

    #[serde(with = "humantime_serde", default = "request_timeout_default")]
    pub request_timeout: Duration,
}

const fn connect_timeout_default() -> Duration {
    Duration::from_secs(10)
}

const fn request_timeout_default() -> Duration {
    Duration::from_secs(15)
}

/// An upstream XRPL node speaking the WebSocket RPC protocol. Subscriptions
/// hold a long-lived connection; `ping` and `fetch_ledger` round-trip over a
/// fresh one.
#[derive(Debug, Clone)]
pub struct WsNode {
    config: Arc<Config>,
    request_id: Arc<AtomicU64>,
}

impl WsNode {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            request_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    pub fn priority(&self) -> u32 {
        self.config.priority
    }

    async fn connect(&self) -> Result<WsStream, WsNodeError> {
        let connecting = connect_async(self.config.url.as_str());
        let (ws, _) = timeout(self.config.connect_timeout, connecting)
            .await
            .map_err(|_| WsNodeError::ConnectTimeout(self.config.connect_timeout))??;

        Ok(ws)
    }

    /// Send a command over a fresh connection and await the response with
    /// the matching id.
    async fn request(&self, command: Command) -> Result<Value, WsNodeError> {
        let id = command.id();
        let mut ws = self.connect().await?;

        let text = serde_json::to_string(&command)?;
        ws.send(Message::Text(text.into())).await?;

        let response = timeout(self.config.request_timeout, async {
            while let Some(message) = ws.next().await {
                match message? {
                    Message::Text(text) => {
                        let Ok(StreamMessage::Response(response)) =
                            serde_json::from_str::<StreamMessage>(text.as_str())
                        else {
                            continue;
                        };

                        if response.id == Some(id) {
                            return Ok(response);
                        }
                    }

                    Message::Ping(payload) => ws.send(Message::Pong(payload)).await?,
                    Message::Close(_) => return Err(WsNodeError::ConnectionClosed),
                    _ => {}
                }
            }

            Err(WsNodeError::ConnectionClosed)
        })
        .await
        .map_err(|_| WsNodeError::RequestTimeout(self.config.request_timeout))??;

        let _ = ws.close(None).await;

        if response.status.as_deref() != Some("success") {
            return Err(WsNodeError::UnexpectedResponse(format!(
                "status {:?}",
                response.status
            )));
        }

        response
            .result
            .ok_or_else(|| WsNodeError::UnexpectedResponse("response without result".to_string()))
    }

    fn next_request_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Node for WsNode {
    type Error = WsNodeError;

    fn events(&mut self) -> impl Stream<Item = Result<NodeEvent, Self::Error>> + Send {
        let node = self.clone();
        let subscribe_id = self.next_request_id();

        stream! {
            let ws = match node.connect().await {
                Ok(ws) => ws,
                Err(error) => {
                    yield Err(error);
                    return;
                }
            };
            let (mut sink, mut source) = ws.split();

            let subscribe = Command::Subscribe {
                id: subscribe_id,
                streams: &["ledger", "transactions"],
            };
            let text = match serde_json::to_string(&subscribe) {
                Ok(text) => text,
                Err(error) => {
                    yield Err(error.into());
                    return;
                }
            };
            if let Err(error) = sink.send(Message::Text(text.into())).await {
                yield Err(error.into());
                return;
            }

            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        let message = match serde_json::from_str::<StreamMessage>(text.as_str()) {
                            Ok(message) => message,

                            // Malformed upstream data is logged and dropped.
                            Err(error) => {
                                warn!(url = node.url(), error:%; "malformed stream message");
                                continue;
                            }
                        };

                        match message {
                            StreamMessage::LedgerClosed(ledger_closed) => {
                                yield Ok(NodeEvent::LedgerClosed(ledger_closed.into()));
                            }

                            StreamMessage::Transaction(transaction) => {
                                if !transaction.validated {
                                    continue;
                                }

                                match RawTransaction::try_from(transaction) {
                                    Ok(transaction) => {
                                        yield Ok(NodeEvent::Transaction(transaction));
                                    }
                                    Err(error) => {
                                        warn!(url = node.url(), error:%; "malformed transaction");
                                    }
                                }
                            }

                            StreamMessage::Response(_) | StreamMessage::Other => {}
                        }
                    }

                    Ok(Message::Ping(payload)) => {
                        if let Err(error) = sink.send(Message::Pong(payload)).await {
                            yield Err(error.into());
                            return;
                        }
                    }

                    Ok(Message::Close(_)) => {
                        yield Err(WsNodeError::ConnectionClosed);
                        return;
                    }

                    Ok(_) => {}

                    Err(error) => {
                        yield Err(error.into());
                        return;
                    }
                }
            }

            yield Err(WsNodeError::ConnectionClosed);
        }
    }

    async fn ping(&self) -> Result<Duration, Self::Error> {
        let started = Instant::now();
        self.request(Command::Ping {
            id: self.next_request_id(),
        })
        .await?;

        Ok(started.elapsed())
    }

    async fn fetch_ledger(
        &self,
        ledger_index: LedgerIndex,
    ) -> Result<LedgerTransactions, Self::Error> {
        let result = self
            .request(Command::Ledger {
                id: self.next_request_id(),
                ledger_index,
                transactions: true,
                expand: true,
            })
            .await?;

        parse_ledger_result(&result, ledger_index)
    }
}

/// Error possibly returned by [WsNode] operations.
#[derive(Debug, Error)]
pub enum WsNodeError {
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("websocket error")]
    WebSocket(#[from] tungstenite::Error),

    #[error("cannot encode or decode message")]
    Json(#[from] serde_json::Error),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("request timed out after {0:?}")]
    RequestTimeout(Duration),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("malformed ledger result: {0}")]
    MalformedLedger(String),
}

#[derive(Debug, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum Command {
    Subscribe {
        id: u64,
        streams: &'static [&'static str],
    },

    Ping {
        id: u64,
    },

    Ledger {
        id: u64,
        ledger_index: LedgerIndex,
        transactions: bool,
        expand: bool,
    },
}

impl Command {
    fn id(&self) -> u64 {
        match self {
            Command::Subscribe { id, .. } | Command::Ping { id } | Command::Ledger { id, .. } => {
                *id
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum StreamMessage {
    LedgerClosed(LedgerClosedMessage),
    Transaction(TransactionMessage),
    Response(ResponseMessage),

    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct LedgerClosedMessage {
    ledger_index: LedgerIndex,
    ledger_hash: String,
    ledger_time: u64,
    txn_count: u32,
}

impl From<LedgerClosedMessage> for LedgerClosed {
    fn from(message: LedgerClosedMessage) -> Self {
        Self {
            ledger_index: message.ledger_index,
            ledger_hash: message.ledger_hash,
            close_time: ripple_time_to_unix_millis(message.ledger_time),
            transaction_count: message.txn_count,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TransactionMessage {
    engine_result: Option<String>,
    ledger_index: Option<LedgerIndex>,

    #[serde(alias = "tx_json")]
    transaction: Option<Value>,

    meta: Option<Value>,

    #[serde(default = "validated_default")]
    validated: bool,
}

const fn validated_default() -> bool {
    true
}

impl TryFrom<TransactionMessage> for RawTransaction {
    type Error = WsNodeError;

    fn try_from(message: TransactionMessage) -> Result<Self, Self::Error> {
        let TransactionMessage {
            engine_result,
            ledger_index,
            transaction,
            meta,
            ..
        } = message;

        let transaction = transaction
            .ok_or_else(|| WsNodeError::UnexpectedResponse("missing transaction".to_string()))?;
        let hash = transaction
            .get("hash")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                WsNodeError::UnexpectedResponse("missing transaction hash".to_string())
            })?
            .to_string();
        let ledger_index = ledger_index
            .ok_or_else(|| WsNodeError::UnexpectedResponse("missing ledger_index".to_string()))?;
        let close_time = transaction
            .get("date")
            .and_then(Value::as_u64)
            .map(ripple_time_to_unix_millis)
            .unwrap_or_default();

        Ok(RawTransaction {
            hash,
            ledger_index,
            engine_result: engine_result.unwrap_or_default(),
            close_time,
            transaction,
            meta: meta.unwrap_or(Value::Null),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    id: Option<u64>,
    status: Option<String>,
    result: Option<Value>,
}

fn parse_ledger_result(
    result: &Value,
    requested_index: LedgerIndex,
) -> Result<LedgerTransactions, WsNodeError> {
    let ledger = result
        .get("ledger")
        .ok_or_else(|| WsNodeError::MalformedLedger("missing ledger".to_string()))?;

    let ledger_hash = ledger
        .get("ledger_hash")
        .and_then(Value::as_str)
        .ok_or_else(|| WsNodeError::MalformedLedger("missing ledger_hash".to_string()))?
        .to_string();

    let close_time = ledger
        .get("close_time")
        .and_then(Value::as_u64)
        .map(ripple_time_to_unix_millis)
        .unwrap_or_default();

    let transactions = ledger
        .get("transactions")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let transactions = transactions
        .into_iter()
        .filter_map(|mut tx| {
            let meta = tx
                .get("metaData")
                .or_else(|| tx.get("meta"))
                .cloned()
                .unwrap_or(Value::Null);
            let engine_result = meta
                .get("TransactionResult")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            let Some(hash) = tx.get("hash").and_then(Value::as_str).map(str::to_string) else {
                warn!(ledger_index = requested_index; "backfilled transaction without hash");
                return None;
            };

            if let Some(tx) = tx.as_object_mut() {
                tx.remove("metaData");
                tx.remove("meta");
            }

            Some(RawTransaction {
                hash,
                ledger_index: requested_index,
                engine_result,
                close_time,
                transaction: tx,
                meta,
            })
        })
        .collect();

    Ok(LedgerTransactions {
        ledger_index: requested_index,
        ledger_hash,
        close_time,
        transactions,
    })
}

#[cfg(test)]
mod tests {
    use crate::infra::ws_node::{StreamMessage, parse_ledger_result};
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn test_parse_ledger_closed() {
        let text = json!({
            "type": "ledgerClosed",
            "ledger_index": 104,
            "ledger_hash": "AB".repeat(32),
            "ledger_time": 725_846_400,
            "txn_count": 3,
            "fee_base": 10
        })
        .to_string();

        let message = serde_json::from_str::<StreamMessage>(&text).expect("can be parsed");
        assert_matches!(
            message,
            StreamMessage::LedgerClosed(ledger) if ledger.ledger_index == 104 && ledger.txn_count == 3
        );
    }

    #[test]
    fn test_parse_transaction() {
        let text = json!({
            "type": "transaction",
            "engine_result": "tesSUCCESS",
            "ledger_index": 104,
            "validated": true,
            "transaction": {
                "TransactionType": "NFTokenMint",
                "hash": "CD".repeat(32),
                "date": 725_846_400u64
            },
            "meta": { "TransactionResult": "tesSUCCESS" }
        })
        .to_string();

        let message = serde_json::from_str::<StreamMessage>(&text).expect("can be parsed");
        assert_matches!(message, StreamMessage::Transaction(tx) if tx.validated);
    }

    #[test]
    fn test_parse_unknown_message() {
        let message = serde_json::from_str::<StreamMessage>(r#"{"type":"serverStatus"}"#)
            .expect("can be parsed");
        assert_matches!(message, StreamMessage::Other);
    }

    #[test]
    fn test_parse_ledger_result() {
        let result = json!({
            "ledger": {
                "ledger_hash": "EF".repeat(32),
                "close_time": 725_846_400u64,
                "transactions": [
                    {
                        "TransactionType": "NFTokenBurn",
                        "hash": "01".repeat(32),
                        "metaData": { "TransactionResult": "tesSUCCESS" }
                    },
                    {
                        "TransactionType": "Payment"
                        // No hash: dropped.
                    }
                ]
            }
        });

        let ledger = parse_ledger_result(&result, 102).expect("can be parsed");
        assert_eq!(ledger.ledger_index, 102);
        assert_eq!(ledger.transactions.len(), 1);

        let transaction = &ledger.transactions[0];
        assert_eq!(transaction.engine_result, "tesSUCCESS");
        assert_eq!(transaction.meta.get("TransactionResult").unwrap(), "tesSUCCESS");
        assert!(transaction.transaction.get("metaData").is_none());
    }
}
