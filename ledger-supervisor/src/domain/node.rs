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

use futures::Stream;
use monitor_common::domain::{LedgerClosed, LedgerIndex, RawTransaction, UnixMillis};
use std::{error::Error as StdError, time::Duration};

/// Upstream XRPL node abstraction.
#[trait_variant::make(Send)]
pub trait Node
where
    Self: Clone + Send + Sync + 'static,
{
    type Error: StdError + Send + Sync + 'static;

    /// Connect, subscribe to the `ledger` and `transactions` streams and
    /// yield events until the connection fails; the stream ends on error.
    fn events(&mut self) -> impl Stream<Item = Result<NodeEvent, Self::Error>> + Send;

    /// Round-trip a ping over a fresh connection and return the observed
    /// latency.
    async fn ping(&self) -> Result<Duration, Self::Error>;

    /// Fetch a closed ledger with expanded transactions.
    async fn fetch_ledger(
        &self,
        ledger_index: LedgerIndex,
    ) -> Result<LedgerTransactions, Self::Error>;
}

/// An event observed on a node's subscription streams.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    LedgerClosed(LedgerClosed),
    Transaction(RawTransaction),
}

/// The contents of one closed ledger as returned by the `ledger` command
/// with `transactions: true, expand: true`.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerTransactions {
    pub ledger_index: LedgerIndex,
    pub ledger_hash: String,
    pub close_time: UnixMillis,
    pub transactions: Vec<RawTransaction>,
}
