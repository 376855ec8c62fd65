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

use crate::domain::{LedgerIndex, TransactionHash, UnixMillis};

/// A `ledgerClosed` event observed on the ledger stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerClosed {
    pub ledger_index: LedgerIndex,
    pub ledger_hash: String,
    pub close_time: UnixMillis,
    pub transaction_count: u32,
}

/// A validated transaction with its metadata, either freshly observed on the
/// transaction stream or replayed by a backfill.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTransaction {
    pub hash: TransactionHash,
    pub ledger_index: LedgerIndex,
    pub engine_result: String,
    pub close_time: UnixMillis,
    pub transaction: serde_json::Value,
    pub meta: serde_json::Value,
}

impl RawTransaction {
    /// The transaction type, e.g. `NFTokenMint`.
    pub fn transaction_type(&self) -> Option<&str> {
        self.transaction
            .get("TransactionType")
            .and_then(serde_json::Value::as_str)
    }

    /// The sending account.
    pub fn account(&self) -> Option<&str> {
        self.transaction
            .get("Account")
            .and_then(serde_json::Value::as_str)
    }
}
