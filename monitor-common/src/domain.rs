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

mod activity;
mod alert;
mod channel;
mod ledger;
mod notification;
mod object_store;
mod pub_sub;
mod token_id;

pub use activity::*;
pub use alert::*;
pub use channel::*;
pub use ledger::*;
pub use notification::*;
pub use object_store::*;
pub use pub_sub::*;
pub use token_id::*;

/// Index of a closed ledger.
pub type LedgerIndex = u32;

/// 64-hex transaction hash.
pub type TransactionHash = String;

/// Classic (base58check) XRPL account address.
pub type AccountAddress = String;

/// Unix timestamp in milliseconds.
pub type UnixMillis = u64;

/// Seconds between the ripple epoch (2000-01-01T00:00:00Z) and the unix
/// epoch.
pub const RIPPLE_EPOCH_OFFSET: u64 = 946_684_800;

/// Convert a ripple-epoch close time in seconds to unix milliseconds.
pub fn ripple_time_to_unix_millis(ripple_time: u64) -> UnixMillis {
    (ripple_time + RIPPLE_EPOCH_OFFSET) * 1_000
}

/// The current time as unix milliseconds.
pub fn now_unix_millis() -> UnixMillis {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is past the unix epoch")
        .as_millis() as u64
}
