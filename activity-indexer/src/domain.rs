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

pub mod storage;

mod batch;
mod classify;

pub use batch::*;
pub use classify::*;

use monitor_common::domain::{AccountAddress, NftActivity, TokenId};

/// One classified activity with the collection and NFT rows it implies.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedActivity {
    pub activity: NftActivity,
    pub nft: Option<NftUpsert>,
}

/// The NFT row implied by an activity, upserted by `nft_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NftUpsert {
    pub nft_id: TokenId,
    pub owner_address: AccountAddress,

    /// Whether this activity should update the NFT's recorded owner.
    pub update_owner: bool,

    /// As carried on the ledger, usually hex-encoded; decoded by the
    /// enricher.
    pub metadata_uri: Option<String>,

    /// The `(issuer, taxon)` pair decoded from the token id.
    pub issuer_address: AccountAddress,
    pub taxon: u32,
}
