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

mod fetcher;
mod metadata;
mod uri;

pub use fetcher::*;
pub use metadata::*;
pub use uri::*;

use serde::Serialize;

/// The outcome of enriching one NFT.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct EnrichmentOutcome {
    pub metadata_fetched: bool,
    pub image_cached: bool,
    pub error: Option<String>,
}
