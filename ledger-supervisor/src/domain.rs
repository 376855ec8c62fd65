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

pub mod circuit_breaker;
pub mod node;

mod dedup;
mod gaps;

pub use circuit_breaker::CircuitBreaker;
pub use dedup::*;
pub use gaps::*;

use monitor_common::domain::{LedgerIndex, UnixMillis};
use serde::Serialize;

/// A contiguous inclusive range of ledger indices that closed but whose
/// transactions were not observed on the live stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Gap {
    pub start_ledger: LedgerIndex,
    pub end_ledger: LedgerIndex,
}

/// Lifecycle of one supervised upstream node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Disconnected,
    Connecting,
    Subscribed,
    Healthy,
    Degraded,
}

impl NodeState {
    pub fn is_healthy(&self) -> bool {
        matches!(self, NodeState::Subscribed | NodeState::Healthy)
    }
}

/// Health snapshot of one supervised node.
#[derive(Debug, Clone, Serialize)]
pub struct NodeHealth {
    pub url: String,
    pub is_healthy: bool,
    pub consecutive_failures: u32,
    pub last_check: Option<UnixMillis>,
}

/// Health snapshot over all supervised nodes.
#[derive(Debug, Clone, Serialize)]
pub struct SupervisorHealth {
    pub total_nodes: usize,
    pub healthy_nodes: usize,
    pub nodes: Vec<NodeHealth>,
}
