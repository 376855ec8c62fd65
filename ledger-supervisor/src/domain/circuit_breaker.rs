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

use parking_lot::Mutex;
use serde::Deserialize;
use std::time::{Duration, Instant};

/// Per-node circuit breaker: closed while the node behaves, open after
/// `failure_threshold` consecutive failures, half-open after `reset_timeout`
/// to let one probe through.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    reset_timeout: Duration,
    state: Mutex<BreakerState>,
}

#[derive(Debug, Clone, Copy)]
enum BreakerState {
    Closed { failures: u32 },
    Open { since: Instant },
    HalfOpen,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub failure_threshold: u32,

    #[serde(with = "humantime_serde")]
    pub reset_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(config: Config) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            reset_timeout: config.reset_timeout,
            state: Mutex::new(BreakerState::Closed { failures: 0 }),
        }
    }

    /// Whether a call may pass. An open breaker transitions to half-open
    /// once the reset timeout has elapsed, letting exactly one probe pass.
    pub fn call_permitted(&self) -> bool {
        let mut state = self.state.lock();

        match *state {
            BreakerState::Closed { .. } | BreakerState::HalfOpen => true,

            BreakerState::Open { since } => {
                if since.elapsed() >= self.reset_timeout {
                    *state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        *self.state.lock() = BreakerState::Closed { failures: 0 };
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock();

        match *state {
            BreakerState::Closed { failures } => {
                let failures = failures + 1;
                if failures >= self.failure_threshold {
                    *state = BreakerState::Open {
                        since: Instant::now(),
                    };
                } else {
                    *state = BreakerState::Closed { failures };
                }
            }

            // A failed probe re-opens the breaker.
            BreakerState::HalfOpen => {
                *state = BreakerState::Open {
                    since: Instant::now(),
                };
            }

            BreakerState::Open { .. } => {}
        }
    }

    /// Force the breaker open, e.g. after repeated failed health checks.
    pub fn trip(&self) {
        *self.state.lock() = BreakerState::Open {
            since: Instant::now(),
        };
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.state.lock(), BreakerState::Open { .. })
    }
}
