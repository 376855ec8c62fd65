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

use crate::domain::Gap;
use monitor_common::domain::LedgerIndex;

/// Tracks the highest observed closed ledger and the gaps between observed
/// ones. A gap stays outstanding until a backfill drains it.
#[derive(Debug, Default)]
pub struct GapRegistry {
    highest_closed: Option<LedgerIndex>,
    outstanding: Vec<Gap>,
}

impl GapRegistry {
    /// Record a closed ledger; returns the gap this close reveals, if any.
    pub fn record_closed(&mut self, ledger_index: LedgerIndex) -> Option<Gap> {
        let gap = match self.highest_closed {
            Some(highest) if ledger_index > highest + 1 => {
                let gap = Gap {
                    start_ledger: highest + 1,
                    end_ledger: ledger_index - 1,
                };
                self.outstanding.push(gap);
                Some(gap)
            }

            _ => None,
        };

        if self.highest_closed < Some(ledger_index) {
            self.highest_closed = Some(ledger_index);
        }

        gap
    }

    /// The gaps observed since start that have not been drained yet.
    pub fn outstanding(&self) -> Vec<Gap> {
        self.outstanding.clone()
    }

    /// Mark the given inclusive range as drained, splitting or removing
    /// overlapping gaps.
    pub fn drain(&mut self, start_ledger: LedgerIndex, end_ledger: LedgerIndex) {
        let mut remaining = Vec::with_capacity(self.outstanding.len());

        for gap in self.outstanding.drain(..) {
            if gap.end_ledger < start_ledger || gap.start_ledger > end_ledger {
                remaining.push(gap);
                continue;
            }

            if gap.start_ledger < start_ledger {
                remaining.push(Gap {
                    start_ledger: gap.start_ledger,
                    end_ledger: start_ledger - 1,
                });
            }
            if gap.end_ledger > end_ledger {
                remaining.push(Gap {
                    start_ledger: end_ledger + 1,
                    end_ledger: gap.end_ledger,
                });
            }
        }

        self.outstanding = remaining;
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::{Gap, GapRegistry};

    #[test]
    fn test_record_closed() {
        let mut gaps = GapRegistry::default();

        assert_eq!(gaps.record_closed(100), None);
        assert_eq!(gaps.record_closed(101), None);
        assert_eq!(
            gaps.record_closed(104),
            Some(Gap {
                start_ledger: 102,
                end_ledger: 103,
            })
        );
        assert_eq!(gaps.outstanding().len(), 1);

        // Late duplicates and lower indices do not create gaps.
        assert_eq!(gaps.record_closed(104), None);
        assert_eq!(gaps.record_closed(101), None);
        assert_eq!(gaps.record_closed(105), None);
    }

    #[test]
    fn test_drain() {
        let mut gaps = GapRegistry::default();
        gaps.record_closed(100);
        gaps.record_closed(110);

        gaps.drain(101, 104);
        assert_eq!(
            gaps.outstanding(),
            vec![Gap {
                start_ledger: 105,
                end_ledger: 109,
            }]
        );

        gaps.drain(105, 109);
        assert!(gaps.outstanding().is_empty());
    }

    #[test]
    fn test_drain_splits() {
        let mut gaps = GapRegistry::default();
        gaps.record_closed(100);
        gaps.record_closed(110);

        gaps.drain(103, 105);
        assert_eq!(
            gaps.outstanding(),
            vec![
                Gap {
                    start_ledger: 101,
                    end_ledger: 102,
                },
                Gap {
                    start_ledger: 106,
                    end_ledger: 109,
                },
            ]
        );
    }
}
