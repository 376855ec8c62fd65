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

use serde::{Deserialize, Serialize};

/// Status of a scheduled delivery. Transitions are monotonic per epoch:
/// `pending → in_flight → sent | failed`; a retry resets to `pending` with
/// an increased retry count and a later schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "NOTIFICATION_STATUS", rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,

    /// Claimed by exactly one worker; not externally visible as an outcome.
    InFlight,

    Sent,
    Failed,
}
