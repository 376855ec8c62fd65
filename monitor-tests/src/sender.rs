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

use notification_dispatcher::domain::{NotificationPayload, SendOutcome, Sender};
use parking_lot::Mutex;
use std::sync::Arc;

/// A sender recording every payload; outcomes are scripted, defaulting to
/// success once the script is exhausted.
#[derive(Clone, Default)]
pub struct RecordingSender {
    outcomes: Arc<Mutex<Vec<SendOutcome>>>,
    sent: Arc<Mutex<Vec<NotificationPayload>>>,
}

impl RecordingSender {
    pub fn with_outcomes(outcomes: Vec<SendOutcome>) -> Self {
        Self {
            outcomes: Arc::new(Mutex::new(outcomes)),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every payload handed to the sender, in order.
    pub fn payloads(&self) -> Vec<NotificationPayload> {
        self.sent.lock().clone()
    }
}

impl Sender for RecordingSender {
    async fn send(&self, payload: &NotificationPayload) -> SendOutcome {
        self.sent.lock().push(payload.clone());

        let mut outcomes = self.outcomes.lock();
        if outcomes.is_empty() {
            SendOutcome::Sent { message_id: None }
        } else {
            outcomes.remove(0)
        }
    }
}
