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

use crate::domain::{Message, Publisher, Subscriber};
use async_stream::stream;
use futures::Stream;
use tokio::sync::broadcast;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};

const DEFAULT_CAPACITY: usize = 1_024;

/// In-memory publisher and subscriber implementation over a broadcast
/// channel; used by tests and the consolidated binary. Slow subscribers may
/// miss messages (which consumers must tolerate anyway, as messages are only
/// wake-up hints).
#[derive(Debug, Clone)]
pub struct InMemPubSub {
    sender: broadcast::Sender<(&'static str, serde_json::Value)>,
}

impl InMemPubSub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for InMemPubSub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Publisher for InMemPubSub {
    type Error = serde_json::Error;

    async fn publish<T>(&self, message: &T) -> Result<(), Self::Error>
    where
        T: Message + Sync,
    {
        let value = serde_json::to_value(message)?;

        // A send error only means there is no subscriber at the moment.
        let _ = self.sender.send((T::SUBJECT, value));

        Ok(())
    }
}

impl Subscriber for InMemPubSub {
    type Error = serde_json::Error;

    fn subscribe<T>(&self) -> impl Stream<Item = Result<T, Self::Error>> + Send
    where
        T: Message,
    {
        let receiver = self.sender.subscribe();

        stream! {
            let mut messages = BroadcastStream::new(receiver);

            while let Some(message) = messages.next().await {
                // Lagged receivers skip missed messages.
                let Ok((subject, value)) = message else {
                    continue;
                };

                if subject == T::SUBJECT {
                    yield serde_json::from_value::<T>(value);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        domain::{ActivityIndexed, ActivityType, NotificationEnqueued, Publisher, Subscriber},
        infra::pub_sub::in_mem::InMemPubSub,
    };
    use futures::StreamExt;
    use std::pin::pin;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let pub_sub = InMemPubSub::default();

        let mut activities = pin!(pub_sub.subscribe::<ActivityIndexed>());
        let mut notifications = pin!(pub_sub.subscribe::<NotificationEnqueued>());

        let activity_indexed = ActivityIndexed {
            activity_id: 1,
            ledger_index: 100,
            activity_type: ActivityType::Mint,
            nft_id: None,
        };
        pub_sub
            .publish(&activity_indexed)
            .await
            .expect("can be published");
        pub_sub
            .publish(&NotificationEnqueued { notification_id: 7 })
            .await
            .expect("can be published");

        // Subjects are isolated: each subscriber only sees its own type.
        let received = activities.next().await.expect("stream yields");
        assert_eq!(received.expect("can be deserialized"), activity_indexed);

        let received = notifications.next().await.expect("stream yields");
        assert_eq!(
            received.expect("can be deserialized"),
            NotificationEnqueued { notification_id: 7 }
        );
    }
}
