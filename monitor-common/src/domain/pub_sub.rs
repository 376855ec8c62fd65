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

use crate::domain::{ActivityType, LedgerIndex, TokenId};
use futures::{Stream, stream};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{convert::Infallible, error::Error as StdError};

/// A message that can be published to and consumed from the broker.
///
/// Messages are wake-up hints: consumers must treat the database as the
/// authoritative work queue and tolerate lost or duplicated messages.
pub trait Message
where
    Self: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// The broker subject this message type is published under.
    const SUBJECT: &'static str;
}

/// Publisher abstraction.
#[trait_variant::make(Send)]
pub trait Publisher
where
    Self: Clone + Send + Sync + 'static,
{
    type Error: StdError + Send + Sync + 'static;

    async fn publish<T>(&self, message: &T) -> Result<(), Self::Error>
    where
        T: Message + Sync;
}

/// Subscriber abstraction.
pub trait Subscriber
where
    Self: Clone + Send + Sync + 'static,
{
    type Error: StdError + Send + Sync + 'static;

    fn subscribe<T>(&self) -> impl Stream<Item = Result<T, Self::Error>> + Send
    where
        T: Message;
}

/// Published after an activity batch has been committed, once per new
/// activity row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityIndexed {
    pub activity_id: i64,
    pub ledger_index: LedgerIndex,
    pub activity_type: ActivityType,
    pub nft_id: Option<TokenId>,
}

impl Message for ActivityIndexed {
    const SUBJECT: &'static str = "monitor.activity-indexed";
}

/// Published when an NFT without fetched metadata has been observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentRequested {
    pub nft_id: TokenId,
}

impl Message for EnrichmentRequested {
    const SUBJECT: &'static str = "monitor.enrichment-requested";
}

/// Published after notification rows have been committed for a matched
/// activity, once per row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEnqueued {
    pub notification_id: i64,
}

impl Message for NotificationEnqueued {
    const SUBJECT: &'static str = "monitor.notification-enqueued";
}

/// A publisher dropping all messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPublisher;

impl Publisher for NoopPublisher {
    type Error = Infallible;

    async fn publish<T>(&self, _message: &T) -> Result<(), Self::Error>
    where
        T: Message + Sync,
    {
        Ok(())
    }
}

/// A subscriber never yielding any message.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSubscriber;

impl Subscriber for NoopSubscriber {
    type Error = Infallible;

    fn subscribe<T>(&self) -> impl Stream<Item = Result<T, Self::Error>> + Send
    where
        T: Message,
    {
        stream::pending()
    }
}
