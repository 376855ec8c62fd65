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
use async_nats::{Client, ConnectError, ConnectOptions};
use async_stream::stream;
use futures::{Stream, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tokio_util::bytes::Bytes;

/// Configuration for the NATS connection.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub url: String,
    pub username: String,
    pub password: SecretString,
}

/// NATS based publisher and subscriber implementation. Messages are
/// published as JSON under the subject of their message type.
#[derive(Debug, Clone)]
pub struct NatsPubSub {
    client: Client,
}

impl NatsPubSub {
    /// Connect to NATS with the given configuration.
    pub async fn new(config: Config) -> Result<Self, ConnectError> {
        let Config {
            url,
            username,
            password,
        } = config;

        let options = ConnectOptions::new()
            .user_and_password(username, password.expose_secret().to_owned());
        let client = options.connect(url).await?;

        Ok(Self { client })
    }
}

impl Publisher for NatsPubSub {
    type Error = NatsPubSubError;

    async fn publish<T>(&self, message: &T) -> Result<(), Self::Error>
    where
        T: Message + Sync,
    {
        let payload = serde_json::to_vec(message)?;
        self.client
            .publish(T::SUBJECT, Bytes::from(payload))
            .await?;

        Ok(())
    }
}

impl Subscriber for NatsPubSub {
    type Error = NatsPubSubError;

    fn subscribe<T>(&self) -> impl Stream<Item = Result<T, Self::Error>> + Send
    where
        T: Message,
    {
        let client = self.client.clone();

        stream! {
            let mut subscriber = match client.subscribe(T::SUBJECT).await {
                Ok(subscriber) => subscriber,
                Err(error) => {
                    yield Err(error.into());
                    return;
                }
            };

            while let Some(message) = subscriber.next().await {
                yield serde_json::from_slice::<T>(&message.payload).map_err(Into::into);
            }
        }
    }
}

/// Error possibly returned by [NatsPubSub] operations.
#[derive(Debug, Error)]
pub enum NatsPubSubError {
    #[error("cannot serialize or deserialize message")]
    Json(#[from] serde_json::Error),

    #[error("cannot publish message")]
    Publish(#[from] async_nats::PublishError),

    #[error("cannot subscribe")]
    Subscribe(#[from] async_nats::SubscribeError),
}
