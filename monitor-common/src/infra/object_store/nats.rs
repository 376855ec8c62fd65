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

use crate::domain;
use async_nats::{
    ConnectError, ConnectOptions,
    jetstream::{
        self,
        context::CreateObjectStoreError,
        object_store::{self, ObjectStore, PutError},
    },
};
use fastrace::trace;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::io::Cursor;
use thiserror::Error;

/// Configuration for the NATS based object store.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub url: String,
    pub username: String,
    pub password: SecretString,

    /// Bucket holding the cached objects.
    pub bucket: String,

    /// Public base URL under which the bucket contents are served.
    pub public_base_url: String,
}

/// NATS JetStream based object store implementation.
#[derive(Clone)]
pub struct NatsObjectStore {
    store: ObjectStore,
    public_base_url: String,
}

impl NatsObjectStore {
    /// Create a new object store with the given configuration, creating the
    /// bucket if it does not yet exist.
    pub async fn new(config: Config) -> Result<Self, Error> {
        let Config {
            url,
            username,
            password,
            bucket,
            public_base_url,
        } = config;

        let options = ConnectOptions::new()
            .user_and_password(username, password.expose_secret().to_owned());
        let client = options.connect(url).await?;
        let jetstream = jetstream::new(client);

        let store = jetstream
            .create_object_store(object_store::Config {
                bucket,
                ..Default::default()
            })
            .await?;

        let public_base_url = public_base_url.trim_end_matches('/').to_string();

        Ok(Self {
            store,
            public_base_url,
        })
    }
}

impl domain::ObjectStore for NatsObjectStore {
    type Error = Error;

    #[trace]
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String, Self::Error> {
        self.store.put(key, &mut Cursor::new(bytes)).await?;
        Ok(self.object_url(key))
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{key}", self.public_base_url)
    }
}

/// Error possibly returned by [NatsObjectStore] operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot connect to NATS")]
    Connect(#[from] ConnectError),

    #[error("cannot create object store bucket")]
    CreateObjectStore(#[from] CreateObjectStoreError),

    #[error("cannot put object")]
    Put(#[from] PutError),
}
