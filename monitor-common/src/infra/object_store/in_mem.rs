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
use std::{
    collections::HashMap,
    convert::Infallible,
    sync::{Arc, Mutex},
};

/// In-memory object store implementation for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemObjectStore {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl InMemObjectStore {
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .expect("objects lock is not poisoned")
            .get(key)
            .cloned()
    }
}

impl domain::ObjectStore for InMemObjectStore {
    type Error = Infallible;

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String, Self::Error> {
        self.objects
            .lock()
            .expect("objects lock is not poisoned")
            .insert(key.to_string(), bytes);

        Ok(self.object_url(key))
    }

    fn object_url(&self, key: &str) -> String {
        format!("mem://{key}")
    }
}
