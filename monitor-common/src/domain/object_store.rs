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

use std::error::Error as StdError;

/// Object store abstraction for cached images and metadata documents.
#[trait_variant::make(Send)]
pub trait ObjectStore
where
    Self: Clone + Send + Sync + 'static,
{
    type Error: StdError + Send + Sync + 'static;

    /// Store an object under the given key and return its publicly
    /// reachable URL.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String, Self::Error>;

    /// The publicly reachable URL for the given key.
    fn object_url(&self, key: &str) -> String;
}
