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

use crate::domain::{FetchedImage, Fetcher};
use fastrace::trace;
use reqwest::{Client, Response, header};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Configuration for the HTTP fetcher.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(with = "humantime_serde", default = "json_timeout_default")]
    pub json_timeout: Duration,

    #[serde(with = "humantime_serde", default = "image_timeout_default")]
    pub image_timeout: Duration,

    #[serde(default = "max_json_bytes_default")]
    pub max_json_bytes: usize,

    #[serde(default = "max_image_bytes_default")]
    pub max_image_bytes: usize,
}

const fn json_timeout_default() -> Duration {
    Duration::from_secs(15)
}

const fn image_timeout_default() -> Duration {
    Duration::from_secs(30)
}

const fn max_json_bytes_default() -> usize {
    1024 * 1024
}

const fn max_image_bytes_default() -> usize {
    50 * 1024 * 1024
}

/// HTTP fetcher over reqwest, following redirects, with per-kind timeouts
/// and response size caps.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    json_client: Client,
    image_client: Client,
    max_json_bytes: usize,
    max_image_bytes: usize,
}

impl HttpFetcher {
    pub fn new(config: Config) -> Result<Self, reqwest::Error> {
        let json_client = Client::builder().timeout(config.json_timeout).build()?;
        let image_client = Client::builder().timeout(config.image_timeout).build()?;

        Ok(Self {
            json_client,
            image_client,
            max_json_bytes: config.max_json_bytes,
            max_image_bytes: config.max_image_bytes,
        })
    }
}

impl Fetcher for HttpFetcher {
    type Error = FetchError;

    #[trace]
    async fn fetch_json(&self, url: &str) -> Result<serde_json::Value, Self::Error> {
        let response = self.json_client.get(url).send().await?;
        let bytes = read_bounded(response, self.max_json_bytes).await?;

        Ok(serde_json::from_slice(&bytes)?)
    }

    #[trace]
    async fn fetch_image(&self, url: &str) -> Result<FetchedImage, Self::Error> {
        let response = self.image_client.get(url).send().await?;
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = read_bounded(response, self.max_image_bytes).await?;

        Ok(FetchedImage {
            bytes,
            content_type,
        })
    }
}

/// Read a response body up to the given cap, erroring beyond it.
async fn read_bounded(response: Response, max_bytes: usize) -> Result<Vec<u8>, FetchError> {
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }

    if let Some(length) = response.content_length() {
        if length as usize > max_bytes {
            return Err(FetchError::TooLarge {
                max_bytes,
                length: length as usize,
            });
        }
    }

    let mut bytes = Vec::new();
    let mut response = response;
    while let Some(chunk) = response.chunk().await? {
        if bytes.len() + chunk.len() > max_bytes {
            return Err(FetchError::TooLarge {
                max_bytes,
                length: bytes.len() + chunk.len(),
            });
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

/// Error possibly returned by [HttpFetcher] operations.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http request failed")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("response exceeds {max_bytes} bytes (got at least {length})")]
    TooLarge { max_bytes: usize, length: usize },

    #[error("cannot parse JSON document")]
    Json(#[from] serde_json::Error),
}
