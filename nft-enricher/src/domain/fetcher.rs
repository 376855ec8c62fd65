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

/// HTTP fetch abstraction for metadata documents and images.
#[trait_variant::make(Send)]
pub trait Fetcher
where
    Self: Clone + Send + Sync + 'static,
{
    type Error: StdError + Send + Sync + 'static;

    /// Fetch and parse a JSON document, bounded in size.
    async fn fetch_json(&self, url: &str) -> Result<serde_json::Value, Self::Error>;

    /// Fetch an image, bounded in size.
    async fn fetch_image(&self, url: &str) -> Result<FetchedImage, Self::Error>;
}

/// A fetched image with the Content-Type the server reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl FetchedImage {
    /// The cache file extension for the reported Content-Type, with loose
    /// tolerance for common subtypes.
    pub fn extension(&self) -> &'static str {
        let Some(content_type) = self.content_type.as_deref() else {
            return "bin";
        };
        let content_type = content_type.to_ascii_lowercase();

        if content_type.contains("jpeg") || content_type.contains("jpg") {
            "jpg"
        } else if content_type.contains("png") {
            "png"
        } else if content_type.contains("gif") {
            "gif"
        } else if content_type.contains("webp") {
            "webp"
        } else if content_type.contains("svg") {
            "svg"
        } else {
            "bin"
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::FetchedImage;

    fn image(content_type: Option<&str>) -> FetchedImage {
        FetchedImage {
            bytes: vec![],
            content_type: content_type.map(str::to_string),
        }
    }

    #[test]
    fn test_extension() {
        assert_eq!(image(Some("image/jpeg")).extension(), "jpg");
        assert_eq!(image(Some("image/jpg")).extension(), "jpg");
        assert_eq!(image(Some("IMAGE/PNG")).extension(), "png");
        assert_eq!(image(Some("image/svg+xml")).extension(), "svg");
        assert_eq!(image(Some("application/octet-stream")).extension(), "bin");
        assert_eq!(image(None).extension(), "bin");
    }
}
