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

use thiserror::Error;

const IPFS_SCHEME: &str = "ipfs://";

/// Resolve a metadata or image URI to the ordered list of HTTP URLs to try.
/// XRPL commonly carries URIs hex-encoded, so an even-length hex string is
/// decoded to UTF-8 first; `ipfs://` URIs map onto the configured gateways
/// in order; http(s) URLs pass through.
pub fn resolve_uri(uri: &str, gateways: &[String]) -> Result<Vec<String>, UriError> {
    let uri = maybe_hex_decode(uri);

    if let Some(rest) = uri.strip_prefix(IPFS_SCHEME) {
        // Tolerate the legacy ipfs://ipfs/<cid> form.
        let rest = rest.strip_prefix("ipfs/").unwrap_or(rest);
        if rest.is_empty() {
            return Err(UriError::EmptyIpfsPath(uri.clone()));
        }
        if gateways.is_empty() {
            return Err(UriError::NoGateways);
        }

        return Ok(gateways
            .iter()
            .map(|gateway| format!("{}/{rest}", gateway.trim_end_matches('/')))
            .collect());
    }

    if uri.starts_with("http://") || uri.starts_with("https://") {
        return Ok(vec![uri]);
    }

    Err(UriError::UnsupportedScheme(uri))
}

/// Decode an even-length hex string to UTF-8; anything else passes through
/// unchanged.
pub fn maybe_hex_decode(uri: &str) -> String {
    if uri.is_empty() || uri.len() % 2 != 0 || !uri.bytes().all(|b| b.is_ascii_hexdigit()) {
        return uri.to_string();
    }

    match const_hex::decode(uri) {
        Ok(bytes) => String::from_utf8(bytes).unwrap_or_else(|_| uri.to_string()),
        Err(_) => uri.to_string(),
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UriError {
    #[error("unsupported URI scheme: {0}")]
    UnsupportedScheme(String),

    #[error("ipfs URI without content path: {0}")]
    EmptyIpfsPath(String),

    #[error("no IPFS gateways configured")]
    NoGateways,
}

#[cfg(test)]
mod tests {
    use crate::domain::{UriError, maybe_hex_decode, resolve_uri};
    use assert_matches::assert_matches;

    fn gateways() -> Vec<String> {
        vec![
            "https://ipfs.io/ipfs/".to_string(),
            "https://cloudflare-ipfs.com/ipfs".to_string(),
        ]
    }

    #[test]
    fn test_resolve_http() {
        let urls = resolve_uri("https://example.com/meta.json", &gateways()).unwrap();
        assert_eq!(urls, vec!["https://example.com/meta.json"]);
    }

    #[test]
    fn test_resolve_hex_encoded_http() {
        // Hex-encoding of https://example.com/meta.json: the decoded form
        // must resolve identically to the plain form.
        let hex = const_hex::encode("https://example.com/meta.json");
        let urls = resolve_uri(&hex, &gateways()).unwrap();
        assert_eq!(urls, vec!["https://example.com/meta.json"]);
    }

    #[test]
    fn test_resolve_ipfs_across_gateways() {
        let urls = resolve_uri("ipfs://bafkrei123/meta.json", &gateways()).unwrap();
        assert_eq!(
            urls,
            vec![
                "https://ipfs.io/ipfs/bafkrei123/meta.json",
                "https://cloudflare-ipfs.com/ipfs/bafkrei123/meta.json",
            ]
        );
    }

    #[test]
    fn test_resolve_legacy_ipfs_form() {
        let urls = resolve_uri("ipfs://ipfs/bafkrei123", &gateways()).unwrap();
        assert_eq!(
            urls,
            vec![
                "https://ipfs.io/ipfs/bafkrei123",
                "https://cloudflare-ipfs.com/ipfs/bafkrei123",
            ]
        );
    }

    #[test]
    fn test_resolve_unsupported() {
        assert_matches!(
            resolve_uri("ftp://example.com/meta.json", &gateways()),
            Err(UriError::UnsupportedScheme(_))
        );
    }

    #[test]
    fn test_maybe_hex_decode() {
        assert_eq!(maybe_hex_decode("68656C6C6F"), "hello");

        // Odd length, non-hex and non-UTF-8 pass through unchanged.
        assert_eq!(maybe_hex_decode("68656C6C6"), "68656C6C6");
        assert_eq!(maybe_hex_decode("hello"), "hello");
        assert_eq!(maybe_hex_decode("FFFE"), "FFFE");
    }
}
