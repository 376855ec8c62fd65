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

use crate::domain::AccountAddress;
use derive_more::{AsRef, Display, Into};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// The XLS-20 taxon scrambling constants; the taxon inside an NFTokenID is
/// XORed with `SCRAMBLE_FACTOR * sequence + SCRAMBLE_OFFSET` (mod 2^32).
const TAXON_SCRAMBLE_FACTOR: u64 = 384_160_001;
const TAXON_SCRAMBLE_OFFSET: u64 = 2_459;

/// Payload type prefix for classic account addresses.
const ACCOUNT_ID_PREFIX: u8 = 0x00;

/// A 64-hex NFTokenID, stored uppercase.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, AsRef, Display, Into, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TokenId(String);

impl TokenId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode the packed fields of this token id: 2 bytes flags, 2 bytes
    /// transfer fee, 20 bytes issuer account id, 4 bytes scrambled taxon,
    /// 4 bytes mint sequence.
    pub fn decode(&self) -> DecodedTokenId {
        let bytes = const_hex::decode(&self.0).expect("token id is valid hex by construction");

        let flags = u16::from_be_bytes([bytes[0], bytes[1]]);
        let transfer_fee = u16::from_be_bytes([bytes[2], bytes[3]]);
        let issuer = encode_classic_address(&bytes[4..24]);
        let scrambled_taxon = u32::from_be_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]);
        let sequence = u32::from_be_bytes([bytes[28], bytes[29], bytes[30], bytes[31]]);
        let taxon = unscramble_taxon(scrambled_taxon, sequence);

        DecodedTokenId {
            flags,
            transfer_fee,
            issuer,
            taxon,
            sequence,
        }
    }
}

impl TryFrom<&str> for TokenId {
    type Error = InvalidTokenIdError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        if s.len() != 64 {
            return Err(InvalidTokenIdError::Length(s.len()));
        }
        if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(InvalidTokenIdError::NotHex);
        }

        Ok(Self(s.to_ascii_uppercase()))
    }
}

impl TryFrom<String> for TokenId {
    type Error = InvalidTokenIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.as_str().try_into()
    }
}

#[derive(Debug, Error)]
pub enum InvalidTokenIdError {
    #[error("token id must be 64 hex characters, but was {0}")]
    Length(usize),

    #[error("token id contains non-hex characters")]
    NotHex,
}

/// The unpacked fields of an NFTokenID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTokenId {
    pub flags: u16,
    pub transfer_fee: u16,
    pub issuer: AccountAddress,
    pub taxon: u32,
    pub sequence: u32,
}

/// Undo the XLS-20 taxon scrambling.
fn unscramble_taxon(scrambled: u32, sequence: u32) -> u32 {
    let keystream =
        (TAXON_SCRAMBLE_FACTOR.wrapping_mul(sequence as u64) + TAXON_SCRAMBLE_OFFSET) as u32;
    scrambled ^ keystream
}

/// base58check-encode a 20-byte account id as a classic `r…` address using
/// the ripple alphabet.
pub fn encode_classic_address(account_id: &[u8]) -> AccountAddress {
    let mut payload = Vec::with_capacity(25);
    payload.push(ACCOUNT_ID_PREFIX);
    payload.extend_from_slice(account_id);

    let checksum = Sha256::digest(Sha256::digest(&payload));
    payload.extend_from_slice(&checksum[..4]);

    bs58::encode(payload)
        .with_alphabet(bs58::Alphabet::RIPPLE)
        .into_string()
}

#[cfg(test)]
mod tests {
    use crate::domain::token_id::{TokenId, encode_classic_address, unscramble_taxon};
    use assert_matches::assert_matches;

    #[test]
    fn test_try_from() {
        let token_id = TokenId::try_from(
            "000827103b94ecbb7bf0a0a6ed62b3607801a27b65d4679a00000d9a00000000",
        );
        assert_matches!(
            token_id,
            Ok(id) if id.as_str() == "000827103B94ECBB7BF0A0A6ED62B3607801A27B65D4679A00000D9A00000000"
        );

        assert_matches!(TokenId::try_from("abc"), Err(_));
        assert_matches!(
            TokenId::try_from(
                "zz0827103B94ECBB7BF0A0A6ED62B3607801A27B65D4679A00000D9A00000000"
            ),
            Err(_)
        );
    }

    #[test]
    fn test_decode() {
        // Flags 8, transfer fee 10000, sequence 3482.
        let token_id = TokenId::try_from(
            "000827103B94ECBB7BF0A0A6ED62B3607801A27B65D4679A16E5DA9C00000D9A",
        )
        .expect("token id is valid");

        let decoded = token_id.decode();
        assert_eq!(decoded.flags, 8);
        assert_eq!(decoded.transfer_fee, 10000);
        assert_eq!(decoded.sequence, 0xD9A);
        assert!(decoded.issuer.starts_with('r'));
    }

    #[test]
    fn test_unscramble_taxon() {
        // Scrambling is an involution for fixed sequence.
        let taxon = 1_337;
        let sequence = 42;
        let scrambled = unscramble_taxon(taxon, sequence);
        assert_ne!(scrambled, taxon);
        assert_eq!(unscramble_taxon(scrambled, sequence), taxon);
    }

    #[test]
    fn test_encode_classic_address() {
        // The zero account id encodes to the well-known ACCOUNT_ZERO address.
        let address = encode_classic_address(&[0; 20]);
        assert_eq!(address, "rrrrrrrrrrrrrrrrrrrrrhoLvTp");
    }
}
