// Copyright (c) 2026 Potchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]

//! Hash-linked blocks and the unframed chain codec.

use crate::core::codec::{sha256, write_u32, write_uuid, ByteReader, CodecError};
use crate::core::transaction::Tx;
use serde_json::{json, Value};
use uuid::Uuid;

/// Offset where the signature field starts in the block encoding.
const SIG_START: usize = 56;
/// Offset where the signature field ends in the block encoding.
const SIG_END: usize = 120;

/// `prev_hash` of the genesis block.
pub fn genesis_prev_hash() -> [u8; 32] {
    sha256(b"0000000000")
}

/// A sealed block.
///
/// `version(4) || timestamp(4) || prev_hash(32) || validator(16) ||
/// signature(64) || n_tx(4) || tx...`. Transactions are inlined and owned
/// by the block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    /// Format version.
    pub version: u32,
    /// Sealing time, unix seconds.
    pub timestamp: u32,
    /// Hash of the predecessor's full encoding.
    pub prev_hash: [u8; 32],
    /// Sealing validator identifier.
    pub validator: Uuid,
    /// Ed25519 signature over the signing bytes.
    pub signature: [u8; 64],
    /// Transactions in snapshot order.
    pub transactions: Vec<Tx>,
}

impl Block {
    /// Decode one block; consumes exactly its declared length.
    pub fn decode(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let version = r.read_u32()?;
        let timestamp = r.read_u32()?;
        let prev_hash: [u8; 32] = r.read_array()?;
        let validator = r.read_uuid()?;
        let signature: [u8; 64] = r.read_array()?;
        let n_tx = r.read_u32()? as usize;
        let mut transactions = Vec::with_capacity(n_tx.min(1024));
        for _ in 0..n_tx {
            transactions.push(Tx::decode(r)?);
        }
        Ok(Self { version, timestamp, prev_hash, validator, signature, transactions })
    }

    /// Canonical encoding.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SIG_END + 4);
        write_u32(&mut out, self.version);
        write_u32(&mut out, self.timestamp);
        out.extend_from_slice(&self.prev_hash);
        write_uuid(&mut out, &self.validator);
        out.extend_from_slice(&self.signature);
        write_u32(&mut out, self.transactions.len() as u32);
        for tx in &self.transactions {
            out.extend_from_slice(&tx.encode());
        }
        out
    }

    /// The bytes the validator signs: the encoding with the signature elided.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let enc = self.encode();
        let mut out = Vec::with_capacity(enc.len() - 64);
        out.extend_from_slice(&enc[..SIG_START]);
        out.extend_from_slice(&enc[SIG_END..]);
        out
    }

    /// Block hash: SHA-256 of the full encoding. Used as the successor's
    /// `prev_hash`.
    pub fn hash(&self) -> [u8; 32] {
        sha256(&self.encode())
    }

    /// JSON view for the query API.
    pub fn to_json(&self) -> Value {
        json!({
            "version": self.version,
            "timestamp": self.timestamp,
            "prev_hash": hex::encode(self.prev_hash),
            "validator": self.validator.simple().to_string(),
            "signature": hex::encode(self.signature),
            "transactions": self.transactions.iter().map(|tx| json!({
                "version": tx.version,
                "timestamp": tx.timestamp,
                "sender": tx.sender.simple().to_string(),
                "data": tx.data,
            })).collect::<Vec<_>>(),
        })
    }
}

/// An unsealed block on the producing validator.
#[derive(Clone, Debug)]
pub struct BlockCandidate {
    /// Format version.
    pub version: u32,
    /// Sealing time, unix seconds.
    pub timestamp: u32,
    /// Transactions in snapshot order.
    pub transactions: Vec<Tx>,
}

impl BlockCandidate {
    const DEFAULT_VERSION: u32 = 1;

    /// New candidate over the given snapshot.
    pub fn new(transactions: Vec<Tx>, timestamp: u32) -> Self {
        Self { version: Self::DEFAULT_VERSION, timestamp, transactions }
    }

    /// Bytes to sign for the given linkage and sealer.
    pub fn signing_bytes(&self, prev_hash: &[u8; 32], validator: &Uuid) -> Vec<u8> {
        let mut out = Vec::with_capacity(SIG_START + 4);
        write_u32(&mut out, self.version);
        write_u32(&mut out, self.timestamp);
        out.extend_from_slice(prev_hash);
        write_uuid(&mut out, validator);
        write_u32(&mut out, self.transactions.len() as u32);
        for tx in &self.transactions {
            out.extend_from_slice(&tx.encode());
        }
        out
    }

    /// Attach linkage, sealer, and signature, producing a block.
    pub fn into_block(self, prev_hash: [u8; 32], validator: Uuid, signature: [u8; 64]) -> Block {
        Block {
            version: self.version,
            timestamp: self.timestamp,
            prev_hash,
            validator,
            signature,
            transactions: self.transactions,
        }
    }
}

/// Concatenate block encodings with no outer framing.
pub fn encode_chain(blocks: &[Block]) -> Vec<u8> {
    let mut out = Vec::new();
    for block in blocks {
        out.extend_from_slice(&block.encode());
    }
    out
}

/// Decode blocks until the input is exhausted.
pub fn decode_chain(bytes: &[u8]) -> Result<Vec<Block>, CodecError> {
    let mut r = ByteReader::new(bytes);
    let mut blocks = Vec::new();
    while r.remaining() > 0 {
        blocks.push(Block::decode(&mut r)?);
    }
    Ok(blocks)
}
