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

//! Transaction forms across the lifecycle: signed wire transaction,
//! unsigned candidate, pending (awaiting votes), and verified.
//!
//! The signature covers the canonical encoding with the signature field
//! elided, so the raw submitted payload bytes are kept verbatim and are
//! never re-serialized before verification.

use crate::core::codec::{sha256, write_u32, write_uuid, ByteReader, CodecError};
use base64::Engine;
use serde_json::Value;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use tracing::warn;
use uuid::Uuid;

/// Key of the type tag inside the transaction payload.
pub const TYPE_KEY: &str = "t";
/// Key of the measured value inside the transaction payload.
pub const DATA_KEY: &str = "d";
/// Key of the optional note inside the transaction payload.
pub const NOTE_KEY: &str = "n";

/// Offset where the signature field starts in the encoding.
const SIG_START: usize = 24;
/// Offset where the signature field ends in the encoding.
const SIG_END: usize = 88;

/// A signed sensor transaction.
///
/// `version(4) || timestamp(4) || sender(16) || signature(64) ||
/// data_len(4) || data_utf8`.
#[derive(Clone, Debug)]
pub struct Tx {
    /// Format version.
    pub version: u32,
    /// Creation time, unix seconds.
    pub timestamp: u32,
    /// Submitting node identifier.
    pub sender: Uuid,
    /// Ed25519 signature over the signing bytes.
    pub signature: [u8; 64],
    /// Raw payload bytes exactly as submitted.
    data_raw: Vec<u8>,
    /// Parsed view of the payload.
    pub data: Value,
}

impl PartialEq for Tx {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.timestamp == other.timestamp
            && self.sender == other.sender
            && self.signature == other.signature
            && self.data_raw == other.data_raw
    }
}

impl Eq for Tx {}

impl Hash for Tx {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.encode().hash(state);
    }
}

impl Tx {
    /// Decode one transaction from the reader.
    pub fn decode(r: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let version = r.read_u32()?;
        let timestamp = r.read_u32()?;
        let sender = r.read_uuid()?;
        let signature: [u8; 64] = r.read_array()?;
        let data_len = r.read_u32()? as usize;
        let data_raw = r.take(data_len)?.to_vec();
        let data_str = std::str::from_utf8(&data_raw).map_err(|_| CodecError::Utf8)?;
        let data: Value = serde_json::from_str(data_str).map_err(|_| CodecError::Json)?;
        if !data.is_object() {
            return Err(CodecError::Json);
        }
        Ok(Self { version, timestamp, sender, signature, data_raw, data })
    }

    /// Decode from a standalone byte blob (trailing bytes are tolerated).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        Tx::decode(&mut ByteReader::new(bytes))
    }

    /// Canonical encoding.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SIG_END + 4 + self.data_raw.len());
        write_u32(&mut out, self.version);
        write_u32(&mut out, self.timestamp);
        write_uuid(&mut out, &self.sender);
        out.extend_from_slice(&self.signature);
        write_u32(&mut out, self.data_raw.len() as u32);
        out.extend_from_slice(&self.data_raw);
        out
    }

    /// The bytes the signature is stamped over: the encoding with the
    /// signature field elided.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let enc = self.encode();
        let mut out = Vec::with_capacity(enc.len() - 64);
        out.extend_from_slice(&enc[..SIG_START]);
        out.extend_from_slice(&enc[SIG_END..]);
        out
    }

    /// Content address of the transaction.
    pub fn hash(&self) -> [u8; 32] {
        sha256(&self.encode())
    }

    /// Enforce the payload shape rules: non-empty string `t`, number-or-string
    /// `d`, string `n` when present.
    pub fn validate_shape(&self) -> Result<(), CodecError> {
        match self.data.get(TYPE_KEY) {
            Some(Value::String(s)) if !s.is_empty() => {}
            _ => return Err(CodecError::Field("t")),
        }
        match self.data.get(DATA_KEY) {
            Some(Value::Number(_)) | Some(Value::String(_)) => {}
            _ => return Err(CodecError::Field("d")),
        }
        if let Some(note) = self.data.get(NOTE_KEY) {
            if !note.is_string() {
                return Err(CodecError::Field("n"));
            }
        }
        Ok(())
    }

    /// Payload type tag, when present.
    pub fn data_type(&self) -> Option<&str> {
        self.data.get(TYPE_KEY).and_then(Value::as_str)
    }

    /// Payload value as a float, when numeric.
    pub fn data_value(&self) -> Option<f64> {
        self.data.get(DATA_KEY).and_then(Value::as_f64)
    }

    /// Raw payload slice.
    pub fn data_raw(&self) -> &[u8] {
        &self.data_raw
    }

    /// Text form used inside row-oriented state files: hex(base64(encoding)).
    pub fn to_string_form(&self) -> String {
        hex::encode(base64::engine::general_purpose::STANDARD.encode(self.encode()))
    }

    /// Parse the text form.
    pub fn from_string_form(s: &str) -> Result<Self, CodecError> {
        let b64 = hex::decode(s).map_err(|_| CodecError::Field("tx"))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(b64)
            .map_err(|_| CodecError::Field("tx"))?;
        Tx::from_bytes(&bytes)
    }
}

/// An unsigned transaction under construction on the sender side.
#[derive(Clone, Debug)]
pub struct TxCandidate {
    version: u32,
    timestamp: u32,
    data_raw: Vec<u8>,
    data: Value,
}

impl TxCandidate {
    const DEFAULT_VERSION: u32 = 1;

    /// Build a candidate; the payload is serialized once here and those
    /// exact bytes are what gets signed.
    pub fn new(data: Value, timestamp: u32) -> Self {
        let data_raw = serde_json::to_vec(&data).unwrap_or_default();
        Self { version: Self::DEFAULT_VERSION, timestamp, data_raw, data }
    }

    /// Bytes the sender signs: the encoding without a signature field.
    pub fn signing_bytes(&self, sender: &Uuid) -> Vec<u8> {
        let mut out = Vec::with_capacity(SIG_START + 4 + self.data_raw.len());
        write_u32(&mut out, self.version);
        write_u32(&mut out, self.timestamp);
        write_uuid(&mut out, sender);
        write_u32(&mut out, self.data_raw.len() as u32);
        out.extend_from_slice(&self.data_raw);
        out
    }

    /// Attach the sender identity and signature, producing a wire transaction.
    pub fn into_tx(self, sender: Uuid, signature: [u8; 64]) -> Tx {
        Tx {
            version: self.version,
            timestamp: self.timestamp,
            sender,
            signature,
            data_raw: self.data_raw,
            data: self.data,
        }
    }
}

/// A transaction promoted by majority vote, waiting for block inclusion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxVerified {
    /// The underlying transaction.
    pub tx: Tx,
    /// Promotion time, unix seconds.
    pub time: u32,
}

impl TxVerified {
    /// Text form: `<tx>:<time>`.
    pub fn to_string_form(&self) -> String {
        format!("{}:{}", self.tx.to_string_form(), self.time)
    }

    /// Parse the text form.
    pub fn from_string_form(s: &str) -> Result<Self, CodecError> {
        let (tx_part, time_part) = s.rsplit_once(':').ok_or(CodecError::Field("verified"))?;
        let tx = Tx::from_string_form(tx_part)?;
        let time: u32 = time_part.trim().parse().map_err(|_| CodecError::Field("verified"))?;
        Ok(Self { tx, time })
    }
}

/// A pending transaction accumulating cross-validator votes.
///
/// Keyed elsewhere by the UUID minted by the accepting validator; the
/// submitter is carried by identifier and resolved through the roster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxToVerify {
    /// The underlying transaction.
    pub tx: Tx,
    /// Submitting node identifier.
    pub node_id: Uuid,
    /// One vote per validator, at most.
    pub voting: BTreeMap<Uuid, bool>,
    /// Arrival time, unix seconds.
    pub time: u32,
}

impl TxToVerify {
    /// New pending entry with an empty ballot.
    pub fn new(tx: Tx, node_id: Uuid, time: u32) -> Self {
        Self { tx, node_id, voting: BTreeMap::new(), time }
    }

    /// Whether this voter already voted.
    pub fn has_vote(&self, voter: &Uuid) -> bool {
        self.voting.contains_key(voter)
    }

    /// Record a vote; a duplicate from the same voter is ignored.
    pub fn add_vote(&mut self, voter: Uuid, result: bool) {
        if self.voting.contains_key(&voter) {
            warn!(voter = %voter.simple(), "vote already recorded, ignoring");
            return;
        }
        self.voting.insert(voter, result);
    }

    /// Strict-majority decision over the recorded votes; a tie rejects.
    pub fn is_voting_positive(&self) -> bool {
        let positives = self.voting.values().filter(|v| **v).count();
        positives * 2 > self.voting.len()
    }

    /// Positive and negative voter identifier lists.
    pub fn voters_by_result(&self) -> (Vec<Uuid>, Vec<Uuid>) {
        let mut positive = Vec::new();
        let mut negative = Vec::new();
        for (id, result) in &self.voting {
            if *result {
                positive.push(*id);
            } else {
                negative.push(*id);
            }
        }
        (positive, negative)
    }

    /// Promote to the verified form.
    pub fn into_verified(self, time: u32) -> TxVerified {
        TxVerified { tx: self.tx, time }
    }

    /// Text form: `<tx>:<submitter>:<votes>:<time>` with votes as
    /// `_`-joined `<voter>-<bool>` pairs.
    pub fn to_string_form(&self) -> String {
        let votes = self
            .voting
            .iter()
            .map(|(id, v)| format!("{}-{}", id.simple(), v))
            .collect::<Vec<_>>()
            .join("_");
        format!("{}:{}:{}:{}", self.tx.to_string_form(), self.node_id.simple(), votes, self.time)
    }

    /// Parse the text form.
    pub fn from_string_form(s: &str) -> Result<Self, CodecError> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 4 {
            return Err(CodecError::Field("pending"));
        }
        let tx = Tx::from_string_form(parts[0])?;
        let node_id = Uuid::parse_str(parts[1]).map_err(|_| CodecError::Field("pending"))?;
        let time: u32 = parts[3].parse().map_err(|_| CodecError::Field("pending"))?;
        let mut entry = TxToVerify::new(tx, node_id, time);
        if !parts[2].is_empty() {
            for vote in parts[2].split('_') {
                let (id, result) = vote.rsplit_once('-').ok_or(CodecError::Field("pending"))?;
                let voter = Uuid::parse_str(id).map_err(|_| CodecError::Field("pending"))?;
                let result: bool = result.parse().map_err(|_| CodecError::Field("pending"))?;
                entry.voting.insert(voter, result);
            }
        }
        Ok(entry)
    }
}
