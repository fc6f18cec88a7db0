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
#![allow(missing_docs)]

//! One typed store per persisted state file.
//!
//! Append (`update`) exists only where the serialization is append-safe:
//! the block chain, the node roster, the trust table, the trust history,
//! and the verified-transaction log. The pending pool and the validator
//! lists rewrite (`dump`) on every mutation.

use crate::core::block::{decode_chain, encode_chain, Block};
use crate::core::node::Node;
use crate::core::state::storage::{csv_from_bytes, csv_to_bytes, FileStore, StoreError};
use crate::core::transaction::{TxToVerify, TxVerified};
use crate::core::trust::NodeTrustChange;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

fn parse_uuid(s: &str, name: &'static str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(s).map_err(|_| StoreError::Corrupt(name))
}

/// `blockchain`: concatenated block encodings.
pub struct BlocksStore(pub FileStore);

impl BlocksStore {
    pub fn open(dir: &str) -> Result<Self, StoreError> {
        Ok(Self(FileStore::open(dir, "blockchain")?))
    }

    pub fn load(&self) -> Result<Vec<Block>, StoreError> {
        let bytes = self.0.read_bytes()?;
        decode_chain(&bytes).map_err(|_| StoreError::Corrupt("blockchain"))
    }

    pub fn dump(&self, blocks: &[Block]) -> Result<(), StoreError> {
        self.0.write_bytes(&encode_chain(blocks))
    }

    pub fn update(&self, blocks: &[Block]) -> Result<(), StoreError> {
        self.0.append_bytes(&encode_chain(blocks))
    }
}

/// `nodes`: CSV `id,host,port`.
pub struct NodeStore(pub FileStore);

impl NodeStore {
    pub fn open(dir: &str) -> Result<Self, StoreError> {
        Ok(Self(FileStore::open(dir, "nodes")?))
    }

    pub fn load(&self) -> Result<Vec<Node>, StoreError> {
        let rows = csv_from_bytes(&self.0.read_bytes()?)?;
        rows.iter()
            .map(|row| Node::from_row(row).map_err(|_| StoreError::Corrupt("nodes")))
            .collect()
    }

    pub fn dump(&self, nodes: &[Node]) -> Result<(), StoreError> {
        self.0.write_bytes(&csv_to_bytes(nodes.iter().map(|n| n.to_row()))?)
    }

    pub fn update(&self, nodes: &[Node]) -> Result<(), StoreError> {
        self.0.append_bytes(&csv_to_bytes(nodes.iter().map(|n| n.to_row()))?)
    }
}

/// `nodes_trust`: CSV `id,score`. Append-safe: the last row per id wins.
pub struct TrustStore(pub FileStore);

impl TrustStore {
    pub fn open(dir: &str) -> Result<Self, StoreError> {
        Ok(Self(FileStore::open(dir, "nodes_trust")?))
    }

    pub fn load(&self) -> Result<BTreeMap<Uuid, i64>, StoreError> {
        let rows = csv_from_bytes(&self.0.read_bytes()?)?;
        let mut out = BTreeMap::new();
        for row in rows {
            if row.len() < 2 {
                return Err(StoreError::Corrupt("nodes_trust"));
            }
            let id = parse_uuid(&row[0], "nodes_trust")?;
            let score: i64 = row[1].parse().map_err(|_| StoreError::Corrupt("nodes_trust"))?;
            out.insert(id, score);
        }
        Ok(out)
    }

    pub fn dump(&self, trusts: &BTreeMap<Uuid, i64>) -> Result<(), StoreError> {
        self.0.write_bytes(&csv_to_bytes(
            trusts.iter().map(|(id, t)| [id.simple().to_string(), t.to_string()]),
        )?)
    }

    pub fn update(&self, id: &Uuid, score: i64) -> Result<(), StoreError> {
        self.0
            .append_bytes(&csv_to_bytes([[id.simple().to_string(), score.to_string()]])?)
    }
}

/// `transaction`: CSV `id,serialized-pending`. Votes mutate rows in place,
/// so the only mutation verb is a full rewrite.
pub struct PendingTxStore(pub FileStore);

impl PendingTxStore {
    pub fn open(dir: &str) -> Result<Self, StoreError> {
        Ok(Self(FileStore::open(dir, "transaction")?))
    }

    pub fn load(&self) -> Result<BTreeMap<Uuid, TxToVerify>, StoreError> {
        let rows = csv_from_bytes(&self.0.read_bytes()?)?;
        let mut out = BTreeMap::new();
        for row in rows {
            if row.len() < 2 {
                return Err(StoreError::Corrupt("transaction"));
            }
            let id = parse_uuid(&row[0], "transaction")?;
            let entry = TxToVerify::from_string_form(&row[1])
                .map_err(|_| StoreError::Corrupt("transaction"))?;
            out.insert(id, entry);
        }
        Ok(out)
    }

    pub fn dump(&self, txs: &BTreeMap<Uuid, TxToVerify>) -> Result<(), StoreError> {
        self.0.write_bytes(&csv_to_bytes(
            txs.iter().map(|(id, tx)| [id.simple().to_string(), tx.to_string_form()]),
        )?)
    }
}

/// `transaction_verified`: CSV `id,serialized-verified`.
pub struct VerifiedTxStore(pub FileStore);

impl VerifiedTxStore {
    pub fn open(dir: &str) -> Result<Self, StoreError> {
        Ok(Self(FileStore::open(dir, "transaction_verified")?))
    }

    pub fn load(&self) -> Result<BTreeMap<Uuid, TxVerified>, StoreError> {
        let rows = csv_from_bytes(&self.0.read_bytes()?)?;
        let mut out = BTreeMap::new();
        for row in rows {
            if row.len() < 2 {
                return Err(StoreError::Corrupt("transaction_verified"));
            }
            let id = parse_uuid(&row[0], "transaction_verified")?;
            let entry = TxVerified::from_string_form(&row[1])
                .map_err(|_| StoreError::Corrupt("transaction_verified"))?;
            out.insert(id, entry);
        }
        Ok(out)
    }

    pub fn dump(&self, txs: &BTreeMap<Uuid, TxVerified>) -> Result<(), StoreError> {
        self.0.write_bytes(&csv_to_bytes(
            txs.iter().map(|(id, tx)| [id.simple().to_string(), tx.to_string_form()]),
        )?)
    }

    pub fn update(&self, id: &Uuid, tx: &TxVerified) -> Result<(), StoreError> {
        self.0
            .append_bytes(&csv_to_bytes([[id.simple().to_string(), tx.to_string_form()]])?)
    }
}

/// `transaction_rejected`: CSV `id`.
pub struct RejectedTxStore(pub FileStore);

impl RejectedTxStore {
    pub fn open(dir: &str) -> Result<Self, StoreError> {
        Ok(Self(FileStore::open(dir, "transaction_rejected")?))
    }

    pub fn load(&self) -> Result<BTreeSet<Uuid>, StoreError> {
        let rows = csv_from_bytes(&self.0.read_bytes()?)?;
        rows.iter()
            .map(|row| {
                row.first()
                    .ok_or(StoreError::Corrupt("transaction_rejected"))
                    .and_then(|s| parse_uuid(s, "transaction_rejected"))
            })
            .collect()
    }

    pub fn update(&self, id: &Uuid) -> Result<(), StoreError> {
        self.0.append_bytes(&csv_to_bytes([[id.simple().to_string()]])?)
    }
}

/// `transaction_time`: commit-latency log, CSV `id,accepted,latency`.
pub struct TxTimeStore(pub FileStore);

impl TxTimeStore {
    pub fn open(dir: &str) -> Result<Self, StoreError> {
        Ok(Self(FileStore::open(dir, "transaction_time")?))
    }

    pub fn update(&self, id: &Uuid, accepted: bool, latency_secs: f64) -> Result<(), StoreError> {
        self.0.append_bytes(&csv_to_bytes([[
            id.simple().to_string(),
            accepted.to_string(),
            latency_secs.to_string(),
        ]])?)
    }
}

/// Semicolon-joined hex UUID list; used for `validators` and
/// `validators_agreement`.
pub struct UuidListStore(pub FileStore);

impl UuidListStore {
    pub fn open(dir: &str, name: &'static str) -> Result<Self, StoreError> {
        Ok(Self(FileStore::open(dir, name)?))
    }

    pub fn load(&self) -> Result<Vec<Uuid>, StoreError> {
        let bytes = self.0.read_bytes()?;
        let text = String::from_utf8(bytes).map_err(|_| StoreError::Corrupt(self.0.name()))?;
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        text.split(';')
            .map(|hx| Uuid::parse_str(hx.trim()).map_err(|_| StoreError::Corrupt(self.0.name())))
            .collect()
    }

    pub fn dump(&self, ids: &[Uuid]) -> Result<(), StoreError> {
        let joined =
            ids.iter().map(|id| id.simple().to_string()).collect::<Vec<_>>().join(";");
        self.0.write_bytes(joined.as_bytes())
    }
}

/// `validators_agreement_info`: JSON round state.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AgreementInfo {
    /// Whether a round is open.
    #[serde(rename = "isStarted")]
    pub is_started: bool,
    /// Unix seconds of the last successful rotation.
    pub last_successful_agreement: u32,
    /// Leader succession, newest last.
    pub leaders: Vec<String>,
}

/// Store for [`AgreementInfo`].
pub struct AgreementInfoStore(pub FileStore);

impl AgreementInfoStore {
    pub fn open(dir: &str) -> Result<Self, StoreError> {
        Ok(Self(FileStore::open(dir, "validators_agreement_info")?))
    }

    pub fn load(&self) -> Result<AgreementInfo, StoreError> {
        let bytes = self.0.read_bytes()?;
        if bytes.is_empty() {
            return Ok(AgreementInfo::default());
        }
        serde_json::from_slice(&bytes).map_err(|_| StoreError::Corrupt("validators_agreement_info"))
    }

    pub fn dump(&self, info: &AgreementInfo) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(info)
            .map_err(|_| StoreError::Corrupt("validators_agreement_info"))?;
        self.0.write_bytes(&bytes)
    }
}

/// `validator_agreement_result`: CSV `id,bool`.
pub struct AgreementResultStore(pub FileStore);

impl AgreementResultStore {
    pub fn open(dir: &str) -> Result<Self, StoreError> {
        Ok(Self(FileStore::open(dir, "validator_agreement_result")?))
    }

    pub fn load(&self) -> Result<BTreeMap<Uuid, bool>, StoreError> {
        let rows = csv_from_bytes(&self.0.read_bytes()?)?;
        let mut out = BTreeMap::new();
        for row in rows {
            if row.len() < 2 {
                return Err(StoreError::Corrupt("validator_agreement_result"));
            }
            let id = parse_uuid(&row[0], "validator_agreement_result")?;
            let vote: bool =
                row[1].parse().map_err(|_| StoreError::Corrupt("validator_agreement_result"))?;
            out.insert(id, vote);
        }
        Ok(out)
    }

    pub fn dump(&self, votes: &BTreeMap<Uuid, bool>) -> Result<(), StoreError> {
        self.0.write_bytes(&csv_to_bytes(
            votes.iter().map(|(id, v)| [id.simple().to_string(), v.to_string()]),
        )?)
    }

    pub fn update(&self, id: &Uuid, vote: bool) -> Result<(), StoreError> {
        self.0
            .append_bytes(&csv_to_bytes([[id.simple().to_string(), vote.to_string()]])?)
    }
}

/// `node_trust_history`: CSV `id,ts,type,delta,ctx`.
pub struct TrustHistoryStore(pub FileStore);

impl TrustHistoryStore {
    pub fn open(dir: &str) -> Result<Self, StoreError> {
        Ok(Self(FileStore::open(dir, "node_trust_history")?))
    }

    pub fn load(&self) -> Result<Vec<NodeTrustChange>, StoreError> {
        let rows = csv_from_bytes(&self.0.read_bytes()?)?;
        rows.iter()
            .map(|row| {
                NodeTrustChange::from_row(row).map_err(|_| StoreError::Corrupt("node_trust_history"))
            })
            .collect()
    }

    pub fn dump(&self, events: &[NodeTrustChange]) -> Result<(), StoreError> {
        self.0.write_bytes(&csv_to_bytes(events.iter().map(|e| e.to_row()))?)
    }

    pub fn update(&self, event: &NodeTrustChange) -> Result<(), StoreError> {
        self.0.append_bytes(&csv_to_bytes([event.to_row()])?)
    }
}
