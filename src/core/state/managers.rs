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

//! In-memory mirrors over the typed stores.
//!
//! Every read path calls `refresh()` first: if the underlying file moved
//! (mtime or size changed), the mirror reloads. That keeps sibling worker
//! processes writing the same storage directory visible without IPC.

use crate::core::block::Block;
use crate::core::node::Node;
use crate::core::state::storage::StoreError;
use crate::core::state::stores::{
    AgreementInfo, AgreementInfoStore, AgreementResultStore, BlocksStore, NodeStore,
    PendingTxStore, RejectedTxStore, TrustHistoryStore, TrustStore, TxTimeStore, UuidListStore,
    VerifiedTxStore,
};
use crate::core::transaction::{TxToVerify, TxVerified};
use crate::core::trust::{NodeTrustChange, BASIC_TRUST, TRUST_HISTORY_WINDOW_SECS};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;
use uuid::Uuid;

/// Ordered list of blocks; append-only, never rewound.
pub struct ChainManager {
    store: BlocksStore,
    blocks: RwLock<Vec<Block>>,
}

impl ChainManager {
    pub fn open(dir: &str) -> Result<Self, StoreError> {
        Ok(Self { store: BlocksStore::open(dir)?, blocks: RwLock::new(Vec::new()) })
    }

    /// Reload the mirror when the file moved underneath us.
    pub fn refresh(&self) -> Result<(), StoreError> {
        if self.store.0.is_up_to_date() {
            return Ok(());
        }
        *self.blocks.write() = self.store.load()?;
        Ok(())
    }

    pub fn all(&self) -> Result<Vec<Block>, StoreError> {
        self.refresh()?;
        Ok(self.blocks.read().clone())
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        self.refresh()?;
        Ok(self.blocks.read().len())
    }

    pub fn last_block(&self) -> Result<Option<Block>, StoreError> {
        self.refresh()?;
        Ok(self.blocks.read().last().cloned())
    }

    /// Append one block and persist via append.
    pub fn add(&self, block: Block) -> Result<(), StoreError> {
        self.refresh()?;
        self.store.update(std::slice::from_ref(&block))?;
        self.blocks.write().push(block);
        Ok(())
    }

    /// Replace the whole chain (bootstrap snapshot install).
    pub fn install(&self, blocks: Vec<Block>) -> Result<(), StoreError> {
        self.store.dump(&blocks)?;
        *self.blocks.write() = blocks;
        Ok(())
    }
}

/// Pending transactions keyed by the UUID minted at admission.
pub struct PendingTxManager {
    store: PendingTxStore,
    txs: RwLock<BTreeMap<Uuid, TxToVerify>>,
}

impl PendingTxManager {
    pub fn open(dir: &str) -> Result<Self, StoreError> {
        Ok(Self { store: PendingTxStore::open(dir)?, txs: RwLock::new(BTreeMap::new()) })
    }

    pub fn refresh(&self) -> Result<(), StoreError> {
        if self.store.0.is_up_to_date() {
            return Ok(());
        }
        *self.txs.write() = self.store.load()?;
        Ok(())
    }

    pub fn all(&self) -> Result<BTreeMap<Uuid, TxToVerify>, StoreError> {
        self.refresh()?;
        Ok(self.txs.read().clone())
    }

    pub fn find(&self, id: &Uuid) -> Result<Option<TxToVerify>, StoreError> {
        self.refresh()?;
        Ok(self.txs.read().get(id).cloned())
    }

    pub fn add(&self, id: Uuid, tx: TxToVerify) -> Result<(), StoreError> {
        self.refresh()?;
        let mut txs = self.txs.write();
        txs.insert(id, tx);
        self.store.dump(&txs)
    }

    pub fn pop(&self, id: &Uuid) -> Result<Option<TxToVerify>, StoreError> {
        self.refresh()?;
        let mut txs = self.txs.write();
        let removed = txs.remove(id);
        if removed.is_some() {
            self.store.dump(&txs)?;
        }
        Ok(removed)
    }

    /// Record one vote. A duplicate from the same voter is ignored with a
    /// warning; the entry must exist.
    pub fn add_verification_result(
        &self,
        id: &Uuid,
        voter: Uuid,
        result: bool,
    ) -> Result<(), StoreError> {
        self.refresh()?;
        let mut txs = self.txs.write();
        let Some(entry) = txs.get_mut(id) else {
            return Err(StoreError::Corrupt("transaction"));
        };
        if entry.has_vote(&voter) {
            warn!(tx = %id.simple(), voter = %voter.simple(), "vote already recorded");
            return Ok(());
        }
        entry.add_vote(voter, result);
        self.store.dump(&txs)
    }
}

/// Verified transactions awaiting block inclusion.
pub struct VerifiedTxManager {
    store: VerifiedTxStore,
    txs: RwLock<BTreeMap<Uuid, TxVerified>>,
}

impl VerifiedTxManager {
    pub fn open(dir: &str) -> Result<Self, StoreError> {
        Ok(Self { store: VerifiedTxStore::open(dir)?, txs: RwLock::new(BTreeMap::new()) })
    }

    pub fn refresh(&self) -> Result<(), StoreError> {
        if self.store.0.is_up_to_date() {
            return Ok(());
        }
        *self.txs.write() = self.store.load()?;
        Ok(())
    }

    pub fn all(&self) -> Result<BTreeMap<Uuid, TxVerified>, StoreError> {
        self.refresh()?;
        Ok(self.txs.read().clone())
    }

    pub fn find(&self, id: &Uuid) -> Result<Option<TxVerified>, StoreError> {
        self.refresh()?;
        Ok(self.txs.read().get(id).cloned())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        self.refresh()?;
        Ok(self.txs.read().is_empty())
    }

    pub fn add(&self, id: Uuid, tx: TxVerified) -> Result<(), StoreError> {
        self.refresh()?;
        let mut txs = self.txs.write();
        self.store.update(&id, &tx)?;
        txs.insert(id, tx);
        Ok(())
    }

    pub fn delete(&self, ids: &[Uuid]) -> Result<(), StoreError> {
        self.refresh()?;
        let mut txs = self.txs.write();
        for id in ids {
            txs.remove(id);
        }
        self.store.dump(&txs)
    }

    /// Deterministic order: verified_time descending, identifier as the
    /// tie-break.
    pub fn sorted_desc(&self) -> Result<Vec<(Uuid, TxVerified)>, StoreError> {
        let mut entries: Vec<(Uuid, TxVerified)> = self.all()?.into_iter().collect();
        entries.sort_by(|a, b| b.1.time.cmp(&a.1.time).then(a.0.cmp(&b.0)));
        Ok(entries)
    }
}

/// Transactions decided negatively; kept so late votes get a definitive
/// answer.
pub struct RejectedTxManager {
    store: RejectedTxStore,
    ids: RwLock<BTreeSet<Uuid>>,
}

impl RejectedTxManager {
    pub fn open(dir: &str) -> Result<Self, StoreError> {
        Ok(Self { store: RejectedTxStore::open(dir)?, ids: RwLock::new(BTreeSet::new()) })
    }

    pub fn refresh(&self) -> Result<(), StoreError> {
        if self.store.0.is_up_to_date() {
            return Ok(());
        }
        *self.ids.write() = self.store.load()?;
        Ok(())
    }

    pub fn has(&self, id: &Uuid) -> Result<bool, StoreError> {
        self.refresh()?;
        Ok(self.ids.read().contains(id))
    }

    pub fn add(&self, id: Uuid) -> Result<(), StoreError> {
        self.refresh()?;
        let mut ids = self.ids.write();
        if ids.insert(id) {
            self.store.update(&id)?;
        }
        Ok(())
    }
}

/// The node roster. Role hints are recomputed from the validator list on
/// every refresh; the list itself is authoritative.
pub struct NodeManager {
    store: NodeStore,
    nodes: RwLock<Vec<Node>>,
}

impl NodeManager {
    pub fn open(dir: &str) -> Result<Self, StoreError> {
        Ok(Self { store: NodeStore::open(dir)?, nodes: RwLock::new(Vec::new()) })
    }

    pub fn refresh(&self) -> Result<(), StoreError> {
        if self.store.0.is_up_to_date() {
            return Ok(());
        }
        *self.nodes.write() = self.store.load()?;
        Ok(())
    }

    pub fn all(&self) -> Result<Vec<Node>, StoreError> {
        self.refresh()?;
        Ok(self.nodes.read().clone())
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        self.refresh()?;
        Ok(self.nodes.read().len())
    }

    pub fn find_by_identifier(&self, id: &Uuid) -> Result<Option<Node>, StoreError> {
        self.refresh()?;
        Ok(self.nodes.read().iter().find(|n| &n.identifier == id).cloned())
    }

    pub fn find_by_host(&self, host: &str) -> Result<Option<Node>, StoreError> {
        self.refresh()?;
        Ok(self.nodes.read().iter().find(|n| n.host == host).cloned())
    }

    pub fn add(&self, node: Node) -> Result<(), StoreError> {
        self.refresh()?;
        let mut nodes = self.nodes.write();
        self.store.update(std::slice::from_ref(&node))?;
        nodes.push(node);
        Ok(())
    }

    /// Bulk merge from a peer snapshot; replaces the roster.
    pub fn install(&self, nodes: Vec<Node>) -> Result<(), StoreError> {
        self.store.dump(&nodes)?;
        *self.nodes.write() = nodes;
        Ok(())
    }

    /// Drop the entry whose host matches ours (used when a snapshot echoes
    /// the receiving node back).
    pub fn exclude_self(&self, self_host: &str) -> Result<(), StoreError> {
        self.refresh()?;
        let mut nodes = self.nodes.write();
        let before = nodes.len();
        nodes.retain(|n| n.host != self_host);
        if nodes.len() != before {
            self.store.dump(&nodes)?;
        }
        Ok(())
    }
}

/// The authoritative validator set: an ordered list of UUIDs.
pub struct ValidatorManager {
    store: UuidListStore,
    ids: RwLock<Vec<Uuid>>,
}

impl ValidatorManager {
    pub fn open(dir: &str) -> Result<Self, StoreError> {
        Ok(Self { store: UuidListStore::open(dir, "validators")?, ids: RwLock::new(Vec::new()) })
    }

    pub fn refresh(&self) -> Result<(), StoreError> {
        if self.store.0.is_up_to_date() {
            return Ok(());
        }
        *self.ids.write() = self.store.load()?;
        Ok(())
    }

    pub fn all(&self) -> Result<Vec<Uuid>, StoreError> {
        self.refresh()?;
        Ok(self.ids.read().clone())
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        self.refresh()?;
        Ok(self.ids.read().len())
    }

    pub fn contains(&self, id: &Uuid) -> Result<bool, StoreError> {
        self.refresh()?;
        Ok(self.ids.read().contains(id))
    }

    pub fn set(&self, ids: Vec<Uuid>) -> Result<(), StoreError> {
        self.store.dump(&ids)?;
        *self.ids.write() = ids;
        Ok(())
    }
}

/// Per-node trust scores.
pub struct TrustManager {
    store: TrustStore,
    scores: RwLock<BTreeMap<Uuid, i64>>,
}

impl TrustManager {
    pub fn open(dir: &str) -> Result<Self, StoreError> {
        Ok(Self { store: TrustStore::open(dir)?, scores: RwLock::new(BTreeMap::new()) })
    }

    pub fn refresh(&self) -> Result<(), StoreError> {
        if self.store.0.is_up_to_date() {
            return Ok(());
        }
        *self.scores.write() = self.store.load()?;
        Ok(())
    }

    pub fn get(&self, id: &Uuid) -> Result<i64, StoreError> {
        self.refresh()?;
        Ok(self.scores.read().get(id).copied().unwrap_or(BASIC_TRUST))
    }

    /// Initialize a node's score; `BASIC_TRUST` unless given.
    pub fn add_new_node_trust(&self, id: Uuid, trust: Option<i64>) -> Result<(), StoreError> {
        self.refresh()?;
        let mut scores = self.scores.write();
        if scores.contains_key(&id) {
            return Ok(());
        }
        let score = trust.unwrap_or(BASIC_TRUST);
        scores.insert(id, score);
        self.store.update(&id, score)
    }

    /// Accumulate a delta.
    pub fn add_delta(&self, id: &Uuid, delta: i64) -> Result<i64, StoreError> {
        self.refresh()?;
        let mut scores = self.scores.write();
        let score = scores.entry(*id).or_insert(BASIC_TRUST);
        *score = score.saturating_add(delta);
        let score = *score;
        self.store.dump(&scores)?;
        Ok(score)
    }
}

/// Recent trust-change events, the idempotence window for propagation.
pub struct TrustHistoryManager {
    store: TrustHistoryStore,
    events: RwLock<Vec<NodeTrustChange>>,
}

impl TrustHistoryManager {
    pub fn open(dir: &str) -> Result<Self, StoreError> {
        Ok(Self { store: TrustHistoryStore::open(dir)?, events: RwLock::new(Vec::new()) })
    }

    pub fn refresh(&self) -> Result<(), StoreError> {
        if self.store.0.is_up_to_date() {
            return Ok(());
        }
        *self.events.write() = self.store.load()?;
        Ok(())
    }

    /// Drop events older than the 60 s window.
    pub fn purge_old(&self, now: f64) -> Result<(), StoreError> {
        self.refresh()?;
        let mut events = self.events.write();
        let before = events.len();
        events.retain(|e| e.timestamp >= now - TRUST_HISTORY_WINDOW_SECS);
        if events.len() != before {
            self.store.dump(&events)?;
        }
        Ok(())
    }

    /// Value-equality membership test.
    pub fn has(&self, event: &NodeTrustChange) -> Result<bool, StoreError> {
        self.refresh()?;
        Ok(self.events.read().iter().any(|e| e == event))
    }

    pub fn add(&self, event: NodeTrustChange) -> Result<(), StoreError> {
        self.refresh()?;
        let mut events = self.events.write();
        self.store.update(&event)?;
        events.push(event);
        Ok(())
    }
}

/// The committee-rotation state machine record.
pub struct AgreementManager {
    info_store: AgreementInfoStore,
    list_store: UuidListStore,
    result_store: AgreementResultStore,
    info: RwLock<AgreementInfo>,
    list: RwLock<Vec<Uuid>>,
    results: RwLock<BTreeMap<Uuid, bool>>,
}

impl AgreementManager {
    pub fn open(dir: &str) -> Result<Self, StoreError> {
        let info_store = AgreementInfoStore::open(dir)?;
        if info_store.0.is_empty()? {
            info_store.dump(&AgreementInfo::default())?;
        }
        Ok(Self {
            info_store,
            list_store: UuidListStore::open(dir, "validators_agreement")?,
            result_store: AgreementResultStore::open(dir)?,
            info: RwLock::new(AgreementInfo::default()),
            list: RwLock::new(Vec::new()),
            results: RwLock::new(BTreeMap::new()),
        })
    }

    pub fn refresh(&self) -> Result<(), StoreError> {
        if !self.info_store.0.is_up_to_date() {
            *self.info.write() = self.info_store.load()?;
        }
        if !self.list_store.0.is_up_to_date() {
            *self.list.write() = self.list_store.load()?;
        }
        if !self.result_store.0.is_up_to_date() {
            *self.results.write() = self.result_store.load()?;
        }
        Ok(())
    }

    pub fn is_started(&self) -> Result<bool, StoreError> {
        self.refresh()?;
        Ok(self.info.read().is_started)
    }

    pub fn last_success(&self) -> Result<u32, StoreError> {
        self.refresh()?;
        Ok(self.info.read().last_successful_agreement)
    }

    /// Current leader: the most recently pushed one.
    pub fn leader(&self) -> Result<Option<Uuid>, StoreError> {
        self.refresh()?;
        Ok(self
            .info
            .read()
            .leaders
            .last()
            .and_then(|hx| Uuid::parse_str(hx).ok()))
    }

    pub fn set_info(&self, is_started: bool, leaders: &[Uuid]) -> Result<(), StoreError> {
        self.refresh()?;
        let mut info = self.info.write();
        info.is_started = is_started;
        info.leaders = leaders.iter().map(|id| id.simple().to_string()).collect();
        self.info_store.dump(&info)
    }

    pub fn push_leader(&self, leader: Uuid) -> Result<(), StoreError> {
        self.refresh()?;
        let mut info = self.info.write();
        info.leaders.push(leader.simple().to_string());
        self.info_store.dump(&info)
    }

    pub fn set_last_success(&self, time: u32) -> Result<(), StoreError> {
        self.refresh()?;
        let mut info = self.info.write();
        info.last_successful_agreement = time;
        self.info_store.dump(&info)
    }

    pub fn proposed_list(&self) -> Result<Vec<Uuid>, StoreError> {
        self.refresh()?;
        Ok(self.list.read().clone())
    }

    pub fn set_proposed_list(&self, ids: Vec<Uuid>) -> Result<(), StoreError> {
        self.list_store.dump(&ids)?;
        *self.list.write() = ids;
        Ok(())
    }

    pub fn votes(&self) -> Result<BTreeMap<Uuid, bool>, StoreError> {
        self.refresh()?;
        Ok(self.results.read().clone())
    }

    pub fn has_vote(&self, id: &Uuid) -> Result<bool, StoreError> {
        self.refresh()?;
        Ok(self.results.read().contains_key(id))
    }

    pub fn add_vote(&self, id: Uuid, vote: bool) -> Result<(), StoreError> {
        self.refresh()?;
        let mut results = self.results.write();
        self.result_store.update(&id, vote)?;
        results.insert(id, vote);
        Ok(())
    }

    /// Clear the proposal and ballots, leaving `last_success` and leaders.
    pub fn clear_round(&self) -> Result<(), StoreError> {
        self.set_proposed_list(Vec::new())?;
        let mut results = self.results.write();
        results.clear();
        self.result_store.dump(&results)
    }

    /// Full reset after an installed validator list.
    pub fn reset(&self, last_success: u32) -> Result<(), StoreError> {
        self.refresh()?;
        {
            let mut info = self.info.write();
            info.is_started = false;
            info.leaders.clear();
            info.last_successful_agreement = last_success;
            self.info_store.dump(&info)?;
        }
        self.clear_round()
    }
}

/// Commit-latency log writer.
pub struct TxTimeManager {
    store: TxTimeStore,
}

impl TxTimeManager {
    pub fn open(dir: &str) -> Result<Self, StoreError> {
        Ok(Self { store: TxTimeStore::open(dir)? })
    }

    pub fn append(&self, id: &Uuid, accepted: bool, latency_secs: f64) -> Result<(), StoreError> {
        self.store.update(id, accepted, latency_secs)
    }
}
