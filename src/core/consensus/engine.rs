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

//! The Proof-of-Trust engine: transaction intake, vote aggregation, block
//! acceptance, trust propagation, and committee rotation.
//!
//! Broadcast failures never roll back local state; the network reconciles
//! through polling and idempotent re-delivery.

use crate::core::block::{decode_chain, encode_chain, genesis_prev_hash, Block, BlockCandidate};
use crate::core::node::{Node, NodeInfo, NodeType};
use crate::core::security::keystore::{raw_from_spki_pem, verify_raw, Keystore};
use crate::core::state::managers::{
    AgreementManager, ChainManager, NodeManager, PendingTxManager, RejectedTxManager,
    TrustHistoryManager, TrustManager, TxTimeManager, ValidatorManager, VerifiedTxManager,
};
use crate::core::transaction::{Tx, TxToVerify, TxVerified};
use crate::core::trust::{NodeTrustChange, TrustChangeType, NEGATIVE_FACTOR};
use crate::core::types::{now_unix, now_unix_f64, NodeConfig, PotError, DEFAULT_PORT};
use crate::monitoring::metrics::Metrics;
use crate::networking::client::PeerClient;
use base64::Engine as _;
use futures::future::join_all;
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Minimum spacing between sealed blocks, seconds.
pub const BLOCK_INTERVAL_SECS: u32 = 150;

/// Minimum spacing between committee re-elections, seconds.
pub const AGREEMENT_INTERVAL_SECS: u32 = 139;

/// One node's engine and all its state managers.
pub struct Pot {
    /// Immutable configuration.
    pub cfg: NodeConfig,
    /// Long-lived identity.
    pub keystore: Keystore,
    /// Hash-linked chain.
    pub chain: ChainManager,
    /// Pending transactions awaiting votes.
    pub pending: PendingTxManager,
    /// Promoted transactions awaiting block inclusion.
    pub verified: VerifiedTxManager,
    /// Negatively decided transactions.
    pub rejected: RejectedTxManager,
    /// Peer roster.
    pub nodes: NodeManager,
    /// Authoritative validator set.
    pub validators: ValidatorManager,
    /// Trust scores.
    pub trust: TrustManager,
    /// Recent trust-change events.
    pub trust_history: TrustHistoryManager,
    /// Committee-rotation state machine.
    pub agreement: AgreementManager,
    /// Commit-latency log.
    pub tx_time: TxTimeManager,
    /// Outbound RPC.
    pub client: PeerClient,
    /// Counters and gauges.
    pub metrics: Metrics,
    pubkeys: RwLock<BTreeMap<Uuid, [u8; 32]>>,
}

impl Pot {
    /// Open every manager under the configured storage directory.
    pub fn new(cfg: NodeConfig) -> Result<Self, PotError> {
        let dir = cfg.storage_dir.clone();
        let keystore = Keystore::open(&dir)
            .map_err(|e| PotError::Storage(crate::core::state::storage::StoreError::Io(e.to_string())))?;
        let mut pubkeys = BTreeMap::new();
        pubkeys.insert(keystore.identifier, keystore.public_key());
        Ok(Self {
            cfg,
            keystore,
            chain: ChainManager::open(&dir)?,
            pending: PendingTxManager::open(&dir)?,
            verified: VerifiedTxManager::open(&dir)?,
            rejected: RejectedTxManager::open(&dir)?,
            nodes: NodeManager::open(&dir)?,
            validators: ValidatorManager::open(&dir)?,
            trust: TrustManager::open(&dir)?,
            trust_history: TrustHistoryManager::open(&dir)?,
            agreement: AgreementManager::open(&dir)?,
            tx_time: TxTimeManager::open(&dir)?,
            client: PeerClient::new().map_err(|e| PotError::Rpc(e.to_string()))?,
            metrics: Metrics::new().map_err(|e| PotError::Protocol(e.to_string()))?,
            pubkeys: RwLock::new(pubkeys),
        })
    }

    /// This node as a roster entry.
    pub fn self_node(&self) -> Node {
        Node::new(self.keystore.identifier, self.cfg.host.clone(), self.cfg.port, self.cfg.node_type)
    }

    /// Whether this node's UUID is in the validator set.
    pub fn is_self_validator(&self) -> Result<bool, PotError> {
        Ok(self.validators.contains(&self.keystore.identifier)?)
    }

    fn require_self_validator(&self) -> Result<(), PotError> {
        if !self.is_self_validator()? {
            return Err(PotError::NotAuthorized("I am not validator".to_string()));
        }
        Ok(())
    }

    /// Resolve a source address to a known node.
    fn node_from_addr(&self, addr: &str) -> Result<Node, PotError> {
        self.nodes
            .find_by_host(addr)?
            .ok_or_else(|| PotError::NotAuthorized("Request came from unknown node".to_string()))
    }

    /// Require the source address to belong to a current validator.
    fn require_from_validator(&self, addr: &str) -> Result<Node, PotError> {
        let node = self.node_from_addr(addr)?;
        if !self.validators.contains(&node.identifier)? {
            return Err(PotError::NotAuthorized(format!(
                "Request came from node '{}' which is not validator",
                node.identifier.simple()
            )));
        }
        Ok(node)
    }

    fn node_by_id(&self, id: &Uuid) -> Result<Node, PotError> {
        self.nodes
            .find_by_identifier(id)?
            .ok_or_else(|| PotError::Unknown(format!("Node not found with identifier {}", id.simple())))
    }

    /// Roster entries in the current validator set.
    pub fn validator_nodes(&self) -> Result<Vec<Node>, PotError> {
        let ids = self.validators.all()?;
        Ok(self
            .nodes
            .all()?
            .into_iter()
            .filter(|n| ids.contains(&n.identifier))
            .collect())
    }

    fn other_validator_nodes(&self) -> Result<Vec<Node>, PotError> {
        Ok(self
            .validator_nodes()?
            .into_iter()
            .filter(|n| n.identifier != self.keystore.identifier)
            .collect())
    }

    fn other_nodes(&self) -> Result<Vec<Node>, PotError> {
        Ok(self
            .nodes
            .all()?
            .into_iter()
            .filter(|n| n.identifier != self.keystore.identifier)
            .collect())
    }

    /// Roster entries with scores, typed for the API and the agreement
    /// rounds.
    pub fn nodes_info(&self, nodes: &[Node]) -> Result<Vec<NodeInfo>, PotError> {
        let validator_ids = self.validators.all()?;
        nodes
            .iter()
            .map(|n| {
                let mut node = n.clone();
                node.node_type = if validator_ids.contains(&n.identifier) {
                    NodeType::Validator
                } else {
                    NodeType::Sensor
                };
                Ok(NodeInfo::from_node(&node, self.trust.get(&n.identifier)?))
            })
            .collect()
    }

    /// Peer public key, fetched once and cached for the node's lifetime.
    async fn peer_public_key(&self, node: &Node) -> Result<[u8; 32], PotError> {
        if let Some(pk) = self.pubkeys.read().get(&node.identifier) {
            return Ok(*pk);
        }
        let pem = self
            .client
            .get_public_key(&node.host, node.port)
            .await
            .map_err(|e| PotError::Rpc(e.to_string()))?;
        let pk = raw_from_spki_pem(&pem)
            .map_err(|_| PotError::Malformed(format!("Bad public key from {}", node.host)))?;
        self.pubkeys.write().insert(node.identifier, pk);
        Ok(pk)
    }

    /// Full transaction validation: payload shape plus signature over the
    /// raw received bytes with the signature field elided.
    async fn validate_tx(&self, tx: &Tx, sender: &Node) -> Result<(), PotError> {
        tx.validate_shape()
            .map_err(|e| PotError::Malformed(format!("Validation error: {e}")))?;
        let pk = self.peer_public_key(sender).await?;
        verify_raw(&pk, &tx.signing_bytes(), &tx.signature).map_err(|_| {
            PotError::Malformed(format!(
                "Transaction not verified by identifier {}",
                tx.sender.simple()
            ))
        })
    }

    /*
     * Bootstrap
     */

    /// Join the network: ensure self is in the roster, then either seed the
    /// chain (genesis) or register with the bootstrap peer and pull its
    /// snapshot.
    pub async fn bootstrap(&self, only_from_file: bool) -> Result<(), PotError> {
        let self_id = self.keystore.identifier;
        if self.nodes.find_by_identifier(&self_id)?.is_none() {
            self.nodes.add(self.self_node())?;
            self.trust.add_new_node_trust(self_id, None)?;
        }

        self.chain.refresh()?;
        self.nodes.refresh()?;
        self.pending.refresh()?;

        if only_from_file {
            return Ok(());
        }

        if self.cfg.is_genesis() {
            info!("running as genesis");
            if self.chain.len()? == 0 {
                self.create_first_block()?;
            }
            if self.validators.len()? < 1 {
                self.validators.set(vec![self_id])?;
            }
            return Ok(());
        }

        if self.nodes.len()? < 2 {
            let genesis_host = self.cfg.genesis_node.clone().unwrap_or_default();
            info!(genesis = %genesis_host, "loading from genesis");
            let peer_info = self
                .client
                .get_info(&genesis_host, DEFAULT_PORT)
                .await
                .map_err(|e| PotError::Rpc(e.to_string()))?;
            let genesis_id = Uuid::parse_str(&peer_info.identifier)
                .map_err(|_| PotError::Malformed("Bad genesis identifier".to_string()))?;
            self.nodes
                .add(Node::new(genesis_id, genesis_host.clone(), DEFAULT_PORT, NodeType::Validator))?;
            self.validators.set(vec![genesis_id])?;

            let registered = self
                .client
                .node_exists(&genesis_host, DEFAULT_PORT, &self_id)
                .await
                .map_err(|e| PotError::Rpc(e.to_string()))?;
            if !registered {
                self.client
                    .register_node(
                        &genesis_host,
                        DEFAULT_PORT,
                        &self_id,
                        self.cfg.port,
                        self.cfg.node_type.name(),
                    )
                    .await
                    .map_err(|e| PotError::Rpc(e.to_string()))?;
            }
            self.update_from_peer(&genesis_host).await?;
        }
        Ok(())
    }

    fn create_first_block(&self) -> Result<(), PotError> {
        let candidate = BlockCandidate::new(Vec::new(), now_unix());
        let prev_hash = genesis_prev_hash();
        let signature =
            self.keystore.sign(&candidate.signing_bytes(&prev_hash, &self.keystore.identifier));
        let block = candidate.into_block(prev_hash, self.keystore.identifier, signature);
        self.chain.add(block)?;
        self.metrics.blocks_total.inc();
        Ok(())
    }

    /// Pull `GET /node/update` from a peer and install its snapshot.
    pub async fn update_from_peer(&self, host: &str) -> Result<(), PotError> {
        let snapshot = self
            .client
            .get_node_update(host, DEFAULT_PORT)
            .await
            .map_err(|e| PotError::Rpc(e.to_string()))?;
        self.install_snapshot(&snapshot)
    }

    fn install_snapshot(&self, snapshot: &Value) -> Result<(), PotError> {
        let chain_hex = snapshot
            .get("blockchain")
            .and_then(Value::as_str)
            .ok_or_else(|| PotError::Malformed("Snapshot missing blockchain".to_string()))?;
        let b64 = hex::decode(chain_hex)
            .map_err(|_| PotError::Malformed("Bad snapshot encoding".to_string()))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(b64)
            .map_err(|_| PotError::Malformed("Bad snapshot encoding".to_string()))?;
        let blocks = decode_chain(&bytes)
            .map_err(|e| PotError::Malformed(format!("Bad snapshot chain: {e}")))?;
        self.chain.install(blocks)?;

        let infos: Vec<NodeInfo> = serde_json::from_value(
            snapshot.get("nodes").cloned().unwrap_or(Value::Array(Vec::new())),
        )
        .map_err(|_| PotError::Malformed("Bad snapshot roster".to_string()))?;
        let mut nodes = Vec::with_capacity(infos.len());
        for info in &infos {
            let node = info
                .to_node()
                .map_err(|_| PotError::Malformed("Bad snapshot roster entry".to_string()))?;
            self.trust.add_new_node_trust(node.identifier, Some(info.trust))?;
            nodes.push(node);
        }
        self.nodes.install(nodes)?;
        // The snapshot echoes us back once registered; replace that entry
        // with our own record.
        self.nodes.exclude_self(&self.cfg.host)?;
        self.nodes.add(self.self_node())?;
        Ok(())
    }

    /// Snapshot served on `GET /node/update`.
    pub fn node_update_snapshot(&self) -> Result<Value, PotError> {
        self.require_self_validator()?;
        let chain = self.chain.all()?;
        let nodes = self.nodes.all()?;
        let encoded =
            hex::encode(base64::engine::general_purpose::STANDARD.encode(encode_chain(&chain)));
        Ok(json!({
            "blockchain": encoded,
            "nodes": self.nodes_info(&nodes)?,
        }))
    }

    /*
     * Transaction intake
     */

    /// Admit a freshly submitted transaction (`POST /transaction`).
    pub async fn transaction_new(&self, data: &[u8], source_addr: &str) -> Result<Uuid, PotError> {
        self.require_self_validator()?;
        let tx = Tx::from_bytes(data)
            .map_err(|e| PotError::Malformed(format!("Invalid transaction data: {e}")))?;
        let sender = self.nodes.find_by_identifier(&tx.sender)?.ok_or_else(|| {
            PotError::Unknown(format!("Node not found with identifier {}", tx.sender.simple()))
        })?;
        if sender.host != source_addr {
            return Err(PotError::NotAuthorized(format!(
                "Node hostname ({}) different than remote addr ({source_addr})",
                sender.host
            )));
        }
        self.validate_tx(&tx, &sender).await?;

        let id = Uuid::new_v4();
        self.pending.add(id, TxToVerify::new(tx.clone(), sender.identifier, now_unix()))?;
        self.metrics.transactions_total.inc();

        self.send_transaction_populate(&id, &tx).await;
        self.change_node_trust(
            sender.identifier,
            TrustChangeType::TransactionCreated,
            None,
            &id.simple().to_string(),
        )
        .await?;
        Ok(id)
    }

    async fn send_transaction_populate(&self, id: &Uuid, tx: &Tx) {
        let Ok(targets) = self.other_validator_nodes() else { return };
        let encoded = tx.encode();
        let calls = targets.iter().map(|node| {
            let bytes = encoded.clone();
            async move {
                if let Err(e) =
                    self.client.send_transaction_populate(&node.host, node.port, id, bytes).await
                {
                    error!(peer = %node.identifier.simple(), %e, "transaction populate failed");
                }
            }
        });
        join_all(calls).await;
    }

    /// Receive a gossiped transaction (`POST /transaction/{id}/populate`).
    pub async fn transaction_populate(&self, data: &[u8], id: Uuid) -> Result<(), PotError> {
        if self.pending.find(&id)?.is_some() {
            info!(tx = %id.simple(), "transaction already registered");
            return Ok(());
        }
        let tx = Tx::from_bytes(data)
            .map_err(|e| PotError::Malformed(format!("Invalid transaction data: {e}")))?;
        if self.chain.all()?.iter().any(|b| b.transactions.contains(&tx)) {
            return Err(PotError::AlreadyDecided(
                "Transaction is already included in a block".to_string(),
            ));
        }
        let sender = match self.nodes.find_by_identifier(&tx.sender)? {
            Some(node) => node,
            None if tx.sender == self.keystore.identifier => self.self_node(),
            None => {
                return Err(PotError::Unknown(format!(
                    "Node not found with identifier {}",
                    tx.sender.simple()
                )))
            }
        };
        self.validate_tx(&tx, &sender).await?;
        self.pending.add(id, TxToVerify::new(tx, sender.identifier, now_unix()))?;
        Ok(())
    }

    /// Raw transaction bytes from the pending or verified pool.
    pub fn transaction_get(&self, id: &Uuid) -> Result<Vec<u8>, PotError> {
        if let Some(entry) = self.pending.find(id)? {
            return Ok(entry.tx.encode());
        }
        if let Some(entry) = self.verified.find(id)? {
            return Ok(entry.tx.encode());
        }
        Err(PotError::Unknown(format!("Cannot find transaction of given id {}", id.simple())))
    }

    /// Install a promotion announced by a peer
    /// (`POST /transaction/{id}/verified`).
    pub fn transaction_verified_new(
        &self,
        id: Uuid,
        body: &str,
        source_addr: &str,
    ) -> Result<(), PotError> {
        self.require_from_validator(source_addr)?;
        let entry = TxVerified::from_string_form(body)
            .map_err(|e| PotError::Malformed(format!("Invalid transaction data: {e}")))?;
        self.verified.add(id, entry)?;
        Ok(())
    }

    /*
     * Voting
     */

    /// Receive a gossiped vote (`POST /transaction/{id}/verifyResult`).
    pub async fn transaction_populate_verify_result(
        &self,
        result: bool,
        id: Uuid,
        source_addr: &str,
    ) -> Result<(), PotError> {
        let voter = self.require_from_validator(source_addr)?;
        self.add_transaction_verification_result(id, &voter, result).await
    }

    /// Record one vote and decide the transaction once every validator
    /// voted. The promotion or rejection happens at most once per id: the
    /// pop under the pool's write lock is the decision point.
    pub async fn add_transaction_verification_result(
        &self,
        id: Uuid,
        voter: &Node,
        result: bool,
    ) -> Result<(), PotError> {
        if !self.validators.contains(&voter.identifier)? {
            // A rotation can outrun a vote in flight; the vote is stale.
            warn!(tx = %id.simple(), voter = %voter.identifier.simple(), "vote from outside the current set, dropped");
            return Ok(());
        }

        if self.pending.find(&id)?.is_none() {
            if self.verified.find(&id)?.is_some() {
                return Err(PotError::AlreadyDecided("Transaction already verified".to_string()));
            }
            if self.rejected.has(&id)? {
                return Err(PotError::AlreadyDecided(
                    "Transaction was already rejected".to_string(),
                ));
            }
            self.fetch_pending_from_validators(id).await?;
        }

        self.pending.add_verification_result(&id, voter.identifier, result)?;
        self.metrics.votes_total.inc();

        let Some(entry) = self.pending.find(&id)? else { return Ok(()) };
        if entry.voting.len() != self.validators.len()? {
            return Ok(());
        }
        let Some(entry) = self.pending.pop(&id)? else { return Ok(()) };

        let (positive, negative) = entry.voters_by_result();
        let change_type = TrustChangeType::TransactionValidated;
        let positive_delta = change_type.default_delta();
        let negative_delta = NEGATIVE_FACTOR * positive_delta;
        let ctx = id.simple().to_string();

        if entry.is_voting_positive() {
            info!(tx = %id.simple(), "transaction promoted");
            let now = now_unix();
            let tx_timestamp = entry.tx.timestamp;
            let verified = entry.into_verified(now);
            self.verified.add(id, verified.clone())?;
            self.send_transaction_verified(&id, &verified).await;
            self.send_multiple_trust_change(&positive, change_type, positive_delta, &ctx).await?;
            self.send_multiple_trust_change(&negative, change_type, negative_delta, &ctx).await?;
            self.tx_time.append(&id, true, now_unix_f64() - tx_timestamp as f64)?;
        } else {
            info!(tx = %id.simple(), "transaction rejected");
            self.rejected.add(id)?;
            self.metrics.transactions_rejected_total.inc();
            self.send_multiple_trust_change(&positive, change_type, negative_delta, &ctx).await?;
            self.send_multiple_trust_change(&negative, change_type, positive_delta, &ctx).await?;
            self.tx_time.append(&id, false, now_unix_f64() - entry.tx.timestamp as f64)?;
        }
        Ok(())
    }

    async fn fetch_pending_from_validators(&self, id: Uuid) -> Result<(), PotError> {
        let mut tx_bytes: Option<Vec<u8>> = None;
        for node in self.validator_nodes()? {
            if node.identifier == self.keystore.identifier {
                continue;
            }
            info!(tx = %id.simple(), peer = %node.identifier.simple(), "fetching transaction");
            match self.client.get_transaction(&node.host, node.port, &id).await {
                Ok(bytes) => {
                    tx_bytes = Some(bytes);
                    break;
                }
                Err(e) => warn!(%e, "transaction fetch failed"),
            }
        }
        let bytes = tx_bytes.ok_or_else(|| {
            PotError::Rpc("Cannot get transaction to verify from validators".to_string())
        })?;
        let tx = Tx::from_bytes(&bytes)
            .map_err(|e| PotError::Malformed(format!("Invalid transaction data: {e}")))?;
        let sender = self.node_by_id(&tx.sender)?;
        self.validate_tx(&tx, &sender).await?;
        self.pending.add(id, TxToVerify::new(tx, sender.identifier, now_unix()))?;
        Ok(())
    }

    async fn send_transaction_verified(&self, id: &Uuid, verified: &TxVerified) {
        let Ok(targets) = self.other_nodes() else { return };
        let body = verified.to_string_form();
        let calls = targets.iter().map(|node| {
            let body = body.clone();
            async move {
                if let Err(e) =
                    self.client.send_transaction_verified(&node.host, node.port, id, body).await
                {
                    error!(peer = %node.identifier.simple(), %e, "verified announce failed");
                }
            }
        });
        join_all(calls).await;
    }

    /*
     * Blocks
     */

    /// Seal the verified pool into a block, append it, and broadcast it.
    pub async fn seal_block(&self) -> Result<Block, PotError> {
        let last = self
            .chain
            .last_block()?
            .ok_or_else(|| PotError::Protocol("Chain is empty".to_string()))?;
        let snapshot = self.verified.sorted_desc()?;
        let ids: Vec<Uuid> = snapshot.iter().map(|(id, _)| *id).collect();
        let txs: Vec<Tx> = snapshot.into_iter().map(|(_, v)| v.tx).collect();

        let candidate = BlockCandidate::new(txs, now_unix());
        let prev_hash = last.hash();
        let signature =
            self.keystore.sign(&candidate.signing_bytes(&prev_hash, &self.keystore.identifier));
        let block = candidate.into_block(prev_hash, self.keystore.identifier, signature);

        self.chain.add(block.clone())?;
        self.verified.delete(&ids)?;
        self.metrics.blocks_total.inc();
        self.metrics.block_height.set(self.chain.len()? as i64);

        self.broadcast_block(&block).await;
        self.change_node_trust(self.keystore.identifier, TrustChangeType::BlockCreated, None, "")
            .await?;
        Ok(block)
    }

    async fn broadcast_block(&self, block: &Block) {
        let Ok(targets) = self.other_nodes() else { return };
        let encoded = block.encode();
        let calls = targets.iter().map(|node| {
            let bytes = encoded.clone();
            async move {
                if let Err(e) = self.client.send_new_block(&node.host, node.port, bytes).await {
                    error!(peer = %node.identifier.simple(), %e, "block broadcast failed");
                }
            }
        });
        join_all(calls).await;
    }

    /// Accept a block broadcast by a peer (`POST /blockchain/block/new`,
    /// and without the consistency check `POST /block`).
    pub fn add_new_block(
        &self,
        data: &[u8],
        source_addr: &str,
        strict: bool,
    ) -> Result<&'static str, PotError> {
        self.require_from_validator(source_addr)?;
        let blocks = decode_chain(data)
            .map_err(|e| PotError::Malformed(format!("Invalid block data: {e}")))?;
        let [block] = <[Block; 1]>::try_from(blocks)
            .map_err(|_| PotError::Malformed("Expected exactly one block".to_string()))?;

        let last = self
            .chain
            .last_block()?
            .ok_or_else(|| PotError::Protocol("Chain is empty".to_string()))?;
        if block.prev_hash != last.hash() {
            // A block we already hold is acknowledged, not re-appended.
            let block_hash = block.hash();
            if self.chain.all()?.iter().any(|b| b.hash() == block_hash) {
                return Ok("Block is already in blockchain");
            }
            return Err(PotError::Protocol(
                "Prev hash does not match hash of previous block".to_string(),
            ));
        }

        if strict && self.is_self_validator()? {
            self.check_block_consistency(&block)?;
        }

        let verified = self.verified.all()?;
        let to_delete: Vec<Uuid> = verified
            .iter()
            .filter(|(_, v)| block.transactions.contains(&v.tx))
            .map(|(id, _)| *id)
            .collect();
        self.verified.delete(&to_delete)?;
        self.chain.add(block)?;
        self.metrics.blocks_total.inc();
        self.metrics.block_height.set(self.chain.len()? as i64);
        Ok("Block added successfully")
    }

    /// Validator-side consistency check: every block transaction must be in
    /// the local verified pool (or already on the chain), and the block's
    /// transactions must occupy the newest-first front of the pool. Any
    /// verified transaction the block leaves out must be strictly older
    /// than everything it carries; skipping a newer entry is not legal.
    fn check_block_consistency(&self, block: &Block) -> Result<(), PotError> {
        let verified_desc = self.verified.sorted_desc()?;
        let chain = self.chain.all()?;
        let on_chain = |tx: &Tx| chain.iter().any(|b| b.transactions.contains(tx));

        for tx in &block.transactions {
            let known = verified_desc.iter().any(|(_, v)| &v.tx == tx) || on_chain(tx);
            if !known {
                return Err(PotError::Protocol(format!(
                    "Transactions {} are not verified",
                    hex::encode(tx.hash())
                )));
            }
        }

        // Newest-first: once an entry is left out, every later (older)
        // entry must be left out too.
        let mut seen_excluded = false;
        for (id, v) in &verified_desc {
            let included = block.transactions.contains(&v.tx);
            if !included {
                seen_excluded = true;
            } else if seen_excluded {
                return Err(PotError::Protocol(format!(
                    "Transactions {} are not latest",
                    id.simple()
                )));
            }
        }
        Ok(())
    }

    /*
     * Trust propagation
     */

    /// Apply a trust delta locally and fan it out to every other node.
    pub async fn change_node_trust(
        &self,
        target: Uuid,
        change_type: TrustChangeType,
        change: Option<i64>,
        context: &str,
    ) -> Result<(), PotError> {
        let change = change.unwrap_or_else(|| change_type.default_delta());
        let event = NodeTrustChange::new(target, now_unix_f64(), change_type, change, context);
        if !self.apply_trust_change(&event)? {
            return Ok(());
        }
        if change < 0 {
            warn!(node = %target.simple(), change, "negative trust change");
        }

        let payload = json!({
            "timestamp": event.timestamp,
            "change": event.change,
            "type": event.change_type.code(),
            "additionalData": event.context,
        });
        let Ok(targets) = self.other_nodes() else { return Ok(()) };
        let calls = targets.iter().map(|node| {
            let payload = payload.clone();
            async move {
                if let Err(e) =
                    self.client.send_trust_change(&node.host, node.port, &target, &payload).await
                {
                    error!(peer = %node.identifier.simple(), %e, "trust change send failed");
                }
            }
        });
        join_all(calls).await;
        Ok(())
    }

    /// Purge, de-duplicate, apply, and record. Returns whether the event
    /// was new.
    fn apply_trust_change(&self, event: &NodeTrustChange) -> Result<bool, PotError> {
        self.trust_history.purge_old(now_unix_f64())?;
        if self.trust_history.has(event)? {
            return Ok(false);
        }
        self.trust.add_delta(&event.node_id, event.change)?;
        self.trust_history.add(event.clone())?;
        self.metrics.trust_changes_total.inc();
        Ok(true)
    }

    async fn send_multiple_trust_change(
        &self,
        targets: &[Uuid],
        change_type: TrustChangeType,
        change: i64,
        context: &str,
    ) -> Result<(), PotError> {
        for id in targets {
            self.change_node_trust(*id, change_type, Some(change), context).await?;
        }
        Ok(())
    }

    /// Receive a trust-change event (`PATCH /node/{id}/trust`).
    pub fn node_trust_change(&self, target: Uuid, payload: &Value) -> Result<(), PotError> {
        let timestamp = payload
            .get("timestamp")
            .and_then(Value::as_f64)
            .ok_or_else(|| PotError::Malformed("Missing required keys timestamp".to_string()))?;
        let change = payload
            .get("change")
            .and_then(Value::as_i64)
            .ok_or_else(|| PotError::Malformed("Missing required keys change".to_string()))?;
        let code = payload
            .get("type")
            .and_then(Value::as_u64)
            .ok_or_else(|| PotError::Malformed("Missing required keys type".to_string()))?;
        let change_type = TrustChangeType::from_code(code as u8)
            .map_err(|_| PotError::Malformed("Unknown trust change type".to_string()))?;
        let context =
            payload.get("additionalData").and_then(Value::as_str).unwrap_or_default().to_string();

        if self.nodes.find_by_identifier(&target)?.is_none() {
            return Err(PotError::Unknown(format!(
                "Node not found with identifier {}",
                target.simple()
            )));
        }
        let event = NodeTrustChange::new(target, timestamp, change_type, change, context);
        self.apply_trust_change(&event)?;
        Ok(())
    }

    /*
     * Node roster
     */

    /// Register a new node (`POST /node/register`, genesis-facing).
    pub async fn node_register(
        &self,
        identifier: Uuid,
        source_addr: &str,
        port: u16,
        node_type: NodeType,
    ) -> Result<Value, PotError> {
        self.require_self_validator()?;
        for node in self.nodes.all()? {
            if node.host == source_addr && node.port == port {
                return Err(PotError::NotAuthorized(format!(
                    "Node is already registered with identifier: {}",
                    node.identifier.simple()
                )));
            }
        }
        let new_node = Node::new(identifier, source_addr, DEFAULT_PORT, node_type);
        self.nodes.add(new_node.clone())?;
        self.trust.add_new_node_trust(identifier, None)?;

        let payload = json!({
            "identifier": new_node.identifier.simple().to_string(),
            "host": new_node.host,
            "port": new_node.port,
        });
        for node in self.other_nodes()? {
            if node.identifier == new_node.identifier {
                continue;
            }
            info!(new = %new_node.identifier.simple(), peer = %node.identifier.simple(), "populating node");
            if let Err(e) = self.client.send_node_populate(&node.host, node.port, &payload).await {
                error!(peer = %node.identifier.simple(), %e, "node populate failed");
            }
        }
        Ok(payload)
    }

    /// Learn about a node another validator registered
    /// (`POST /node/populate-new`).
    pub fn populate_new_node(&self, payload: &Value, source_addr: &str) -> Result<(), PotError> {
        info!(source = source_addr, "getting new node");
        self.require_from_validator(source_addr)?;
        let identifier = payload
            .get("identifier")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| PotError::Malformed("Missing required keys identifier".to_string()))?;
        let host = payload
            .get("host")
            .and_then(Value::as_str)
            .ok_or_else(|| PotError::Malformed("Missing required keys host".to_string()))?;
        let port = payload
            .get("port")
            .and_then(Value::as_u64)
            .ok_or_else(|| PotError::Malformed("Missing required keys port".to_string()))?;
        if self.nodes.find_by_identifier(&identifier)?.is_some() {
            return Err(PotError::Protocol(format!(
                "Node is already registered with identifier: {}",
                identifier.simple()
            )));
        }
        self.nodes.add(Node::new(identifier, host, port as u16, NodeType::Sensor))?;
        self.trust.add_new_node_trust(identifier, None)?;
        Ok(())
    }

    /// Install a broadcast validator list (`POST /node/validator/new`).
    pub fn node_new_validators(&self, source_addr: &str, payload: &Value) -> Result<(), PotError> {
        self.require_from_validator(source_addr)?;
        let idents = payload
            .get("validators")
            .and_then(Value::as_array)
            .ok_or_else(|| PotError::Malformed("Missing required keys validators".to_string()))?;
        let mut identifiers = Vec::with_capacity(idents.len());
        for ident in idents {
            let id = ident
                .as_str()
                .and_then(|s| Uuid::parse_str(s).ok())
                .ok_or_else(|| PotError::Malformed("Invalid validator identifier".to_string()))?;
            if self.nodes.find_by_identifier(&id)?.is_none() {
                return Err(PotError::Malformed(format!(
                    "Unknown node of identifier {}",
                    id.simple()
                )));
            }
            identifiers.push(id);
        }
        self.validators.set(identifiers)?;
        self.agreement.reset(now_unix())?;
        Ok(())
    }

    /*
     * Committee agreement
     */

    /// Committee size for a roster of `n` nodes.
    pub fn committee_size(&self, n_nodes: usize) -> usize {
        let n = (self.cfg.validators_part * n_nodes as f64).ceil() as usize;
        n.max(2)
    }

    /// Roster sorted by trust ascending, identifier as the tie-break, so
    /// every honest node derives the same order.
    pub fn nodes_by_trust_asc(&self) -> Result<Vec<(Node, i64)>, PotError> {
        let mut out: Vec<(Node, i64)> = self
            .nodes
            .all()?
            .into_iter()
            .map(|n| {
                let trust = self.trust.get(&n.identifier)?;
                Ok((n, trust))
            })
            .collect::<Result<_, PotError>>()?;
        out.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.identifier.cmp(&b.0.identifier)));
        Ok(out)
    }

    /// Leader side: propose a committee and open the round.
    pub async fn start_agreement_round(&self) -> Result<(), PotError> {
        let ranked = self.nodes_by_trust_asc()?;
        if ranked.len() < 2 {
            return Ok(());
        }
        let n = self.committee_size(ranked.len());
        let half = n / 2;

        let mut proposed: Vec<Uuid> =
            ranked.iter().take(half).map(|(node, _)| node.identifier).collect();
        let pool: Vec<Uuid> = ranked.iter().skip(half).map(|(node, _)| node.identifier).collect();
        {
            let mut rng = rand::thread_rng();
            proposed.extend(pool.choose_multiple(&mut rng, n - half).copied());
        }

        info!(
            list = %proposed.iter().map(|id| id.simple().to_string()).collect::<Vec<_>>().join(","),
            "proposing validator committee"
        );

        let self_id = self.keystore.identifier;
        self.agreement.set_info(true, &[self_id])?;
        self.agreement.set_proposed_list(proposed.clone())?;
        self.metrics.agreement_rounds_total.inc();

        for node in self.other_validator_nodes()? {
            if let Err(e) =
                self.client.send_agreement_start(&node.host, node.port, &proposed).await
            {
                error!(peer = %node.identifier.simple(), %e, "agreement proposal send failed");
            }
        }
        let ctx: String =
            proposed.iter().map(|id| id.simple().to_string()).collect::<Vec<_>>().join(",");
        self.change_node_trust(self_id, TrustChangeType::AgreementStarted, None, &ctx).await?;
        // The implicit leader vote; with a single-validator set this also
        // closes the round.
        self.record_agreement_vote(self_id, true).await?;
        Ok(())
    }

    /// Agreement snapshot served on `GET /node/validator/agreement`.
    pub fn node_validator_agreement_get(&self) -> Result<Value, PotError> {
        self.require_self_validator()?;
        let is_started = self.agreement.is_started()?;
        let mut out = json!({ "isStarted": is_started });
        if is_started {
            if let Some(leader) = self.agreement.leader()? {
                out["leader"] = Value::String(leader.simple().to_string());
            }
            out["list"] = json!(self
                .agreement
                .proposed_list()?
                .iter()
                .map(|id| id.simple().to_string())
                .collect::<Vec<_>>());
            let voting: BTreeMap<String, bool> = self
                .agreement
                .votes()?
                .into_iter()
                .map(|(id, v)| (id.simple().to_string(), v))
                .collect();
            out["voting"] = json!(voting);
        }
        Ok(out)
    }

    /// Receive a committee proposal (`POST /node/validator/agreement`).
    pub async fn node_validator_agreement_start(
        &self,
        source_addr: &str,
        payload: &Value,
    ) -> Result<Value, PotError> {
        self.require_self_validator()?;
        if self.agreement.is_started()? {
            return Err(PotError::Protocol("Validator agreement already started".to_string()));
        }
        let leader = self.require_from_validator(source_addr)?;

        let list = payload
            .get("list")
            .and_then(Value::as_array)
            .filter(|l| !l.is_empty())
            .ok_or_else(|| PotError::Malformed("Missing list from request".to_string()))?;
        let mut proposed = Vec::with_capacity(list.len());
        for ident in list {
            let id = ident
                .as_str()
                .and_then(|s| Uuid::parse_str(s).ok())
                .ok_or_else(|| PotError::Malformed("Invalid identifier in list".to_string()))?;
            self.node_by_id(&id)?;
            proposed.push(id);
        }
        if self.committee_size(self.nodes.len()?) != proposed.len() {
            return Err(PotError::Protocol("Validator number is not correct".to_string()));
        }

        let ctx: String =
            proposed.iter().map(|id| id.simple().to_string()).collect::<Vec<_>>().join(",");
        self.agreement.set_info(true, &[leader.identifier])?;
        self.agreement.set_proposed_list(proposed)?;
        self.agreement.add_vote(leader.identifier, true)?;
        self.change_node_trust(leader.identifier, TrustChangeType::AgreementStarted, None, &ctx)
            .await?;
        self.node_validator_agreement_get()
    }

    /// Voter side: check the proposal against the deterministic rule.
    /// The lowest-trust half must match exactly; the rest must come from
    /// the candidate pool above it.
    pub fn evaluate_agreement_proposal(&self) -> Result<bool, PotError> {
        let proposed = self.agreement.proposed_list()?;
        let mut dedup = proposed.clone();
        dedup.sort();
        dedup.dedup();
        if dedup.len() != proposed.len() {
            warn!("duplicates in proposed agreement list");
            return Ok(false);
        }

        let ranked = self.nodes_by_trust_asc()?;
        let n = self.committee_size(ranked.len());
        if proposed.len() != n {
            warn!(expected = n, got = proposed.len(), "proposed committee has wrong size");
            return Ok(false);
        }
        let half = n / 2;
        let mandatory: Vec<Uuid> = ranked.iter().take(half).map(|(node, _)| node.identifier).collect();
        if proposed[..half] != mandatory[..] {
            warn!("proposed committee does not start with the lowest-trust half");
            return Ok(false);
        }
        let pool: Vec<Uuid> = ranked.iter().skip(half).map(|(node, _)| node.identifier).collect();
        for id in &proposed[half..] {
            if !pool.contains(id) {
                warn!(node = %id.simple(), "proposed member outside the candidate pool");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Record an agreement vote (`PATCH /node/validator/agreement/vote`)
    /// and close the round when this vote completes the tally on the
    /// leader.
    pub async fn node_validator_agreement_vote(
        &self,
        source_addr: &str,
        payload: &Value,
    ) -> Result<(), PotError> {
        let node = self.node_from_addr(source_addr)?;
        if !self.validators.contains(&node.identifier)? {
            return Err(PotError::NotAuthorized("Node is not a validator".to_string()));
        }
        let vote = payload
            .get("result")
            .and_then(Value::as_bool)
            .ok_or_else(|| PotError::Malformed("Missing vote result".to_string()))?;
        self.record_agreement_vote(node.identifier, vote).await
    }

    /// Shared vote-recording path for peers and the local agreement loop.
    pub async fn record_agreement_vote(&self, voter: Uuid, vote: bool) -> Result<(), PotError> {
        if self.agreement.has_vote(&voter)? {
            return Err(PotError::Protocol("Vote result is already saved".to_string()));
        }
        self.agreement.add_vote(voter, vote)?;

        let voting_ended = self.agreement.votes()?.len() == self.validators.len()?;
        if voting_ended && self.agreement.leader()? == Some(self.keystore.identifier) {
            self.validator_agreement_end().await?;
        }
        Ok(())
    }

    /// Leader side: close the round, install or retry.
    pub async fn validator_agreement_end(&self) -> Result<(), PotError> {
        let new_validators = self.agreement.proposed_list()?;
        let votes = self.agreement.votes()?;
        let last_leader = self.agreement.leader()?;
        let positives = votes.values().filter(|v| **v).count();
        let success = positives * 2 > votes.len();

        let (positive, negative): (Vec<Uuid>, Vec<Uuid>) = {
            let mut pos = Vec::new();
            let mut neg = Vec::new();
            for (id, v) in &votes {
                if *v {
                    pos.push(*id);
                } else {
                    neg.push(*id);
                }
            }
            (pos, neg)
        };

        self.agreement.clear_round()?;
        if success {
            info!("validator agreement succeeded");
            self.validators.set(new_validators.clone())?;
            self.agreement.reset(now_unix())?;
            self.send_validators_list().await;
        } else {
            info!("validator agreement failed, passing leadership");
            if let Some(next) = self.most_trusted_validator()? {
                self.agreement.push_leader(next)?;
                // Peers clear their round state and learn the new leader.
                for node in self.other_validator_nodes()? {
                    if let Err(e) = self
                        .client
                        .send_agreement_done(&node.host, node.port, &new_validators, &next)
                        .await
                    {
                        error!(peer = %node.identifier.simple(), %e, "agreement done send failed");
                    }
                }
            }
        }

        let change_type = TrustChangeType::AgreementValidation;
        let ctx = format!(
            "leader:{}",
            last_leader.map(|l| l.simple().to_string()).unwrap_or_default()
        );
        self.send_multiple_trust_change(&positive, change_type, change_type.default_delta(), &ctx)
            .await?;
        self.send_multiple_trust_change(
            &negative,
            change_type,
            NEGATIVE_FACTOR * change_type.default_delta(),
            &ctx,
        )
        .await?;
        Ok(())
    }

    /// Reconcile a round a peer leader closed
    /// (`POST /node/validator/agreement/done`). Stragglers that missed the
    /// vote gossip install or retry from the announced outcome.
    pub fn node_validator_agreement_done(
        &self,
        source_addr: &str,
        payload: &Value,
    ) -> Result<(), PotError> {
        self.require_from_validator(source_addr)?;
        let idents = payload
            .get("validators")
            .and_then(Value::as_array)
            .ok_or_else(|| PotError::Malformed("Missing required keys validators".to_string()))?;
        let mut announced = Vec::with_capacity(idents.len());
        for ident in idents {
            let id = ident
                .as_str()
                .and_then(|s| Uuid::parse_str(s).ok())
                .ok_or_else(|| PotError::Malformed("Invalid validator identifier".to_string()))?;
            if self.nodes.find_by_identifier(&id)?.is_none() {
                return Err(PotError::Malformed(format!(
                    "Nodes {} are not nodes",
                    id.simple()
                )));
            }
            announced.push(id);
        }
        let leader = payload
            .get("leader")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| PotError::Malformed("Missing required keys leader".to_string()))?;
        let leader_node = self.nodes.find_by_identifier(&leader)?.ok_or_else(|| {
            PotError::Malformed(format!("Proposed new leader id ({}) is not found", leader.simple()))
        })?;
        if !self.validators.contains(&leader_node.identifier)? {
            return Err(PotError::Protocol(format!(
                "Proposed new leader ({}) is not validator",
                leader.simple()
            )));
        }

        if self.is_self_validator()? {
            if !self.agreement.is_started()? {
                return Err(PotError::Protocol("Agreement is not started".to_string()));
            }
            let proposed = self.agreement.proposed_list()?;
            if !proposed.is_empty() && proposed != announced {
                return Err(PotError::Protocol(
                    "List is not the same as in agreement".to_string(),
                ));
            }
        }

        let votes = self.agreement.votes()?;
        let positives = votes.values().filter(|v| **v).count();
        if positives * 2 > votes.len() {
            self.validators.set(announced)?;
            self.agreement.reset(now_unix())?;
        } else {
            self.agreement.clear_round()?;
            self.agreement.push_leader(leader)?;
        }
        Ok(())
    }

    /// Validator with the highest trust score, the next leader candidate.
    fn most_trusted_validator(&self) -> Result<Option<Uuid>, PotError> {
        let mut best: Option<(Uuid, i64)> = None;
        for node in self.validator_nodes()? {
            let trust = self.trust.get(&node.identifier)?;
            match best {
                Some((_, t)) if t >= trust => {}
                _ => best = Some((node.identifier, trust)),
            }
        }
        Ok(best.map(|(id, _)| id))
    }

    async fn send_validators_list(&self) {
        let Ok(validators) = self.validators.all() else { return };
        let Ok(targets) = self.other_nodes() else { return };
        let calls = targets.iter().map(|node| {
            let list = validators.clone();
            async move {
                info!(peer = %node.identifier.simple(), "sending validators list");
                if let Err(e) =
                    self.client.send_validators_list(&node.host, node.port, &list).await
                {
                    error!(peer = %node.identifier.simple(), %e, "validators list send failed");
                }
            }
        });
        join_all(calls).await;
    }

    /// Broadcast a freshly recorded local agreement vote to the other
    /// validators.
    pub async fn send_agreement_vote(&self, vote: bool) {
        let Ok(targets) = self.other_validator_nodes() else { return };
        let calls = targets.iter().map(|node| async move {
            if let Err(e) = self.client.send_agreement_vote(&node.host, node.port, vote).await {
                error!(peer = %node.identifier.simple(), %e, "agreement vote send failed");
            }
        });
        join_all(calls).await;
    }

    /*
     * Plausibility baseline
     */

    /// Up to 100 most recent numeric `d` values from the same sender with
    /// the same type tag: verified pool first (newest first), then blocks
    /// newest-first.
    pub fn find_last_tx_values(&self, sender: &Uuid, tx_type: &str) -> Result<Vec<f64>, PotError> {
        const MAX_SAMPLES: usize = 100;
        let mut out = Vec::new();

        for (_, verified) in self.verified.sorted_desc()? {
            if out.len() >= MAX_SAMPLES {
                return Ok(out);
            }
            let tx = &verified.tx;
            if &tx.sender == sender && tx.data_type() == Some(tx_type) {
                if let Some(v) = tx.data_value() {
                    out.push(v);
                }
            }
        }

        let chain = self.chain.all()?;
        for block in chain.iter().rev() {
            for tx in &block.transactions {
                if out.len() >= MAX_SAMPLES {
                    return Ok(out);
                }
                if &tx.sender == sender && tx.data_type() == Some(tx_type) {
                    if let Some(v) = tx.data_value() {
                        out.push(v);
                    }
                }
            }
        }
        Ok(out)
    }
}
