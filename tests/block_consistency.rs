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

//! Acceptance rules for peer-broadcast blocks: linkage, duplicate
//! acknowledgement, and the verified-pool consistency check.

use potchain::core::block::BlockCandidate;
use potchain::core::consensus::engine::Pot;
use potchain::core::node::{Node, NodeType};
use potchain::core::security::keystore::Keystore;
use potchain::core::transaction::{Tx, TxCandidate, TxVerified};
use potchain::core::types::{now_unix, NodeConfig, PotError};
use serde_json::json;
use uuid::Uuid;

const PEER_HOST: &str = "10.0.0.2";

fn test_pot() -> (tempfile::TempDir, Pot) {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = NodeConfig {
        storage_dir: dir.path().to_str().unwrap().to_string(),
        dump_dir: None,
        genesis_node: None,
        node_type: NodeType::Validator,
        host: "127.0.0.1".to_string(),
        port: 5000,
        validators_part: 0.1,
        min_delay_ms: 0,
        max_delay_ms: 0,
        scenarios: Vec::new(),
    };
    let pot = Pot::new(cfg).expect("engine");
    (dir, pot)
}

/// Engine with a genesis chain and one peer validator that seals blocks.
async fn pot_with_peer() -> (tempfile::TempDir, Pot, tempfile::TempDir, Keystore) {
    let (dir, pot) = test_pot();
    pot.bootstrap(false).await.expect("bootstrap");

    let peer_dir = tempfile::tempdir().expect("tempdir");
    let peer_ks = Keystore::open(peer_dir.path().to_str().unwrap()).expect("peer keystore");
    pot.nodes.add(Node::new(peer_ks.identifier, PEER_HOST, 5000, NodeType::Validator))
        .expect("peer node");
    pot.trust.add_new_node_trust(peer_ks.identifier, None).expect("peer trust");
    pot.validators.set(vec![pot.keystore.identifier, peer_ks.identifier]).expect("validators");
    (dir, pot, peer_dir, peer_ks)
}

fn make_tx(pot: &Pot, value: i64) -> Tx {
    let candidate = TxCandidate::new(json!({ "t": "1", "d": value }), now_unix());
    let signature = pot.keystore.sign(&candidate.signing_bytes(&pot.keystore.identifier));
    candidate.into_tx(pot.keystore.identifier, signature)
}

fn seed_verified(pot: &Pot, tx: &Tx, time: u32) -> Uuid {
    let id = Uuid::new_v4();
    pot.verified.add(id, TxVerified { tx: tx.clone(), time }).expect("seed verified");
    id
}

fn seal_by_peer(pot: &Pot, peer: &Keystore, txs: Vec<Tx>) -> Vec<u8> {
    let prev_hash = pot.chain.last_block().unwrap().unwrap().hash();
    let candidate = BlockCandidate::new(txs, now_unix());
    let signature = peer.sign(&candidate.signing_bytes(&prev_hash, &peer.identifier));
    candidate.into_block(prev_hash, peer.identifier, signature).encode()
}

#[tokio::test]
async fn block_with_full_verified_pool_is_accepted() {
    let (_dir, pot, _peer_dir, peer) = pot_with_peer().await;
    let tx1 = make_tx(&pot, 10);
    let tx2 = make_tx(&pot, 11);
    seed_verified(&pot, &tx1, 100);
    seed_verified(&pot, &tx2, 200);

    let bytes = seal_by_peer(&pot, &peer, vec![tx2.clone(), tx1.clone()]);
    pot.add_new_block(&bytes, PEER_HOST, true).expect("accepted");
    assert_eq!(pot.chain.len().unwrap(), 2);
    assert!(pot.verified.is_empty().unwrap());
}

#[tokio::test]
async fn block_missing_only_oldest_entries_is_accepted() {
    let (_dir, pot, _peer_dir, peer) = pot_with_peer().await;
    let tx1 = make_tx(&pot, 10);
    let tx2 = make_tx(&pot, 11);
    let tx3 = make_tx(&pot, 12);
    let id1 = seed_verified(&pot, &tx1, 100);
    seed_verified(&pot, &tx2, 200);
    seed_verified(&pot, &tx3, 300);

    // tx1 is older than everything the block carries; it may stay behind.
    let bytes = seal_by_peer(&pot, &peer, vec![tx3.clone(), tx2.clone()]);
    pot.add_new_block(&bytes, PEER_HOST, true).expect("accepted");
    let left = pot.verified.all().unwrap();
    assert_eq!(left.keys().copied().collect::<Vec<_>>(), vec![id1]);
}

#[tokio::test]
async fn block_skipping_a_newer_entry_is_refused() {
    let (_dir, pot, _peer_dir, peer) = pot_with_peer().await;
    let tx1 = make_tx(&pot, 10);
    let tx2 = make_tx(&pot, 11);
    let tx3 = make_tx(&pot, 12);
    seed_verified(&pot, &tx1, 100);
    seed_verified(&pot, &tx2, 200);
    seed_verified(&pot, &tx3, 300);

    // tx3 is newer than the included tx1/tx2; the block's transactions do
    // not form the newest-first front of the pool.
    let bytes = seal_by_peer(&pot, &peer, vec![tx2.clone(), tx1.clone()]);
    let err = pot.add_new_block(&bytes, PEER_HOST, true).unwrap_err();
    assert!(matches!(err, PotError::Protocol(_)));
    assert!(err.to_string().contains("not latest"));
    assert_eq!(pot.chain.len().unwrap(), 1);
}

#[tokio::test]
async fn block_with_unverified_transaction_is_refused() {
    let (_dir, pot, _peer_dir, peer) = pot_with_peer().await;
    let known = make_tx(&pot, 10);
    seed_verified(&pot, &known, 100);
    let unknown = make_tx(&pot, 99);

    let bytes = seal_by_peer(&pot, &peer, vec![unknown, known.clone()]);
    let err = pot.add_new_block(&bytes, PEER_HOST, true).unwrap_err();
    assert!(err.to_string().contains("not verified"));
}

#[tokio::test]
async fn conflicting_block_is_refused_and_duplicate_acknowledged() {
    let (_dir, pot, _peer_dir, peer) = pot_with_peer().await;
    let tx = make_tx(&pot, 10);
    seed_verified(&pot, &tx, 100);

    let bytes = seal_by_peer(&pot, &peer, vec![tx.clone()]);
    pot.add_new_block(&bytes, PEER_HOST, true).expect("accepted");

    // Same predecessor, different content: a fork, refused.
    let genesis_hash = pot.chain.all().unwrap()[0].hash();
    let fork = BlockCandidate::new(Vec::new(), now_unix() + 7);
    let signature = fork.signing_bytes(&genesis_hash, &peer.identifier);
    let fork = fork.into_block(genesis_hash, peer.identifier, peer.sign(&signature));
    let err = pot.add_new_block(&fork.encode(), PEER_HOST, true).unwrap_err();
    assert!(matches!(err, PotError::Protocol(_)));

    // Re-delivery of an accepted block is acknowledged without re-append.
    let msg = pot.add_new_block(&bytes, PEER_HOST, true).expect("duplicate ok");
    assert_eq!(msg, "Block is already in blockchain");
    assert_eq!(pot.chain.len().unwrap(), 2);
}

#[tokio::test]
async fn block_from_non_validator_is_refused() {
    let (_dir, pot, _peer_dir, peer) = pot_with_peer().await;
    let bytes = seal_by_peer(&pot, &peer, Vec::new());

    let err = pot.add_new_block(&bytes, "10.9.9.9", true).unwrap_err();
    assert!(matches!(err, PotError::NotAuthorized(_)));

    pot.validators.set(vec![pot.keystore.identifier]).expect("demote peer");
    let err = pot.add_new_block(&bytes, PEER_HOST, true).unwrap_err();
    assert!(matches!(err, PotError::NotAuthorized(_)));
}
