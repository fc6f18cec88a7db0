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

//! Transaction lifecycle against a single-validator engine: submission,
//! voting, promotion or rejection, sealing.

use potchain::core::consensus::engine::Pot;
use potchain::core::node::NodeType;
use potchain::core::transaction::{Tx, TxCandidate};
use potchain::core::types::{now_unix, NodeConfig, PotError};
use serde_json::json;

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

fn signed_tx(pot: &Pot, payload: serde_json::Value) -> Tx {
    let candidate = TxCandidate::new(payload, now_unix());
    let signature = pot.keystore.sign(&candidate.signing_bytes(&pot.keystore.identifier));
    candidate.into_tx(pot.keystore.identifier, signature)
}

#[tokio::test]
async fn genesis_bootstrap_seeds_chain_and_committee() {
    let (_dir, pot) = test_pot();
    pot.bootstrap(false).await.expect("bootstrap");

    assert_eq!(pot.chain.len().unwrap(), 1);
    let genesis = pot.chain.last_block().unwrap().unwrap();
    assert_eq!(genesis.prev_hash, potchain::core::block::genesis_prev_hash());
    assert_eq!(pot.validators.all().unwrap(), vec![pot.keystore.identifier]);
    assert!(pot.is_self_validator().unwrap());
}

#[tokio::test]
async fn happy_path_promotes_and_seals() {
    let (_dir, pot) = test_pot();
    pot.bootstrap(false).await.expect("bootstrap");
    let self_id = pot.keystore.identifier;

    let tx = signed_tx(&pot, json!({ "t": "1", "d": 12 }));
    let id = pot.transaction_new(&tx.encode(), "127.0.0.1").await.expect("admitted");
    assert!(pot.pending.find(&id).unwrap().is_some());
    // TRANSACTION_CREATED on the sender.
    assert_eq!(pot.trust.get(&self_id).unwrap(), 5002);

    let self_node = pot.self_node();
    pot.add_transaction_verification_result(id, &self_node, true).await.expect("vote");
    assert!(pot.pending.find(&id).unwrap().is_none());
    assert!(pot.verified.find(&id).unwrap().is_some());
    // +1 TRANSACTION_VALIDATED for the positive voter.
    assert_eq!(pot.trust.get(&self_id).unwrap(), 5003);

    // A straggler vote on a decided transaction gets a definitive answer.
    let err = pot.add_transaction_verification_result(id, &self_node, true).await.unwrap_err();
    assert!(matches!(err, PotError::AlreadyDecided(_)));
    assert_eq!(err.http_status(), 418);

    let sealed = pot.seal_block().await.expect("seal");
    assert_eq!(pot.chain.len().unwrap(), 2);
    assert_eq!(sealed.transactions.len(), 1);
    let genesis = pot.chain.all().unwrap()[0].clone();
    assert_eq!(sealed.prev_hash, genesis.hash());
    assert!(pot.verified.is_empty().unwrap());
    // +2 BLOCK_CREATED for the sealer.
    assert_eq!(pot.trust.get(&self_id).unwrap(), 5005);
}

#[tokio::test]
async fn negative_tally_rejects() {
    let (_dir, pot) = test_pot();
    pot.bootstrap(false).await.expect("bootstrap");
    let self_id = pot.keystore.identifier;

    let tx = signed_tx(&pot, json!({ "t": "1", "d": 12 }));
    let id = pot.transaction_new(&tx.encode(), "127.0.0.1").await.expect("admitted");

    let self_node = pot.self_node();
    pot.add_transaction_verification_result(id, &self_node, false).await.expect("vote");
    assert!(pot.verified.find(&id).unwrap().is_none());
    assert!(pot.rejected.has(&id).unwrap());
    // Intake +2, then +1 for voting negative on a rejected transaction.
    assert_eq!(pot.trust.get(&self_id).unwrap(), 5003);

    let err = pot.add_transaction_verification_result(id, &self_node, false).await.unwrap_err();
    assert!(matches!(err, PotError::AlreadyDecided(_)));
}

#[tokio::test]
async fn intake_rejects_bad_submissions() {
    let (_dir, pot) = test_pot();
    pot.bootstrap(false).await.expect("bootstrap");

    // Unknown sender.
    let stranger = TxCandidate::new(json!({ "t": "1", "d": 1 }), now_unix())
        .into_tx(uuid::Uuid::new_v4(), [0u8; 64]);
    let err = pot.transaction_new(&stranger.encode(), "127.0.0.1").await.unwrap_err();
    assert_eq!(err.http_status(), 404);

    // Claimed sender reachable at a different host.
    let tx = signed_tx(&pot, json!({ "t": "1", "d": 1 }));
    let err = pot.transaction_new(&tx.encode(), "10.9.9.9").await.unwrap_err();
    assert!(matches!(err, PotError::NotAuthorized(_)));

    // Payload missing the type tag.
    let tx = signed_tx(&pot, json!({ "d": 1 }));
    let err = pot.transaction_new(&tx.encode(), "127.0.0.1").await.unwrap_err();
    assert!(matches!(err, PotError::Malformed(_)));

    // Garbage bytes.
    let err = pot.transaction_new(&[0u8; 8], "127.0.0.1").await.unwrap_err();
    assert!(matches!(err, PotError::Malformed(_)));
}

#[tokio::test]
async fn transaction_get_serves_pending_and_verified() {
    let (_dir, pot) = test_pot();
    pot.bootstrap(false).await.expect("bootstrap");

    let tx = signed_tx(&pot, json!({ "t": "1", "d": 7 }));
    let id = pot.transaction_new(&tx.encode(), "127.0.0.1").await.expect("admitted");
    assert_eq!(pot.transaction_get(&id).unwrap(), tx.encode());

    let self_node = pot.self_node();
    pot.add_transaction_verification_result(id, &self_node, true).await.expect("vote");
    assert_eq!(pot.transaction_get(&id).unwrap(), tx.encode());

    let missing = uuid::Uuid::new_v4();
    assert_eq!(pot.transaction_get(&missing).unwrap_err().http_status(), 404);
}
