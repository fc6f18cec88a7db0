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

//! State files round-trip through their stores, and sibling instances see
//! each other's writes through the mtime+size freshness stamp.

use potchain::core::node::{Node, NodeType};
use potchain::core::state::managers::NodeManager;
use potchain::core::state::stores::{
    AgreementInfo, AgreementInfoStore, NodeStore, PendingTxStore, TrustHistoryStore, UuidListStore,
};
use potchain::core::transaction::{TxCandidate, TxToVerify};
use potchain::core::trust::{NodeTrustChange, TrustChangeType};
use serde_json::json;
use std::collections::BTreeMap;
use uuid::Uuid;

fn node(host: &str) -> Node {
    Node::new(Uuid::new_v4(), host, 5000, NodeType::Sensor)
}

#[test]
fn node_roster_roundtrip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().to_str().unwrap();
    let store = NodeStore::open(path).expect("open");

    let nodes = vec![node("10.0.0.1"), node("10.0.0.2")];
    store.dump(&nodes).expect("dump");
    assert_eq!(store.load().expect("load"), nodes);

    let extra = node("10.0.0.3");
    store.update(std::slice::from_ref(&extra)).expect("append");
    let all = store.load().expect("reload");
    assert_eq!(all.len(), 3);
    assert_eq!(all[2], extra);
}

#[test]
fn validator_list_roundtrip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = UuidListStore::open(dir.path().to_str().unwrap(), "validators").expect("open");

    assert!(store.load().expect("empty").is_empty());
    let ids = vec![Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
    store.dump(&ids).expect("dump");
    assert_eq!(store.load().expect("load"), ids);

    store.dump(&[]).expect("clear");
    assert!(store.load().expect("cleared").is_empty());
}

#[test]
fn trust_history_roundtrip_keeps_float_timestamps() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = TrustHistoryStore::open(dir.path().to_str().unwrap()).expect("open");

    let events = vec![
        NodeTrustChange::new(Uuid::new_v4(), 1_700_000_000.123456, TrustChangeType::BlockCreated, 2, ""),
        NodeTrustChange::new(
            Uuid::new_v4(),
            1_700_000_060.5,
            TrustChangeType::TransactionValidated,
            -10,
            "leader:abc",
        ),
    ];
    for event in &events {
        store.update(event).expect("append");
    }
    assert_eq!(store.load().expect("load"), events);
}

#[test]
fn pending_pool_roundtrip_with_ballot() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = PendingTxStore::open(dir.path().to_str().unwrap()).expect("open");

    let tx = TxCandidate::new(json!({ "t": "1", "d": "abc" }), 100).into_tx(Uuid::new_v4(), [7u8; 64]);
    let mut entry = TxToVerify::new(tx, Uuid::new_v4(), 101);
    entry.add_vote(Uuid::new_v4(), true);
    entry.add_vote(Uuid::new_v4(), false);

    let mut pool = BTreeMap::new();
    pool.insert(Uuid::new_v4(), entry);
    store.dump(&pool).expect("dump");
    assert_eq!(store.load().expect("load"), pool);
}

#[test]
fn agreement_info_roundtrip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = AgreementInfoStore::open(dir.path().to_str().unwrap()).expect("open");

    assert!(!store.load().expect("default").is_started);
    let info = AgreementInfo {
        is_started: true,
        last_successful_agreement: 1_700_000_000,
        leaders: vec![Uuid::new_v4().simple().to_string()],
    };
    store.dump(&info).expect("dump");
    let loaded = store.load().expect("load");
    assert!(loaded.is_started);
    assert_eq!(loaded.last_successful_agreement, info.last_successful_agreement);
    assert_eq!(loaded.leaders, info.leaders);
}

#[test]
fn sibling_manager_sees_external_writes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().to_str().unwrap();

    let ours = NodeManager::open(path).expect("open");
    let theirs = NodeManager::open(path).expect("open sibling");

    let first = node("10.0.0.1");
    ours.add(first.clone()).expect("add");
    assert_eq!(theirs.all().expect("visible"), vec![first.clone()]);

    let second = node("10.0.0.2");
    theirs.add(second.clone()).expect("add");
    assert_eq!(ours.all().expect("visible"), vec![first, second]);
}

#[test]
fn freshness_stamp_avoids_reload_until_write() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = NodeStore::open(dir.path().to_str().unwrap()).expect("open");

    store.dump(&[node("10.0.0.1")]).expect("dump");
    assert!(store.0.is_up_to_date());

    let sibling = NodeStore::open(dir.path().to_str().unwrap()).expect("open sibling");
    sibling.dump(&[node("10.0.0.100"), node("10.0.0.101")]).expect("overwrite");
    assert!(!store.0.is_up_to_date());
    store.load().expect("reload");
    assert!(store.0.is_up_to_date());
}
