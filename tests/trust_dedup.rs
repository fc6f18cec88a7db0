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

//! The same trust event arriving over multiple hops is applied once.

use potchain::core::consensus::engine::Pot;
use potchain::core::node::{Node, NodeType};
use potchain::core::types::{now_unix_f64, NodeConfig};
use serde_json::json;
use uuid::Uuid;

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

fn roster_node(pot: &Pot, host: &str) -> Uuid {
    let id = Uuid::new_v4();
    pot.nodes.add(Node::new(id, host, 5000, NodeType::Sensor)).expect("add node");
    pot.trust.add_new_node_trust(id, None).expect("trust init");
    id
}

#[test]
fn duplicate_event_applies_once() {
    let (_dir, pot) = test_pot();
    let target = roster_node(&pot, "10.0.0.2");

    let payload = json!({
        "timestamp": now_unix_f64(),
        "change": 1,
        "type": 3,
        "additionalData": "abc",
    });
    for _ in 0..3 {
        pot.node_trust_change(target, &payload).expect("apply");
    }
    assert_eq!(pot.trust.get(&target).unwrap(), 5001);
}

#[test]
fn distinct_timestamps_apply_separately() {
    let (_dir, pot) = test_pot();
    let target = roster_node(&pot, "10.0.0.2");
    let now = now_unix_f64();

    for i in 0..3 {
        let payload = json!({
            "timestamp": now + i as f64,
            "change": 1,
            "type": 3,
            "additionalData": "",
        });
        pot.node_trust_change(target, &payload).expect("apply");
    }
    assert_eq!(pot.trust.get(&target).unwrap(), 5003);
}

#[test]
fn negative_delta_applies() {
    let (_dir, pot) = test_pot();
    let target = roster_node(&pot, "10.0.0.2");

    let payload = json!({
        "timestamp": now_unix_f64(),
        "change": -10,
        "type": 3,
        "additionalData": "tx",
    });
    pot.node_trust_change(target, &payload).expect("apply");
    assert_eq!(pot.trust.get(&target).unwrap(), 4990);
}

#[test]
fn unknown_target_is_404() {
    let (_dir, pot) = test_pot();
    let payload = json!({
        "timestamp": now_unix_f64(),
        "change": 1,
        "type": 3,
    });
    let err = pot.node_trust_change(Uuid::new_v4(), &payload).unwrap_err();
    assert_eq!(err.http_status(), 404);
}

#[test]
fn malformed_event_is_400() {
    let (_dir, pot) = test_pot();
    let target = roster_node(&pot, "10.0.0.2");
    let err = pot.node_trust_change(target, &json!({ "change": 1 })).unwrap_err();
    assert_eq!(err.http_status(), 400);
    let err = pot
        .node_trust_change(
            target,
            &json!({ "timestamp": now_unix_f64(), "change": 1, "type": 99 }),
        )
        .unwrap_err();
    assert_eq!(err.http_status(), 400);
}
