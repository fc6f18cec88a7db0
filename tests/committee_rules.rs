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

//! Committee sizing and the deterministic proposal-validation rule.

use potchain::core::consensus::engine::Pot;
use potchain::core::node::{Node, NodeType};
use potchain::core::types::NodeConfig;
use uuid::Uuid;

fn test_pot(validators_part: f64) -> (tempfile::TempDir, Pot) {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = NodeConfig {
        storage_dir: dir.path().to_str().unwrap().to_string(),
        dump_dir: None,
        genesis_node: None,
        node_type: NodeType::Validator,
        host: "127.0.0.1".to_string(),
        port: 5000,
        validators_part,
        min_delay_ms: 0,
        max_delay_ms: 0,
        scenarios: Vec::new(),
    };
    let pot = Pot::new(cfg).expect("engine");
    (dir, pot)
}

#[test]
fn committee_size_matches_fraction_with_floor_of_two() {
    let (_dir, pot) = test_pot(0.1);
    for n in 2usize..200 {
        let expected = ((0.1 * n as f64).ceil() as usize).max(2);
        assert_eq!(pot.committee_size(n), expected, "n = {n}");
    }

    let (_dir, pot) = test_pot(0.4);
    assert_eq!(pot.committee_size(10), 4);
    assert_eq!(pot.committee_size(25), 10);
    assert_eq!(pot.committee_size(3), 2);
}

/// Ten nodes with distinct trust scores; self is the highest.
fn seeded_pot() -> (tempfile::TempDir, Pot, Vec<Uuid>) {
    let (dir, pot) = test_pot(0.4);
    pot.nodes.add(pot.self_node()).expect("self");
    pot.trust.add_new_node_trust(pot.keystore.identifier, Some(10_000)).expect("trust");
    let mut ranked = Vec::new();
    for i in 0..9u16 {
        let id = Uuid::new_v4();
        pot.nodes.add(Node::new(id, format!("10.0.0.{}", i + 2), 5000, NodeType::Sensor))
            .expect("add");
        pot.trust.add_new_node_trust(id, Some(100 + i as i64 * 10)).expect("trust");
        ranked.push(id);
    }
    ranked.sort_by_key(|id| pot.trust.get(id).unwrap());
    (dir, pot, ranked)
}

#[test]
fn ranking_is_trust_ascending() {
    let (_dir, pot, ranked) = seeded_pot();
    let order = pot.nodes_by_trust_asc().expect("rank");
    // Self has the top score and must come last.
    assert_eq!(order.last().unwrap().0.identifier, pot.keystore.identifier);
    let heads: Vec<Uuid> = order.iter().take(9).map(|(n, _)| n.identifier).collect();
    assert_eq!(heads, ranked);
}

#[test]
fn proposal_with_mandatory_prefix_and_pool_members_is_accepted() {
    let (_dir, pot, ranked) = seeded_pot();
    // 10 nodes at 0.4 => n = 4, mandatory half = 2 lowest.
    let proposal = vec![ranked[0], ranked[1], ranked[5], ranked[7]];
    pot.agreement.set_proposed_list(proposal).expect("set");
    assert!(pot.evaluate_agreement_proposal().expect("evaluate"));
}

#[test]
fn proposal_missing_lowest_trust_half_is_refused() {
    let (_dir, pot, ranked) = seeded_pot();
    let proposal = vec![ranked[2], ranked[3], ranked[5], ranked[7]];
    pot.agreement.set_proposed_list(proposal).expect("set");
    assert!(!pot.evaluate_agreement_proposal().expect("evaluate"));
}

#[test]
fn proposal_with_wrong_size_is_refused() {
    let (_dir, pot, ranked) = seeded_pot();
    let proposal = vec![ranked[0], ranked[1], ranked[5]];
    pot.agreement.set_proposed_list(proposal).expect("set");
    assert!(!pot.evaluate_agreement_proposal().expect("evaluate"));
}

#[test]
fn proposal_with_duplicates_is_refused() {
    let (_dir, pot, ranked) = seeded_pot();
    let proposal = vec![ranked[0], ranked[1], ranked[5], ranked[5]];
    pot.agreement.set_proposed_list(proposal).expect("set");
    assert!(!pot.evaluate_agreement_proposal().expect("evaluate"));
}

#[test]
fn proposal_with_mandatory_member_in_second_half_is_refused() {
    let (_dir, pot, ranked) = seeded_pot();
    // ranked[1] belongs to the mandatory half, not the candidate pool.
    let proposal = vec![ranked[0], ranked[2], ranked[1], ranked[7]];
    pot.agreement.set_proposed_list(proposal).expect("set");
    assert!(!pot.evaluate_agreement_proposal().expect("evaluate"));
}

#[test]
fn proposal_with_stranger_is_refused() {
    let (_dir, pot, ranked) = seeded_pot();
    let proposal = vec![ranked[0], ranked[1], ranked[5], Uuid::new_v4()];
    pot.agreement.set_proposed_list(proposal).expect("set");
    assert!(!pot.evaluate_agreement_proposal().expect("evaluate"));
}
