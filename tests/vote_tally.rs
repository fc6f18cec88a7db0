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

use potchain::core::transaction::{TxCandidate, TxToVerify};
use proptest::prelude::*;
use serde_json::json;
use uuid::Uuid;

fn pending() -> TxToVerify {
    let tx = TxCandidate::new(json!({ "t": "1", "d": 12 }), 100).into_tx(Uuid::new_v4(), [0u8; 64]);
    TxToVerify::new(tx, Uuid::new_v4(), 100)
}

#[test]
fn duplicate_vote_is_ignored() {
    let mut entry = pending();
    let voter = Uuid::new_v4();
    entry.add_vote(voter, true);
    entry.add_vote(voter, false);
    assert_eq!(entry.voting.len(), 1);
    assert_eq!(entry.voting.get(&voter), Some(&true));
}

#[test]
fn strict_majority_promotes() {
    let mut entry = pending();
    entry.add_vote(Uuid::new_v4(), true);
    entry.add_vote(Uuid::new_v4(), true);
    entry.add_vote(Uuid::new_v4(), false);
    assert!(entry.is_voting_positive());
}

#[test]
fn tie_rejects() {
    let mut entry = pending();
    entry.add_vote(Uuid::new_v4(), true);
    entry.add_vote(Uuid::new_v4(), false);
    assert!(!entry.is_voting_positive());

    entry.add_vote(Uuid::new_v4(), true);
    entry.add_vote(Uuid::new_v4(), false);
    assert!(!entry.is_voting_positive());
}

#[test]
fn voters_split_by_result() {
    let mut entry = pending();
    let yay = Uuid::new_v4();
    let nay = Uuid::new_v4();
    entry.add_vote(yay, true);
    entry.add_vote(nay, false);
    let (positive, negative) = entry.voters_by_result();
    assert_eq!(positive, vec![yay].into_iter().collect::<Vec<_>>());
    assert_eq!(negative, vec![nay].into_iter().collect::<Vec<_>>());
}

proptest! {
    /// The decision depends only on the vote multiset.
    #[test]
    fn prop_tally_deterministic(votes in proptest::collection::vec(any::<bool>(), 1..12)) {
        let decide = |votes: &[bool]| {
            let mut entry = pending();
            for v in votes {
                entry.add_vote(Uuid::new_v4(), *v);
            }
            entry.is_voting_positive()
        };
        let positives = votes.iter().filter(|v| **v).count();
        let expected = positives * 2 > votes.len();
        prop_assert_eq!(decide(&votes), expected);
        let mut reversed = votes.clone();
        reversed.reverse();
        prop_assert_eq!(decide(&reversed), expected);
    }

    /// The text form carries the full ballot.
    #[test]
    fn prop_pending_string_form_roundtrip(votes in proptest::collection::vec(any::<bool>(), 0..6)) {
        let mut entry = pending();
        for v in votes {
            entry.add_vote(Uuid::new_v4(), v);
        }
        let parsed = TxToVerify::from_string_form(&entry.to_string_form()).expect("parse");
        prop_assert_eq!(parsed, entry);
    }
}
