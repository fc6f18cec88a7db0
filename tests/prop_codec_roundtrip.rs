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

use potchain::core::block::{decode_chain, encode_chain, genesis_prev_hash, Block, BlockCandidate};
use potchain::core::codec::ByteReader;
use potchain::core::transaction::{Tx, TxCandidate};
use proptest::prelude::*;
use serde_json::json;
use uuid::Uuid;

fn arb_payload() -> impl Strategy<Value = serde_json::Value> {
    (
        "[a-z0-9]{1,8}",
        prop_oneof![
            any::<i32>().prop_map(|v| json!(v)),
            "[a-zA-Z0-9 ]{0,24}".prop_map(|v| json!(v)),
        ],
        proptest::option::of("[a-zA-Z0-9 ]{0,16}"),
    )
        .prop_map(|(t, d, n)| match n {
            Some(n) => json!({ "t": t, "d": d, "n": n }),
            None => json!({ "t": t, "d": d }),
        })
}

fn arb_tx() -> impl Strategy<Value = Tx> {
    (any::<u32>(), any::<[u8; 16]>(), any::<[u8; 64]>(), arb_payload()).prop_map(
        |(timestamp, sender, signature, payload)| {
            TxCandidate::new(payload, timestamp).into_tx(Uuid::from_bytes(sender), signature)
        },
    )
}

fn arb_block() -> impl Strategy<Value = Block> {
    (
        any::<u32>(),
        any::<[u8; 32]>(),
        any::<[u8; 16]>(),
        any::<[u8; 64]>(),
        proptest::collection::vec(arb_tx(), 0..5),
    )
        .prop_map(|(timestamp, prev_hash, validator, signature, txs)| {
            BlockCandidate::new(txs, timestamp).into_block(
                prev_hash,
                Uuid::from_bytes(validator),
                signature,
            )
        })
}

proptest! {
    #[test]
    fn prop_tx_roundtrip(tx in arb_tx()) {
        let encoded = tx.encode();
        let decoded = Tx::decode(&mut ByteReader::new(&encoded)).expect("decode");
        prop_assert_eq!(&decoded, &tx);
        prop_assert_eq!(decoded.encode(), encoded);
    }

    #[test]
    fn prop_tx_encoding_length(tx in arb_tx()) {
        // Fixed header plus the declared payload width.
        prop_assert_eq!(tx.encode().len(), 92 + tx.data_raw().len());
    }

    #[test]
    fn prop_tx_string_form_roundtrip(tx in arb_tx()) {
        let decoded = Tx::from_string_form(&tx.to_string_form()).expect("parse");
        prop_assert_eq!(decoded, tx);
    }

    #[test]
    fn prop_block_roundtrip(block in arb_block()) {
        let encoded = block.encode();
        let decoded = Block::decode(&mut ByteReader::new(&encoded)).expect("decode");
        prop_assert_eq!(&decoded, &block);
        prop_assert_eq!(decoded.hash(), block.hash());
    }

    #[test]
    fn prop_chain_roundtrip(blocks in proptest::collection::vec(arb_block(), 0..4)) {
        let encoded = encode_chain(&blocks);
        let decoded = decode_chain(&encoded).expect("decode");
        prop_assert_eq!(decoded, blocks);
    }

    #[test]
    fn prop_truncated_tx_rejected(tx in arb_tx(), cut in 1usize..16) {
        let encoded = tx.encode();
        let truncated = &encoded[..encoded.len() - cut.min(encoded.len())];
        prop_assert!(Tx::decode(&mut ByteReader::new(truncated)).is_err());
    }
}

#[test]
fn empty_block_is_124_bytes() {
    let block = BlockCandidate::new(Vec::new(), 0).into_block(
        genesis_prev_hash(),
        Uuid::nil(),
        [0u8; 64],
    );
    assert_eq!(block.encode().len(), 124);
}

#[test]
fn chain_links_by_full_encoding_hash() {
    let genesis = BlockCandidate::new(Vec::new(), 1).into_block(
        genesis_prev_hash(),
        Uuid::nil(),
        [1u8; 64],
    );
    let next = BlockCandidate::new(Vec::new(), 2).into_block(genesis.hash(), Uuid::nil(), [2u8; 64]);
    assert_eq!(next.prev_hash, genesis.hash());

    let decoded = decode_chain(&encode_chain(&[genesis.clone(), next.clone()])).expect("decode");
    assert_eq!(decoded[1].prev_hash, decoded[0].hash());
}

#[test]
fn uuid_wire_form_is_little_endian_permutation() {
    let id = Uuid::parse_str("00112233-4455-6677-8899-aabbccddeeff").unwrap();
    let tx = TxCandidate::new(json!({ "t": "1", "d": 1 }), 0).into_tx(id, [0u8; 64]);
    let encoded = tx.encode();
    // Field-wise little-endian: 33221100 5544 7766 then the tail verbatim.
    assert_eq!(
        &encoded[8..24],
        &[
            0x33, 0x22, 0x11, 0x00, 0x55, 0x44, 0x77, 0x66, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd,
            0xee, 0xff
        ]
    );
}
