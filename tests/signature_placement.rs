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

//! Signatures must cover the canonical encoding with the signature field
//! elided at the declared offsets.

use potchain::core::block::{genesis_prev_hash, BlockCandidate};
use potchain::core::security::keystore::{raw_from_spki_pem, spki_pem_from_raw, verify_raw, Keystore};
use potchain::core::transaction::{Tx, TxCandidate};
use serde_json::json;

fn keystore() -> (tempfile::TempDir, Keystore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let ks = Keystore::open(dir.path().to_str().unwrap()).expect("keystore");
    (dir, ks)
}

#[test]
fn keystore_identity_survives_reload() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().to_str().unwrap();
    let first = Keystore::open(path).expect("create");
    let second = Keystore::open(path).expect("reload");
    assert_eq!(first.identifier, second.identifier);
    assert_eq!(first.public_key(), second.public_key());
}

#[test]
fn public_key_pem_roundtrip() {
    let (_dir, ks) = keystore();
    let pem = spki_pem_from_raw(&ks.public_key());
    assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));
    assert_eq!(raw_from_spki_pem(&pem).expect("parse"), ks.public_key());
}

#[test]
fn tx_signature_covers_elided_encoding() {
    let (_dir, ks) = keystore();
    let candidate = TxCandidate::new(json!({ "t": "1", "d": 12 }), 1_700_000_000);
    let signature = ks.sign(&candidate.signing_bytes(&ks.identifier));
    let tx = candidate.into_tx(ks.identifier, signature);

    // signing_bytes == encoding[0..24) ++ encoding[88..end)
    let encoded = tx.encode();
    let mut spliced = encoded[..24].to_vec();
    spliced.extend_from_slice(&encoded[88..]);
    assert_eq!(tx.signing_bytes(), spliced);

    verify_raw(&ks.public_key(), &tx.signing_bytes(), &tx.signature).expect("verifies");
}

#[test]
fn tampered_tx_fails_verification() {
    let (_dir, ks) = keystore();
    let candidate = TxCandidate::new(json!({ "t": "1", "d": 12 }), 1_700_000_000);
    let signature = ks.sign(&candidate.signing_bytes(&ks.identifier));
    let tx = candidate.into_tx(ks.identifier, signature);

    let mut encoded = tx.encode();
    let last = encoded.len() - 1;
    encoded[last] ^= 0xff;
    // The payload is no longer valid JSON or the value changed; either way
    // the signature must not verify over the tampered bytes.
    if let Ok(tampered) = Tx::from_bytes(&encoded) {
        assert!(verify_raw(&ks.public_key(), &tampered.signing_bytes(), &tampered.signature)
            .is_err());
    }
}

#[test]
fn foreign_key_fails_verification() {
    let (_dir_a, ks_a) = keystore();
    let (_dir_b, ks_b) = keystore();
    let candidate = TxCandidate::new(json!({ "t": "1", "d": 12 }), 1_700_000_000);
    let signature = ks_a.sign(&candidate.signing_bytes(&ks_a.identifier));
    let tx = candidate.into_tx(ks_a.identifier, signature);
    assert!(verify_raw(&ks_b.public_key(), &tx.signing_bytes(), &tx.signature).is_err());
}

#[test]
fn block_signature_covers_elided_encoding() {
    let (_dir, ks) = keystore();
    let candidate = BlockCandidate::new(Vec::new(), 1_700_000_000);
    let prev_hash = genesis_prev_hash();
    let signature = ks.sign(&candidate.signing_bytes(&prev_hash, &ks.identifier));
    let block = candidate.into_block(prev_hash, ks.identifier, signature);

    // signing_bytes == encoding[0..56) ++ encoding[120..end)
    let encoded = block.encode();
    let mut spliced = encoded[..56].to_vec();
    spliced.extend_from_slice(&encoded[120..]);
    assert_eq!(block.signing_bytes(), spliced);

    verify_raw(&ks.public_key(), &block.signing_bytes(), &block.signature).expect("verifies");
}
