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

//! Long-lived node identity: a UUID plus an Ed25519 keypair.
//!
//! On startup the keystore loads `self_node.json` from the storage
//! directory, or mints a fresh identity and persists it. The private half
//! is PEM-armored PKCS#8, the public half PEM `SubjectPublicKeyInfo`; the
//! file is written atomically with private permissions.

use base64::Engine;
use ring::{
    rand::SystemRandom,
    signature::{Ed25519KeyPair, KeyPair, UnparsedPublicKey, ED25519},
};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use thiserror::Error;
use uuid::Uuid;
use zeroize::Zeroize;

/// Identity file name inside the storage directory.
pub const SELF_NODE_FILE: &str = "self_node.json";

// DER prefix of an Ed25519 SubjectPublicKeyInfo: the 32 raw key bytes follow.
const SPKI_PREFIX: [u8; 12] = [
    0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
];

/// Keystore errors.
#[derive(Debug, Error)]
pub enum KeystoreError {
    #[error("io")]
    Io,
    #[error("invalid key encoding")]
    InvalidKey,
    #[error("bad signature")]
    BadSignature,
    #[error("crypto")]
    Crypto,
}

#[derive(Serialize, Deserialize)]
struct IdentityFile {
    identifier: String,
    private: String,
    public: String,
}

/// PEM-armor DER bytes under the given label.
fn pem_encode(label: &str, der: &[u8]) -> String {
    let b64 = base64::engine::general_purpose::STANDARD.encode(der);
    let mut out = format!("-----BEGIN {label}-----\n");
    for chunk in b64.as_bytes().chunks(64) {
        out.push_str(std::str::from_utf8(chunk).unwrap_or_default());
        out.push('\n');
    }
    out.push_str(&format!("-----END {label}-----\n"));
    out
}

/// Strip PEM armor and decode the DER body.
fn pem_decode(pem: &str) -> Result<Vec<u8>, KeystoreError> {
    let body: String = pem
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect();
    base64::engine::general_purpose::STANDARD
        .decode(body.trim())
        .map_err(|_| KeystoreError::InvalidKey)
}

/// PEM-armored SubjectPublicKeyInfo for raw Ed25519 public key bytes.
pub fn spki_pem_from_raw(pk: &[u8; 32]) -> String {
    let mut der = Vec::with_capacity(SPKI_PREFIX.len() + 32);
    der.extend_from_slice(&SPKI_PREFIX);
    der.extend_from_slice(pk);
    pem_encode("PUBLIC KEY", &der)
}

/// Raw Ed25519 public key bytes out of a PEM SubjectPublicKeyInfo.
pub fn raw_from_spki_pem(pem: &str) -> Result<[u8; 32], KeystoreError> {
    let der = pem_decode(pem)?;
    if der.len() != SPKI_PREFIX.len() + 32 || der[..SPKI_PREFIX.len()] != SPKI_PREFIX {
        return Err(KeystoreError::InvalidKey);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&der[SPKI_PREFIX.len()..]);
    Ok(out)
}

/// Verify an Ed25519 signature given raw public key bytes.
pub fn verify_raw(pk: &[u8; 32], msg: &[u8], sig: &[u8]) -> Result<(), KeystoreError> {
    if sig.len() != 64 {
        return Err(KeystoreError::BadSignature);
    }
    let pk = UnparsedPublicKey::new(&ED25519, pk);
    pk.verify(msg, sig).map_err(|_| KeystoreError::BadSignature)
}

#[cfg(unix)]
fn restrict_mode(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
}

#[cfg(not(unix))]
fn restrict_mode(_path: &Path) {}

/// Write key material through a sibling `.partial` file and rename it into
/// place, so a crash mid-write never leaves a torn identity file.
fn write_identity_file(path: &Path, bytes: &[u8]) -> Result<(), KeystoreError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|_| KeystoreError::Io)?;
    }
    let staged = path.with_file_name(format!("{SELF_NODE_FILE}.partial"));
    let mut f = fs::File::create(&staged).map_err(|_| KeystoreError::Io)?;
    restrict_mode(&staged);
    f.write_all(bytes).map_err(|_| KeystoreError::Io)?;
    let _ = f.sync_all();
    drop(f);
    fs::rename(&staged, path).map_err(|_| KeystoreError::Io)?;
    restrict_mode(path);
    Ok(())
}

/// File-backed node identity.
pub struct Keystore {
    /// 128-bit node identifier, minted once.
    pub identifier: Uuid,
    keypair: Ed25519KeyPair,
    public_pem: String,
}

impl Keystore {
    /// Load `self_node.json` from `storage_dir`, or generate and persist a
    /// fresh identity.
    pub fn open(storage_dir: &str) -> Result<Self, KeystoreError> {
        let mut path = PathBuf::from(storage_dir);
        path.push(SELF_NODE_FILE);

        if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|_| KeystoreError::Io)?;
            let file: IdentityFile =
                serde_json::from_str(&raw).map_err(|_| KeystoreError::InvalidKey)?;
            let id_bytes = hex::decode(&file.identifier).map_err(|_| KeystoreError::InvalidKey)?;
            let id_bytes: [u8; 16] =
                id_bytes.try_into().map_err(|_| KeystoreError::InvalidKey)?;
            let identifier = Uuid::from_bytes_le(id_bytes);
            let mut pkcs8 = pem_decode(&file.private)?;
            let keypair =
                Ed25519KeyPair::from_pkcs8(&pkcs8).map_err(|_| KeystoreError::InvalidKey)?;
            pkcs8.zeroize();
            // The stored public half must match the private one.
            if raw_from_spki_pem(&file.public)? != public_key_of(&keypair) {
                return Err(KeystoreError::InvalidKey);
            }
            let public_pem = spki_pem_from_raw(&public_key_of(&keypair));
            return Ok(Self { identifier, keypair, public_pem });
        }

        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).map_err(|_| KeystoreError::Crypto)?;
        let keypair =
            Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).map_err(|_| KeystoreError::InvalidKey)?;
        let identifier = Uuid::new_v4();
        let public_pem = spki_pem_from_raw(&public_key_of(&keypair));

        let mut private_pem = pem_encode("PRIVATE KEY", pkcs8.as_ref());
        let file = IdentityFile {
            identifier: hex::encode(identifier.to_bytes_le()),
            private: private_pem.clone(),
            public: public_pem.clone(),
        };
        let json = serde_json::to_vec(&file).map_err(|_| KeystoreError::Io)?;
        write_identity_file(&path, &json)?;
        private_pem.zeroize();

        Ok(Self { identifier, keypair, public_pem })
    }

    /// Raw public key bytes.
    pub fn public_key(&self) -> [u8; 32] {
        public_key_of(&self.keypair)
    }

    /// PEM SubjectPublicKeyInfo, as served on `/public-key`.
    pub fn public_key_pem(&self) -> &str {
        &self.public_pem
    }

    /// Sign message bytes.
    pub fn sign(&self, msg: &[u8]) -> [u8; 64] {
        let sig = self.keypair.sign(msg);
        let mut out = [0u8; 64];
        out.copy_from_slice(sig.as_ref());
        out
    }
}

fn public_key_of(keypair: &Ed25519KeyPair) -> [u8; 32] {
    let pk = keypair.public_key().as_ref();
    let mut out = [0u8; 32];
    out.copy_from_slice(pk);
    out
}
