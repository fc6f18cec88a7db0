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

//! Node configuration and the engine-level error taxonomy.

use crate::core::node::NodeType;
use crate::core::state::storage::StoreError;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// HTTP port every node listens on unless overridden.
pub const DEFAULT_PORT: u16 = 5000;

/// Current unix time, whole seconds.
pub fn now_unix() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

/// Current unix time, float seconds.
pub fn now_unix_f64() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Immutable node configuration, read from the environment once at startup
/// and passed by value thereafter.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Directory holding every state file.
    pub storage_dir: String,
    /// Snapshot directory for the dump worker; `None` disables it.
    pub dump_dir: Option<String>,
    /// Bootstrap peer hostname; `None` means this node is the genesis.
    pub genesis_node: Option<String>,
    /// Initial self-type hint.
    pub node_type: NodeType,
    /// Address peers reach this node at.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Committee fraction for agreement rounds.
    pub validators_part: f64,
    /// Inbound latency injection lower bound, ms.
    pub min_delay_ms: u64,
    /// Inbound latency injection upper bound, ms (0 disables injection).
    pub max_delay_ms: u64,
    /// Synthetic driver scenario names.
    pub scenarios: Vec<String>,
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl NodeConfig {
    /// Read the environment. `SIMULATION` presets expand into delay /
    /// committee-fraction / scenario combinations before the explicit
    /// variables are applied on top.
    pub fn from_env() -> Self {
        let mut validators_part: f64 = 0.1;
        let mut min_delay_ms: u64 = 0;
        let mut max_delay_ms: u64 = 0;
        let mut scenarios: Vec<String> = Vec::new();

        if let Some(sim) = env_opt("SIMULATION").and_then(|v| v.parse::<u32>().ok()) {
            match sim {
                2 => max_delay_ms = 300,
                6 => scenarios.push("mad_sender".to_string()),
                7 => max_delay_ms = 50,
                8 => (min_delay_ms, max_delay_ms) = (50, 100),
                9 => (min_delay_ms, max_delay_ms) = (100, 150),
                10 => (min_delay_ms, max_delay_ms) = (150, 200),
                11 => (min_delay_ms, max_delay_ms) = (200, 250),
                12 => validators_part = 0.1,
                13 => validators_part = 0.3,
                14 => validators_part = 0.4,
                15 => validators_part = 0.5,
                _ => scenarios.push("instant_sender".to_string()),
            }
        }

        if let Some(part) = env_opt("VALIDATORS_PART").and_then(|v| v.parse::<f64>().ok()) {
            if part > 0.0 && part < 1.0 {
                validators_part = part;
            }
        }
        if let Some(ms) = env_opt("MIN_DELAY").and_then(|v| v.parse::<u64>().ok()) {
            min_delay_ms = ms;
        }
        if let Some(ms) = env_opt("MAX_DELAY").and_then(|v| v.parse::<u64>().ok()) {
            max_delay_ms = ms;
        }
        if let Some(list) = env_opt("POT_SCENARIOS") {
            scenarios = list
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        Self {
            storage_dir: env_opt("STORAGE_DIR").unwrap_or_else(|| "./storage".to_string()),
            dump_dir: env_opt("DUMP_DIR"),
            genesis_node: env_opt("GENESIS_NODE"),
            node_type: env_opt("NODE_TYPE")
                .map(|v| NodeType::from_name(&v))
                .unwrap_or(NodeType::Sensor),
            host: env_opt("NODE_HOST")
                .or_else(|| env_opt("HOSTNAME"))
                .unwrap_or_else(|| "127.0.0.1".to_string()),
            port: env_opt("NODE_PORT").and_then(|v| v.parse().ok()).unwrap_or(DEFAULT_PORT),
            validators_part,
            min_delay_ms,
            max_delay_ms,
            scenarios,
        }
    }

    /// Whether this node bootstraps the network: no configured genesis peer,
    /// or the configured peer is this node's own host.
    pub fn is_genesis(&self) -> bool {
        match &self.genesis_node {
            None => true,
            Some(peer) => peer == &self.host,
        }
    }
}

/// Engine error taxonomy, one kind per protocol failure class. The API
/// layer serializes the message verbatim under the mapped status code.
#[derive(Debug, Error)]
pub enum PotError {
    /// Decoding failed, a required field is absent, or a type is wrong.
    #[error("{0}")]
    Malformed(String),
    /// Unknown node or transaction identifier.
    #[error("{0}")]
    Unknown(String),
    /// Transaction already verified or rejected.
    #[error("{0}")]
    AlreadyDecided(String),
    /// Caller is not a validator, or the source address does not match.
    #[error("{0}")]
    NotAuthorized(String),
    /// Agreement started twice, hash mismatch, tally disagreement.
    #[error("{0}")]
    Protocol(String),
    /// Peer unreachable or timed out on a single-target call.
    #[error("rpc: {0}")]
    Rpc(String),
    /// Disk failure underneath a state file.
    #[error("storage: {0}")]
    Storage(#[from] StoreError),
}

impl PotError {
    /// HTTP status the API layer responds with.
    pub fn http_status(&self) -> u16 {
        match self {
            PotError::Malformed(_)
            | PotError::NotAuthorized(_)
            | PotError::Protocol(_)
            | PotError::Rpc(_) => 400,
            PotError::Unknown(_) => 404,
            PotError::AlreadyDecided(_) => 418,
            PotError::Storage(_) => 500,
        }
    }
}
