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

//! Peer node identity and roster entry.
//!
//! The `type` carried here is a hint only; the authoritative validator set
//! is the separate list of UUIDs kept by the validator manager.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Node role hint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeType {
    /// Submits transactions only.
    Sensor,
    /// Accepts, votes, seals, and rotates.
    Validator,
}

impl NodeType {
    /// Parse from the API's upper-case name; unknown names fall back to SENSOR.
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("validator") {
            NodeType::Validator
        } else {
            NodeType::Sensor
        }
    }

    /// API name.
    pub fn name(&self) -> &'static str {
        match self {
            NodeType::Sensor => "SENSOR",
            NodeType::Validator => "VALIDATOR",
        }
    }
}

/// Node record errors (roster file rows, snapshot payloads).
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("invalid node identifier")]
    BadIdentifier,
    #[error("invalid node record")]
    BadRecord,
}

/// A peer in the roster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    /// 128-bit identity, stable for the node's lifetime.
    pub identifier: Uuid,
    /// Reachable host (the address peers check inbound requests against).
    pub host: String,
    /// HTTP port.
    pub port: u16,
    /// Role hint; not authoritative.
    pub node_type: NodeType,
}

impl Node {
    /// Construct a roster entry.
    pub fn new(identifier: Uuid, host: impl Into<String>, port: u16, node_type: NodeType) -> Self {
        Self { identifier, host: host.into(), port, node_type }
    }

    /// Roster file row: id, host, port. Type is derived from the validator
    /// list on load, never persisted.
    pub fn to_row(&self) -> [String; 3] {
        [self.identifier.simple().to_string(), self.host.clone(), self.port.to_string()]
    }

    /// Parse a roster file row.
    pub fn from_row(row: &[String]) -> Result<Self, NodeError> {
        if row.len() < 3 {
            return Err(NodeError::BadRecord);
        }
        let identifier = Uuid::parse_str(&row[0]).map_err(|_| NodeError::BadIdentifier)?;
        let port: u16 = row[2].parse().map_err(|_| NodeError::BadRecord)?;
        Ok(Node::new(identifier, row[1].clone(), port, NodeType::Sensor))
    }
}

/// Roster entry as exposed on the API (includes the trust score).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Hyphenless hex identifier.
    pub identifier: String,
    /// Role name.
    #[serde(rename = "type")]
    pub node_type: String,
    /// Host.
    pub host: String,
    /// Port.
    pub port: u16,
    /// Current trust score.
    pub trust: i64,
}

impl NodeInfo {
    /// Build from a roster entry plus its score.
    pub fn from_node(node: &Node, trust: i64) -> Self {
        Self {
            identifier: node.identifier.simple().to_string(),
            node_type: node.node_type.name().to_string(),
            host: node.host.clone(),
            port: node.port,
            trust,
        }
    }

    /// Back to a roster entry (snapshot install path).
    pub fn to_node(&self) -> Result<Node, NodeError> {
        let identifier =
            Uuid::parse_str(&self.identifier).map_err(|_| NodeError::BadIdentifier)?;
        Ok(Node::new(identifier, self.host.clone(), self.port, NodeType::from_name(&self.node_type)))
    }
}
