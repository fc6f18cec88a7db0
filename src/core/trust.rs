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

//! Trust scores and trust-change events.
//!
//! A score is mutated only through `NodeTrustChange` events. The same event
//! reaches a node over multiple hops, so application is idempotent within
//! the recent-history window.

use thiserror::Error;
use uuid::Uuid;

/// Initial score of every node.
pub const BASIC_TRUST: i64 = 5000;

/// Events kept in the recent history this long, seconds.
pub const TRUST_HISTORY_WINDOW_SECS: f64 = 60.0;

/// Negative outcomes scale the positive delta by this factor.
pub const NEGATIVE_FACTOR: i64 = -10;

/// Observable outcomes that move a score.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrustChangeType {
    /// A validator sealed a block.
    BlockCreated,
    /// A sender's transaction was admitted.
    TransactionCreated,
    /// A validator voted on a decided transaction.
    TransactionValidated,
    /// A leader opened an agreement round.
    AgreementStarted,
    /// A validator voted on a decided agreement round.
    AgreementValidation,
}

impl TrustChangeType {
    /// Default (positive-outcome) delta.
    pub fn default_delta(&self) -> i64 {
        match self {
            TrustChangeType::BlockCreated => 2,
            TrustChangeType::TransactionCreated => 2,
            TrustChangeType::TransactionValidated => 1,
            TrustChangeType::AgreementStarted => 5,
            TrustChangeType::AgreementValidation => 1,
        }
    }

    /// Wire code.
    pub fn code(&self) -> u8 {
        match self {
            TrustChangeType::BlockCreated => 1,
            TrustChangeType::TransactionCreated => 2,
            TrustChangeType::TransactionValidated => 3,
            TrustChangeType::AgreementStarted => 4,
            TrustChangeType::AgreementValidation => 5,
        }
    }

    /// Parse a wire code.
    pub fn from_code(code: u8) -> Result<Self, TrustError> {
        Ok(match code {
            1 => TrustChangeType::BlockCreated,
            2 => TrustChangeType::TransactionCreated,
            3 => TrustChangeType::TransactionValidated,
            4 => TrustChangeType::AgreementStarted,
            5 => TrustChangeType::AgreementValidation,
            _ => return Err(TrustError::BadType),
        })
    }
}

/// Trust record errors.
#[derive(Debug, Error)]
pub enum TrustError {
    #[error("unknown trust change type")]
    BadType,
    #[error("invalid trust record")]
    BadRecord,
}

/// One score mutation, propagated to every node and de-duplicated by value.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeTrustChange {
    /// Node whose score moves.
    pub node_id: Uuid,
    /// Event time, float unix seconds.
    pub timestamp: f64,
    /// Outcome kind.
    pub change_type: TrustChangeType,
    /// Signed delta.
    pub change: i64,
    /// Free-form context (transaction id, leader id, ...).
    pub context: String,
}

impl NodeTrustChange {
    /// Build an event.
    pub fn new(
        node_id: Uuid,
        timestamp: f64,
        change_type: TrustChangeType,
        change: i64,
        context: impl Into<String>,
    ) -> Self {
        Self { node_id, timestamp, change_type, change, context: context.into() }
    }

    /// History file row: id, ts, type, delta, ctx.
    pub fn to_row(&self) -> [String; 5] {
        [
            self.node_id.simple().to_string(),
            self.timestamp.to_string(),
            self.change_type.code().to_string(),
            self.change.to_string(),
            self.context.clone(),
        ]
    }

    /// Parse a history file row.
    pub fn from_row(row: &[String]) -> Result<Self, TrustError> {
        if row.len() < 5 {
            return Err(TrustError::BadRecord);
        }
        let node_id = Uuid::parse_str(&row[0]).map_err(|_| TrustError::BadRecord)?;
        let timestamp: f64 = row[1].parse().map_err(|_| TrustError::BadRecord)?;
        let code: u8 = row[2].parse().map_err(|_| TrustError::BadRecord)?;
        let change: i64 = row[3].parse().map_err(|_| TrustError::BadRecord)?;
        Ok(Self {
            node_id,
            timestamp,
            change_type: TrustChangeType::from_code(code)?,
            change,
            context: row[4].clone(),
        })
    }
}
