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

use prometheus::{IntCounter, IntGauge, Registry};
use thiserror::Error;

/// Metrics errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus")]
    Prom,
}

/// Metrics container.
#[derive(Clone)]
pub struct Metrics {
    /// Registry.
    pub registry: Registry,

    /// Admitted transactions.
    pub transactions_total: IntCounter,
    /// Rejected transactions.
    pub transactions_rejected_total: IntCounter,
    /// Votes recorded.
    pub votes_total: IntCounter,
    /// Blocks appended.
    pub blocks_total: IntCounter,
    /// Current chain length.
    pub block_height: IntGauge,
    /// Trust-change events applied.
    pub trust_changes_total: IntCounter,
    /// Agreement rounds started.
    pub agreement_rounds_total: IntCounter,
    /// API requests answered with an error.
    pub api_errors_total: IntCounter,
}

impl Metrics {
    /// Create and register metrics.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let transactions_total =
            IntCounter::new("potchain_transactions_total", "Admitted transactions")
                .map_err(|_| MetricsError::Prom)?;
        let transactions_rejected_total = IntCounter::new(
            "potchain_transactions_rejected_total",
            "Rejected transactions",
        )
        .map_err(|_| MetricsError::Prom)?;
        let votes_total = IntCounter::new("potchain_votes_total", "Votes recorded")
            .map_err(|_| MetricsError::Prom)?;
        let blocks_total = IntCounter::new("potchain_blocks_total", "Blocks appended")
            .map_err(|_| MetricsError::Prom)?;
        let block_height = IntGauge::new("potchain_block_height", "Current chain length")
            .map_err(|_| MetricsError::Prom)?;
        let trust_changes_total =
            IntCounter::new("potchain_trust_changes_total", "Trust-change events applied")
                .map_err(|_| MetricsError::Prom)?;
        let agreement_rounds_total =
            IntCounter::new("potchain_agreement_rounds_total", "Agreement rounds started")
                .map_err(|_| MetricsError::Prom)?;
        let api_errors_total =
            IntCounter::new("potchain_api_errors_total", "API error responses")
                .map_err(|_| MetricsError::Prom)?;

        registry
            .register(Box::new(transactions_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(transactions_rejected_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(votes_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(blocks_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(block_height.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(trust_changes_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(agreement_rounds_total.clone()))
            .map_err(|_| MetricsError::Prom)?;
        registry
            .register(Box::new(api_errors_total.clone()))
            .map_err(|_| MetricsError::Prom)?;

        Ok(Self {
            registry,
            transactions_total,
            transactions_rejected_total,
            votes_total,
            blocks_total,
            block_height,
            trust_changes_total,
            agreement_rounds_total,
            api_errors_total,
        })
    }
}
