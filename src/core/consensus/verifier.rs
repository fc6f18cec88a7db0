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

//! Statistical plausibility verifier.
//!
//! Each validator continuously picks a pending transaction it has not
//! voted on, checks the value against the sender's recent history, records
//! its own vote, and gossips the result.

use crate::core::consensus::engine::Pot;
use crate::core::transaction::TxToVerify;
use crate::core::types::PotError;
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Sleep when the pending pool has nothing for us.
const IDLE_SLEEP: Duration = Duration::from_secs(1);
/// Sleep while this node is not a validator.
const NOT_VALIDATOR_SLEEP: Duration = Duration::from_secs(5);
/// Fewer prior samples than this means no baseline; accept.
const MIN_SAMPLES: usize = 10;

/// Accept a value iff it lies within `μ ± 2σ` of at least [`MIN_SAMPLES`]
/// prior values from the same sender and type. Type `"0"` and non-numeric
/// values pass unconditionally.
pub fn verify_transaction(pot: &Pot, entry: &TxToVerify) -> Result<bool, PotError> {
    let tx = &entry.tx;
    let Some(tx_type) = tx.data_type() else { return Ok(true) };
    if tx_type == "0" {
        return Ok(true);
    }
    let Some(value) = tx.data_value() else { return Ok(true) };

    let samples = pot.find_last_tx_values(&tx.sender, tx_type)?;
    if samples.len() < MIN_SAMPLES {
        debug!(count = samples.len(), "insufficient baseline, accepting");
        return Ok(true);
    }

    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let variance = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();
    let accepted = mean - 2.0 * std <= value && value <= mean + 2.0 * std;
    info!(value, mean, std, accepted, "plausibility check");
    Ok(accepted)
}

/// Pending entries this node has not voted on, shuffled so the validators
/// do not work in lockstep.
fn pick_candidates(pot: &Pot) -> Result<Vec<Uuid>, PotError> {
    let self_id = pot.keystore.identifier;
    let mut ids: Vec<Uuid> = pot
        .pending
        .all()?
        .iter()
        .filter(|(_, entry)| !entry.has_vote(&self_id))
        .map(|(id, _)| *id)
        .collect();
    ids.shuffle(&mut rand::thread_rng());
    Ok(ids)
}

/// The verifier loop; exits when the stop flag flips.
pub async fn run(pot: Arc<Pot>, mut stop: watch::Receiver<bool>) {
    debug!("verifier started");
    loop {
        if *stop.borrow() {
            info!("verifier stopping");
            return;
        }

        match pot.is_self_validator() {
            Ok(true) => {}
            Ok(false) => {
                tokio::select! {
                    _ = tokio::time::sleep(NOT_VALIDATOR_SLEEP) => {}
                    _ = stop.changed() => {}
                }
                continue;
            }
            Err(e) => {
                error!(%e, "validator check failed");
                tokio::time::sleep(IDLE_SLEEP).await;
                continue;
            }
        }

        let candidates = match pick_candidates(&pot) {
            Ok(ids) => ids,
            Err(e) => {
                error!(%e, "pending pool read failed");
                tokio::time::sleep(IDLE_SLEEP).await;
                continue;
            }
        };
        if candidates.is_empty() {
            tokio::select! {
                _ = tokio::time::sleep(IDLE_SLEEP) => {}
                _ = stop.changed() => {}
            }
            continue;
        }

        // The pool can move between listing and the pick.
        let mut picked = None;
        for id in candidates {
            if let Ok(Some(entry)) = pot.pending.find(&id) {
                picked = Some((id, entry));
                break;
            }
        }
        let Some((id, entry)) = picked else { continue };

        debug!(tx = %id.simple(), "verifying transaction");
        let result = match verify_transaction(&pot, &entry) {
            Ok(result) => result,
            Err(e) => {
                error!(tx = %id.simple(), %e, "verification failed");
                continue;
            }
        };
        info!(tx = %id.simple(), result, "transaction verified");

        let self_node = pot.self_node();
        if let Err(e) = pot.add_transaction_verification_result(id, &self_node, result).await {
            error!(tx = %id.simple(), %e, "recording own vote failed");
            continue;
        }
        broadcast_vote(&pot, &id, result).await;
    }
}

async fn broadcast_vote(pot: &Pot, id: &Uuid, result: bool) {
    let Ok(nodes) = pot.validator_nodes() else { return };
    for node in nodes {
        if node.identifier == pot.keystore.identifier {
            continue;
        }
        if let Err(e) =
            pot.client.send_verify_result(&node.host, node.port, id, result, None).await
        {
            error!(peer = %node.identifier.simple(), %e, "vote broadcast failed");
        }
    }
}
