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

//! Periodic committee re-election on validators.
//!
//! One loop drives both sides of the protocol: a validator with no open
//! round and a stale `last_success` starts one as leader; a validator with
//! an open round it has not voted on evaluates the proposal and votes.

use crate::core::consensus::engine::{Pot, AGREEMENT_INTERVAL_SECS};
use crate::core::types::{now_unix, PotError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Loop period.
const TICK: Duration = Duration::from_secs(30);

async fn tick(pot: &Pot) -> Result<(), PotError> {
    if !pot.is_self_validator()? {
        return Ok(());
    }
    let self_id = pot.keystore.identifier;

    if pot.agreement.is_started()? {
        let proposal = pot.agreement.proposed_list()?;
        if proposal.is_empty() {
            // A failed round passed leadership to us; re-propose.
            if pot.agreement.leader()? == Some(self_id) {
                info!("retrying agreement as new leader");
                pot.start_agreement_round().await?;
            }
            return Ok(());
        }
        if pot.agreement.has_vote(&self_id)? {
            // A leader that missed the closing vote gossip finishes here.
            if pot.agreement.leader()? == Some(self_id)
                && pot.agreement.votes()?.len() == pot.validators.len()?
            {
                pot.validator_agreement_end().await?;
            }
            return Ok(());
        }
        let result = pot.evaluate_agreement_proposal()?;
        info!(result, "voting on proposed committee");
        pot.record_agreement_vote(self_id, result).await?;
        pot.send_agreement_vote(result).await;
        return Ok(());
    }

    let votes_open = !pot.agreement.votes()?.is_empty();
    let stale =
        pot.agreement.last_success()?.saturating_add(AGREEMENT_INTERVAL_SECS) <= now_unix();
    if !votes_open && stale {
        info!("starting agreement round");
        pot.start_agreement_round().await?;
    }
    Ok(())
}

/// The agreement loop; exits when the stop flag flips.
pub async fn run(pot: Arc<Pot>, mut stop: watch::Receiver<bool>) {
    debug!("agreement worker started");
    loop {
        tokio::select! {
            _ = tokio::time::sleep(TICK) => {}
            _ = stop.changed() => {}
        }
        if *stop.borrow() {
            info!("agreement worker stopping");
            return;
        }
        if let Err(e) = tick(&pot).await {
            error!(%e, "agreement tick failed");
        }
    }
}
