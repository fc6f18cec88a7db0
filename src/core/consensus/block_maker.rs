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

//! Periodic block sealing on validators.

use crate::core::consensus::engine::{Pot, BLOCK_INTERVAL_SECS};
use crate::core::types::now_unix;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Loop period.
const TICK: Duration = Duration::from_secs(10);

/// The block-maker loop; seals when the chain tip is old enough and the
/// verified pool is non-empty.
pub async fn run(pot: Arc<Pot>, mut stop: watch::Receiver<bool>) {
    debug!("block maker started");
    loop {
        tokio::select! {
            _ = tokio::time::sleep(TICK) => {}
            _ = stop.changed() => {}
        }
        if *stop.borrow() {
            info!("block maker stopping");
            return;
        }

        match pot.is_self_validator() {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                error!(%e, "validator check failed");
                continue;
            }
        }

        let due = match (pot.chain.last_block(), pot.verified.is_empty()) {
            (Ok(Some(last)), Ok(false)) => {
                last.timestamp.saturating_add(BLOCK_INTERVAL_SECS) <= now_unix()
            }
            (Ok(Some(_)), Ok(true)) => false,
            (Ok(None), _) => false,
            (Err(e), _) | (_, Err(e)) => {
                error!(%e, "state read failed");
                false
            }
        };
        if !due {
            continue;
        }

        match pot.seal_block().await {
            Ok(block) => {
                info!(hash = %hex::encode(block.hash()), txs = block.transactions.len(), "block sealed")
            }
            Err(e) => error!(%e, "block sealing failed"),
        }
    }
}
