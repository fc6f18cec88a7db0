// Copyright (c) 2026 Potchain
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

//! Synthetic transaction drivers for simulation runs.
//!
//! `instant_sender` submits well-formed in-range values; `mad_sender`
//! submits values engineered to fall outside the plausibility window.
//! Both exercise the public submission endpoint like any external sensor.

use crate::core::consensus::engine::Pot;
use crate::core::node::Node;
use crate::core::transaction::TxCandidate;
use crate::core::types::now_unix;
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Submission period.
const TICK: Duration = Duration::from_secs(10);

fn pick_target(pot: &Pot) -> Option<Node> {
    let validators = pot.validator_nodes().ok()?;
    let candidates: Vec<Node> = validators
        .into_iter()
        .filter(|n| n.identifier != pot.keystore.identifier)
        .collect();
    candidates.choose(&mut rand::thread_rng()).cloned()
}

async fn submit(pot: &Pot, node: &Node, value: i64) {
    let candidate = TxCandidate::new(json!({ "t": "1", "d": value }), now_unix());
    let sender = pot.keystore.identifier;
    let signature = pot.keystore.sign(&candidate.signing_bytes(&sender));
    let tx = candidate.into_tx(sender, signature);

    let url = format!("http://{}:{}/transaction", node.host, node.port);
    let client = reqwest::Client::new();
    match client.post(&url).body(tx.encode()).send().await {
        Ok(res) if res.status().is_success() => {
            debug!(peer = %node.identifier.simple(), value, "scenario transaction sent");
        }
        Ok(res) => {
            let code = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            error!(code, body = %body, "scenario transaction refused");
        }
        Err(e) => error!(%e, "scenario transaction failed"),
    }
}

/// History-aware outlier: far enough outside the observed spread that the
/// μ ± 2σ check must fail once a baseline exists.
fn outlier_value(history: &[i64]) -> i64 {
    if history.len() < 2 {
        return rand::thread_rng().gen_range(0..=5);
    }
    let n = history.len() as f64;
    let mean = history.iter().map(|v| *v as f64).sum::<f64>() / n;
    let variance = history.iter().map(|v| (*v as f64 - mean).powi(2)).sum::<f64>() / n;
    let spread = variance.sqrt().max(1.0);
    (mean + 5.0 * spread) as i64 + rand::thread_rng().gen_range(1..=10)
}

/// The scenario loop; inert unless `POT_SCENARIOS` names a known driver.
pub async fn run(pot: Arc<Pot>, mut stop: watch::Receiver<bool>) {
    let scenario = pot.cfg.scenarios.first().cloned().unwrap_or_default();
    let mad = match scenario.as_str() {
        "instant_sender" => false,
        "mad_sender" => true,
        _ => return,
    };
    info!(%scenario, "scenario driver started");

    let mut history: Vec<i64> = Vec::new();
    loop {
        tokio::select! {
            _ = tokio::time::sleep(TICK) => {}
            _ = stop.changed() => {}
        }
        if *stop.borrow() {
            info!("scenario driver stopping");
            return;
        }

        let Some(target) = pick_target(&pot) else {
            debug!("no validator to send to yet");
            continue;
        };
        let value = if mad {
            outlier_value(&history)
        } else {
            rand::thread_rng().gen_range(10..=15)
        };
        history.push(value);
        submit(&pot, &target, value).await;
    }
}
