// Copyright (c) 2026 Potchain
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

//! Periodic storage snapshots for offline analysis.
//!
//! Copies every state file into `DUMP_DIR/<unix-ts>/` once per second.
//! External tooling reads these; the node never does.

use crate::core::types::{now_unix, NodeConfig};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Snapshot period.
const TICK: Duration = Duration::from_secs(1);

fn dump_once(storage_dir: &str, dump_dir: &str) -> std::io::Result<()> {
    let target = Path::new(dump_dir).join(now_unix().to_string());
    if target.exists() {
        return Ok(());
    }
    std::fs::create_dir_all(&target)?;
    for entry in std::fs::read_dir(storage_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            std::fs::copy(entry.path(), target.join(entry.file_name()))?;
        }
    }
    Ok(())
}

/// The dump loop; inert unless `DUMP_DIR` is configured.
pub async fn run(cfg: Arc<NodeConfig>, mut stop: watch::Receiver<bool>) {
    let Some(dump_dir) = cfg.dump_dir.clone() else { return };
    if let Err(e) = std::fs::create_dir_all(&dump_dir) {
        error!(%e, "cannot create dump directory");
        return;
    }
    debug!(dir = %dump_dir, "dumper started");
    loop {
        tokio::select! {
            _ = tokio::time::sleep(TICK) => {}
            _ = stop.changed() => {}
        }
        if *stop.borrow() {
            info!("dumper stopping");
            return;
        }
        if let Err(e) = dump_once(&cfg.storage_dir, &dump_dir) {
            error!(%e, "storage dump failed");
        }
    }
}
