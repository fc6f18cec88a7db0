#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Potchain node entrypoint.
//! Bootstraps against the genesis peer, then serves the peer API and runs
//! the verifier, block-maker, agreement, dump, and scenario workers.

use potchain::core::consensus::engine::Pot;
use potchain::core::consensus::{agreement, block_maker, verifier};
use potchain::core::types::NodeConfig;
use potchain::networking::{api, dumper, scenario};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

fn env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(env("LOG_LEVEL", "info"))
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .compact()
        .try_init();

    let cfg = NodeConfig::from_env();
    info!(host = %cfg.host, port = cfg.port, storage = %cfg.storage_dir, "potchain node starting");

    let pot = match Pot::new(cfg.clone()) {
        Ok(pot) => Arc::new(pot),
        Err(e) => {
            eprintln!("engine init failed: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = pot.bootstrap(false).await {
        error!(%e, "bootstrap failed; continuing from local state");
    }

    let (stop_tx, stop_rx) = watch::channel(false);

    let workers = vec![
        tokio::spawn(verifier::run(pot.clone(), stop_rx.clone())),
        tokio::spawn(block_maker::run(pot.clone(), stop_rx.clone())),
        tokio::spawn(agreement::run(pot.clone(), stop_rx.clone())),
        tokio::spawn(dumper::run(Arc::new(cfg.clone()), stop_rx.clone())),
        tokio::spawn(scenario::run(pot.clone(), stop_rx.clone())),
    ];

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("cannot bind {addr}: {e}");
            std::process::exit(1);
        }
    };
    info!(%addr, "listening");

    let app = api::router(pot.clone());
    let serve = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(%e, "failed to install ctrl-c handler");
        }
        info!("shutting down");
        let _ = stop_tx.send(true);
    });

    if let Err(e) = serve.await {
        error!(%e, "server error");
    }
    for worker in workers {
        if let Err(e) = worker.await {
            warn!(%e, "worker join failed");
        }
    }
}
