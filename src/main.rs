// ------------------------------------------------------------
// External dependencies
// ------------------------------------------------------------

use anyhow::{anyhow, bail, Context};
use log::{error, info, warn};
use rustls::crypto::{ring, CryptoProvider};

use hl_archiver::archiver::Archiver;
use hl_archiver::config::{config_path, load_config, Config};
use hl_archiver::connection::{
    ConnectionError, ConnectionManager, ConnectionSettings, SessionEnd,
};
use hl_archiver::dispatch::{send_paced, Dispatcher};
use hl_archiver::logging;
use hl_archiver::metrics::METRICS;
use hl_archiver::monitor::{spawn_metrics_reporter, spawn_storage_monitor};
use hl_archiver::storage::StorageEngine;

use std::time::Duration;

// ------------------------------------------------------------
// Application entry point
// ------------------------------------------------------------
//
// This is the main runtime for the Hyperliquid market-data archiver.
//
// Responsibilities:
// - Initialize cryptography backend (rustls)
// - Load configuration and start logging
// - Wire storage → archiver → dispatcher → connection
// - Send the subscription plan
// - Run until closed (Ctrl-C) or reconnects are exhausted
//
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --------------------------------------------------------
    // IMPORTANT:
    // rustls >= 0.23 requires an explicit CryptoProvider
    // installation. This must be executed exactly once and
    // as early as possible in the process lifecycle.
    // --------------------------------------------------------
    CryptoProvider::install_default(ring::default_provider())
        .map_err(|_| anyhow!("failed to install rustls CryptoProvider"))?;

    let config: Config = load_config(config_path())?;
    logging::init(&config.log_level, &config.data_dir)?;

    info!("Starting Hyperliquid archiver on {}", config.endpoint());

    // --------------------------------------------------------
    // Storage and persistence handlers
    // --------------------------------------------------------
    let storage = StorageEngine::open(&config.data_dir)
        .with_context(|| format!("opening data directory {}", config.data_dir.display()))?;
    let archiver = Archiver::new(storage.clone());

    // --------------------------------------------------------
    // Connection + dispatcher
    // --------------------------------------------------------
    let (mut manager, handle) = ConnectionManager::new(ConnectionSettings {
        url: config.endpoint().to_string(),
        base_delay: Duration::from_millis(config.reconnect.base_delay_ms),
        max_attempts: config.reconnect.max_attempts,
        ping_interval: Duration::from_secs(config.reconnect.ping_interval_secs.max(1)),
        log_frames: config.log_frames(),
    });

    let mut dispatcher =
        Dispatcher::new(handle.clone()).with_resubscribe(config.reconnect.resubscribe_on_reconnect);
    archiver.install(&mut dispatcher);

    // --------------------------------------------------------
    // Background tasks
    // --------------------------------------------------------
    spawn_storage_monitor(storage, config.monitor.interval_minutes);
    spawn_metrics_reporter(config.monitor.metrics_interval_secs);

    let shutdown = handle.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutting down...");
                shutdown.shutdown().await;
            }
            Err(e) => warn!("Could not listen for Ctrl-C: {}", e),
        }
    });

    // --------------------------------------------------------
    // Connect, then subscribe
    //
    // The plan is tracked up front so a reconnect in the middle
    // of it still replays everything.
    // --------------------------------------------------------
    match manager.establish().await {
        Ok(()) => {}
        Err(ConnectionError::Closed) => {
            info!("Archiver stopped before connecting");
            return Ok(());
        }
        Err(e) => {
            error!("Failed to connect: {}", e);
            bail!(e);
        }
    }

    let plan = config.subscriptions.plan();
    for (subscription, _) in &plan {
        dispatcher.track(subscription.clone());
    }
    let pacer = tokio::spawn(send_paced(handle.clone(), plan));

    let end = manager.run(&mut dispatcher).await;
    pacer.abort();

    info!("[METRICS] {}", METRICS.summary());

    match end {
        SessionEnd::Closed => {
            info!("Archiver stopped");
            Ok(())
        }
        SessionEnd::Failed => bail!(
            "giving up after {} reconnect attempts",
            config.reconnect.max_attempts
        ),
    }
}
