use std::time::Duration;

use log::{debug, error, info};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::metrics::METRICS;
use crate::storage::StorageEngine;

// ------------------------------------------------------------
// Storage monitor
// ------------------------------------------------------------
//
// Periodically walks the data root and logs how big the archive is:
// the total at info level, each category at debug level.
//
// The first snapshot is taken immediately. The monitor only reads;
// it never writes to the ledger.
//

/// Spawns the storage monitor. Returns `None` when disabled (interval 0).
pub fn spawn_storage_monitor(storage: StorageEngine, interval_minutes: u64) -> Option<JoinHandle<()>> {
    if interval_minutes == 0 {
        info!("Storage monitor disabled");
        return None;
    }

    info!(
        "Starting storage monitor task with interval of {} minutes",
        interval_minutes
    );

    let period = Duration::from_secs(interval_minutes.saturating_mul(60));
    Some(tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            log_storage_snapshot(&storage);
        }
    }))
}

pub fn log_storage_snapshot(storage: &StorageEngine) {
    debug!("Updating storage size information");

    match storage.current_size_snapshot() {
        Ok(snapshot) => {
            info!(
                "Total storage size: {:.2} MB ({} bytes)",
                snapshot.total.megabytes, snapshot.total.bytes
            );
            for (name, info) in &snapshot.by_category {
                debug!(
                    "Storage size for {}: {:.2} MB ({} bytes)",
                    name, info.megabytes, info.bytes
                );
            }
        }
        Err(e) => error!("Error updating storage size information: {}", e),
    }
}

// ------------------------------------------------------------
// Metrics reporter (periodic, low-noise)
// ------------------------------------------------------------

pub fn spawn_metrics_reporter(interval_secs: u64) -> Option<JoinHandle<()>> {
    if interval_secs == 0 {
        return None;
    }

    let period = Duration::from_secs(interval_secs);
    Some(tokio::spawn(async move {
        let mut ticker = interval(period);
        // First tick completes immediately; skip it so the first report
        // covers a full period.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            info!("[METRICS] {}", METRICS.summary());
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zero_interval_disables_tasks() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = StorageEngine::open(tmp.path()).unwrap();
        assert!(spawn_storage_monitor(storage, 0).is_none());
        assert!(spawn_metrics_reporter(0).is_none());
    }

    #[tokio::test]
    async fn monitor_runs_until_aborted() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = StorageEngine::open(tmp.path()).unwrap();

        let handle = spawn_storage_monitor(storage, 60).unwrap();
        tokio::task::yield_now().await;
        assert!(!handle.is_finished());

        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
    }

    #[test]
    fn snapshot_logging_tolerates_missing_root() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = StorageEngine::open(tmp.path().join("data")).unwrap();
        std::fs::remove_dir_all(tmp.path().join("data")).unwrap();
        log_storage_snapshot(&storage);
    }
}
