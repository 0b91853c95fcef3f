use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;

/// Global runtime counters for the archiver.
///
/// Purpose:
/// - Track connection churn
/// - Track inbound throughput and what happened to each frame
/// - Track persistence outcomes
///
/// Design:
/// - Lock-free (Atomics)
/// - Safe to bump from any task
#[derive(Default)]
pub struct RuntimeMetrics {
    // Connection
    pub connects: AtomicUsize,
    pub reconnects: AtomicUsize,
    pub sends_dropped: AtomicUsize,

    // Inbound
    pub frames_received: AtomicUsize,
    pub decode_errors: AtomicUsize,
    pub frames_unrouted: AtomicUsize,
    pub payload_mismatches: AtomicUsize,

    // Storage
    pub events_persisted: AtomicUsize,
    pub persist_errors: AtomicUsize,

    // Subscriptions
    pub subscriptions_sent: AtomicUsize,
}

impl RuntimeMetrics {
    pub fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// One-line summary used by the periodic reporter.
    pub fn summary(&self) -> String {
        let get = |c: &AtomicUsize| c.load(Ordering::Relaxed);
        format!(
            "connects={} reconnects={} recv={} decode_err={} unrouted={} mismatched={} persisted={} persist_err={} subs={} send_dropped={}",
            get(&self.connects),
            get(&self.reconnects),
            get(&self.frames_received),
            get(&self.decode_errors),
            get(&self.frames_unrouted),
            get(&self.payload_mismatches),
            get(&self.events_persisted),
            get(&self.persist_errors),
            get(&self.subscriptions_sent),
            get(&self.sends_dropped),
        )
    }
}

/// Global metrics registry (singleton)
pub static METRICS: Lazy<Arc<RuntimeMetrics>> =
    Lazy::new(|| Arc::new(RuntimeMetrics::default()));
