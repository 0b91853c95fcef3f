// ------------------------------------------------------------
// Module declarations
// ------------------------------------------------------------
//
// Each module represents a well-defined responsibility:
//
// - config:     Configuration loaded from JSON + environment overrides
// - schema:     Channels, subscriptions and payload key views
// - util:       Shared helpers (timestamps, byte units, path segments)
// - metrics:    Global lock-free runtime counters
// - logging:    env_logger setup (stderr + daily log file)
// - connection: Websocket lifecycle, backoff and heartbeat
// - dispatch:   Subscription set and channel → handler routing
// - storage:    Category-partitioned file store and size ledger
// - archiver:   Per-channel handlers that persist payloads
// - monitor:    Periodic storage snapshot and metrics report
// - report:     Growth statistics and tables for `storage-stats`
// - cleanup:    File removal for `clear-data`
//
pub mod archiver;
pub mod cleanup;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod logging;
pub mod metrics;
pub mod monitor;
pub mod report;
pub mod schema;
pub mod storage;
pub mod util;
