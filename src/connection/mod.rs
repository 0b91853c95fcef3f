//! Connection module
//!
//! Owns the single websocket to the venue:
//! - establishing it (with exponential backoff)
//! - detecting loss and reconnecting
//! - keeping it alive with application-level pings
//! - handing decoded inbound frames to a `FrameSink`
//!
//! Routing and persistence do not live here; the sink decides what a
//! frame means.

pub mod backoff;
pub mod manager;

use serde_json::Value;

pub use backoff::Backoff;
pub use manager::{
    ConnectionError, ConnectionHandle, ConnectionManager, ConnectionSettings, ConnectionState,
    SessionEnd,
};

/// Consumer of decoded inbound frames.
///
/// Frames arrive one at a time, in order. The manager does not read the
/// next frame until `on_frame` returns.
pub trait FrameSink {
    fn on_frame(&mut self, frame: Value);

    /// Called after `run` has (re)established the transport on its own,
    /// i.e. after a loss, before any frame of the new session.
    fn on_reconnected(&mut self) {}
}
