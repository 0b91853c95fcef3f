//! Subscription and routing layer.
//!
//! This module provides:
//! - The `Dispatcher`, which owns the active subscription set and the
//!   channel → handler table
//! - The `ChannelPayload` trait tying each key view to its channel
//!
//! Handlers are plain closures taking a typed key view and the frame's
//! `data` exactly as received.

pub mod dispatcher;
pub mod handler;

pub use dispatcher::{send_paced, Dispatcher, RouteOutcome};
pub use handler::ChannelPayload;
