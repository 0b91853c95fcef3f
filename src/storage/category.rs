use std::fmt;
use std::path::PathBuf;

use crate::util::sanitize_segment;

/// Category names for the four `userEvents` variants, which are stored
/// side by side rather than under a common `userEvents` directory.
pub const USER_EVENTS_FILLS: &str = "userEventsFills";
pub const USER_EVENTS_FUNDING: &str = "userEventsFunding";
pub const USER_EVENTS_LIQUIDATION: &str = "userEventsLiquidation";
pub const USER_EVENTS_NON_USER_CANCEL: &str = "userEventsNonUserCancel";

pub const CANDLE: &str = "candle";

/// Ordered path segments identifying where an event is written and
/// under which label its size is tracked.
///
/// Shapes:
/// - `[kind]`                    allMids, notification, userEvents*
/// - `[kind, coin]`              trades, l2Book
/// - `[kind, user]`              userFills, userFundings, userNonFundingLedgerUpdates
/// - `[candle, coin, interval]`  candle
///
/// The reporting tools rely on this ordering; do not reorder segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CategoryKey {
    segments: Vec<String>,
}

impl CategoryKey {
    pub fn kind(kind: &str) -> Self {
        Self {
            segments: vec![sanitize_segment(kind)],
        }
    }

    pub fn with_coin(kind: &str, coin: &str) -> Self {
        Self {
            segments: vec![sanitize_segment(kind), sanitize_segment(coin)],
        }
    }

    pub fn with_user(kind: &str, user: &str) -> Self {
        Self {
            segments: vec![sanitize_segment(kind), sanitize_segment(user)],
        }
    }

    pub fn candle(coin: &str, interval: &str) -> Self {
        Self {
            segments: vec![
                CANDLE.to_string(),
                sanitize_segment(coin),
                sanitize_segment(interval),
            ],
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Path relative to the data root.
    pub fn relative_path(&self) -> PathBuf {
        self.segments.iter().collect()
    }

    /// Label stored in the size ledger, e.g. `candle/BTC/1m`.
    pub fn label(&self) -> String {
        self.segments.join("/")
    }
}

impl fmt::Display for CategoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}
