use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::schema::{Channel, Subscription};

pub const MAINNET_WS_URL: &str = "wss://api.hyperliquid.xyz/ws";
pub const TESTNET_WS_URL: &str = "wss://api.hyperliquid-testnet.xyz/ws";

/// Environment variable naming the JSON config file.
pub const CONFIG_PATH_ENV: &str = "HL_ARCHIVER_CONFIG";

// ------------------------------------------------------------
// Root configuration
// ------------------------------------------------------------
//
// Loaded from `config.json` (optional) and then overridden by the
// process environment / `.env`.
//
// It defines:
// - Which network to connect to
// - Where data is stored
// - Reconnect and heartbeat behaviour
// - What to subscribe to
// - Periodic monitor / metrics cadence
//
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// MAINNET or TESTNET
    pub network: Network,

    /// Explicit websocket URL; wins over `network` when set
    pub ws_url: Option<String>,

    /// Root of the archived file tree
    pub data_dir: PathBuf,

    /// error | warn | info | debug | trace
    pub log_level: String,

    pub reconnect: ReconnectConfig,

    pub subscriptions: SubscriptionConfig,

    pub monitor: MonitorConfig,

    /// Optional debug configuration
    pub debug: Option<DebugConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: Network::Mainnet,
            ws_url: None,
            data_dir: PathBuf::from("./data"),
            log_level: "info".to_string(),
            reconnect: ReconnectConfig::default(),
            subscriptions: SubscriptionConfig::default(),
            monitor: MonitorConfig::default(),
            debug: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Network {
    Mainnet,
    Testnet,
}

// ------------------------------------------------------------
// Reconnect configuration
// ------------------------------------------------------------
//
// Delay before attempt `a` is `base_delay_ms * 2^(a-1)`.
//
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ReconnectConfig {
    pub base_delay_ms: u64,

    /// Retries after this many consecutive failures are abandoned
    pub max_attempts: u32,

    /// Application-level ping cadence while connected
    pub ping_interval_secs: u64,

    /// Re-send every active subscription after a reconnect
    pub resubscribe_on_reconnect: bool,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_attempts: 10,
            ping_interval_secs: 50,
            resubscribe_on_reconnect: true,
        }
    }
}

// ------------------------------------------------------------
// Subscription plan
// ------------------------------------------------------------
//
// Expanded into concrete `Subscription`s at startup.
//
// Pacing delays space out subscribe requests so a large plan does not
// trip the venue's rate limit.
//
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SubscriptionConfig {
    pub all_mids: bool,
    pub notification: bool,

    /// Coins for trades + l2Book (+ candles)
    pub coins: Vec<String>,

    /// Candle intervals per coin, e.g. "1m", "1h"
    pub candle_intervals: Vec<String>,

    /// Wallet addresses for the per-user channels
    pub users: Vec<String>,

    pub pacing_ms: u64,
    pub candle_pacing_ms: u64,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            all_mids: true,
            notification: true,
            coins: vec!["BTC".to_string()],
            candle_intervals: Vec::new(),
            users: Vec::new(),
            pacing_ms: 1000,
            candle_pacing_ms: 500,
        }
    }
}

impl SubscriptionConfig {
    /// Expands the plan into subscriptions, each paired with the pause to
    /// observe after sending it.
    pub fn plan(&self) -> Vec<(Subscription, Duration)> {
        let none = Duration::ZERO;
        let pace = Duration::from_millis(self.pacing_ms);
        let candle_pace = Duration::from_millis(self.candle_pacing_ms);

        let mut plan = Vec::new();
        if self.all_mids {
            plan.push((Subscription::all_mids(), none));
        }
        if self.notification {
            plan.push((Subscription::notification(), none));
        }

        for coin in &self.coins {
            plan.push((Subscription::trades(coin), pace));
            plan.push((Subscription::l2_book(coin), pace));
            for interval in &self.candle_intervals {
                plan.push((Subscription::candle(coin, interval), candle_pace));
            }
        }

        for user in &self.users {
            for channel in [
                Channel::UserEvents,
                Channel::UserFills,
                Channel::UserFundings,
                Channel::UserNonFundingLedgerUpdates,
            ] {
                plan.push((Subscription::for_user(channel, user), pace));
            }
        }

        plan
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MonitorConfig {
    /// Storage snapshot cadence; 0 disables the monitor
    pub interval_minutes: u64,

    /// Runtime counter report cadence; 0 disables the report
    pub metrics_interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 60,
            metrics_interval_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DebugConfig {
    /// Log every raw inbound frame at trace level
    pub frames: Option<bool>,
}

impl Config {
    /// Effective websocket endpoint.
    pub fn endpoint(&self) -> &str {
        match (&self.ws_url, self.network) {
            (Some(url), _) => url,
            (None, Network::Mainnet) => MAINNET_WS_URL,
            (None, Network::Testnet) => TESTNET_WS_URL,
        }
    }

    pub fn log_frames(&self) -> bool {
        self.debug
            .as_ref()
            .and_then(|d| d.frames)
            .unwrap_or(false)
    }

    /// Applies environment overrides on top of the file values.
    ///
    /// Recognised keys:
    /// - NETWORK (MAINNET | TESTNET)
    /// - MAINNET_WS_URL / TESTNET_WS_URL (URL for the selected network)
    /// - DATA_DIR
    /// - LOG_LEVEL
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(network) = lookup("NETWORK") {
            self.network = match network.trim().to_ascii_uppercase().as_str() {
                "TESTNET" => Network::Testnet,
                _ => Network::Mainnet,
            };
        }

        let url_key = match self.network {
            Network::Mainnet => "MAINNET_WS_URL",
            Network::Testnet => "TESTNET_WS_URL",
        };
        if let Some(url) = lookup(url_key).filter(|u| !u.trim().is_empty()) {
            self.ws_url = Some(url);
        }

        if let Some(dir) = lookup("DATA_DIR").filter(|d| !d.trim().is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }

        if let Some(level) = lookup("LOG_LEVEL").filter(|l| !l.trim().is_empty()) {
            self.log_level = level.trim().to_ascii_lowercase();
        }
    }
}

/// Loads configuration.
///
/// Order:
/// 1. `.env` (if present) is merged into the process environment
/// 2. the JSON file at `path` (if present) is parsed
/// 3. environment overrides are applied
///
/// A missing file yields defaults; a malformed file is an error.
pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<Config> {
    let _ = dotenvy::dotenv();

    let path = path.as_ref();
    let mut cfg = if path.exists() {
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?
    } else {
        Config::default()
    };

    cfg.apply_env(|key| env::var(key).ok());
    Ok(cfg)
}

/// Config file path from `HL_ARCHIVER_CONFIG`, default `config.json`.
pub fn config_path() -> PathBuf {
    env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_point_at_mainnet() {
        let cfg = Config::default();
        assert_eq!(cfg.endpoint(), MAINNET_WS_URL);
        assert_eq!(cfg.reconnect.max_attempts, 10);
        assert_eq!(cfg.reconnect.base_delay_ms, 1000);
    }

    #[test]
    fn env_overrides_network_url_and_dirs() {
        let mut cfg = Config::default();
        cfg.apply_env(env_of(&[
            ("NETWORK", "testnet"),
            ("TESTNET_WS_URL", "ws://127.0.0.1:9000/ws"),
            ("DATA_DIR", "/var/lib/hl"),
            ("LOG_LEVEL", "DEBUG"),
        ]));

        assert_eq!(cfg.network, Network::Testnet);
        assert_eq!(cfg.endpoint(), "ws://127.0.0.1:9000/ws");
        assert_eq!(cfg.data_dir, PathBuf::from("/var/lib/hl"));
        assert_eq!(cfg.log_level, "debug");
    }

    #[test]
    fn testnet_without_url_uses_builtin_endpoint() {
        let mut cfg = Config::default();
        cfg.apply_env(env_of(&[("NETWORK", "TESTNET"), ("MAINNET_WS_URL", "ws://ignored")]));
        assert_eq!(cfg.endpoint(), TESTNET_WS_URL);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: Config = serde_json::from_str(
            r#"{"subscriptions": {"coins": ["ETH"], "candle_intervals": ["1m"]}}"#,
        )
        .unwrap();
        assert!(cfg.subscriptions.all_mids);
        assert_eq!(cfg.monitor.interval_minutes, 60);

        let plan: Vec<String> = cfg
            .subscriptions
            .plan()
            .into_iter()
            .map(|(s, _)| s.to_string())
            .collect();
        assert_eq!(
            plan,
            vec!["allMids", "notification", "trades:ETH", "l2Book:ETH", "candle:ETH:1m"]
        );
    }

    #[test]
    fn users_expand_to_four_channels() {
        let cfg = SubscriptionConfig {
            all_mids: false,
            notification: false,
            coins: Vec::new(),
            users: vec!["0xabc".into()],
            ..SubscriptionConfig::default()
        };
        let plan = cfg.plan();
        assert_eq!(plan.len(), 4);
        assert!(plan.iter().all(|(s, _)| s.user.as_deref() == Some("0xabc")));
    }

    #[test]
    fn load_config_without_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(dir.path().join("missing.json")).unwrap();
        assert_eq!(cfg.subscriptions.coins, vec!["BTC".to_string()]);
    }
}
