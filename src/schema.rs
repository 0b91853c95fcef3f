use std::fmt;
use std::str::FromStr;

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ------------------------------------------------------------
// Logical channels
// ------------------------------------------------------------
//
// The closed set of Hyperliquid websocket channels this archiver
// understands. The wire name is the camelCase form, e.g. "l2Book".
//
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Channel {
    AllMids,
    Notification,
    Trades,
    L2Book,
    Candle,
    UserEvents,
    UserFills,
    UserFundings,
    UserNonFundingLedgerUpdates,
}

impl Channel {
    pub const ALL: [Channel; 9] = [
        Channel::AllMids,
        Channel::Notification,
        Channel::Trades,
        Channel::L2Book,
        Channel::Candle,
        Channel::UserEvents,
        Channel::UserFills,
        Channel::UserFundings,
        Channel::UserNonFundingLedgerUpdates,
    ];

    /// Wire name of the channel.
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::AllMids => "allMids",
            Channel::Notification => "notification",
            Channel::Trades => "trades",
            Channel::L2Book => "l2Book",
            Channel::Candle => "candle",
            Channel::UserEvents => "userEvents",
            Channel::UserFills => "userFills",
            Channel::UserFundings => "userFundings",
            Channel::UserNonFundingLedgerUpdates => "userNonFundingLedgerUpdates",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownChannel(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown channel: {0}")]
pub struct UnknownChannel(pub String);

/// Reserved channel echoing a subscribe/unsubscribe request.
pub const SUBSCRIPTION_RESPONSE: &str = "subscriptionResponse";

/// Reply to the heartbeat ping.
pub const PONG: &str = "pong";

// ------------------------------------------------------------
// Subscriptions
// ------------------------------------------------------------

/// One logical stream on the venue.
///
/// Immutable value object; equality and hashing are structural, so a
/// `HashSet<Subscription>` deduplicates identical intents.
///
/// Serialized exactly as the venue expects inside a subscribe message:
/// `{"type": "trades", "coin": "BTC"}` (absent keys are omitted).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(rename = "type")]
    pub channel: Channel,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coin: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
}

impl Subscription {
    fn bare(channel: Channel) -> Self {
        Self {
            channel,
            coin: None,
            user: None,
            interval: None,
        }
    }

    pub fn all_mids() -> Self {
        Self::bare(Channel::AllMids)
    }

    pub fn notification() -> Self {
        Self::bare(Channel::Notification)
    }

    pub fn trades(coin: impl Into<String>) -> Self {
        Self {
            coin: Some(coin.into()),
            ..Self::bare(Channel::Trades)
        }
    }

    pub fn l2_book(coin: impl Into<String>) -> Self {
        Self {
            coin: Some(coin.into()),
            ..Self::bare(Channel::L2Book)
        }
    }

    pub fn candle(coin: impl Into<String>, interval: impl Into<String>) -> Self {
        Self {
            coin: Some(coin.into()),
            interval: Some(interval.into()),
            ..Self::bare(Channel::Candle)
        }
    }

    /// Per-user channels: userEvents, userFills, userFundings,
    /// userNonFundingLedgerUpdates.
    pub fn for_user(channel: Channel, user: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            ..Self::bare(channel)
        }
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.channel)?;
        for part in [&self.coin, &self.user, &self.interval].into_iter().flatten() {
            write!(f, ":{}", part)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Subscribe,
    Unsubscribe,
}

/// Outbound subscribe/unsubscribe request, also echoed back by the
/// venue on the `subscriptionResponse` channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionMessage {
    pub method: Method,
    pub subscription: Subscription,
}

// ------------------------------------------------------------
// Inbound frames
// ------------------------------------------------------------
//
// Every inbound frame looks like {"channel": <name>, "data": <payload>}.
// `data` stays a raw `Value` all the way to disk; the views below only
// pull out what is needed to pick a category.
//
#[derive(Debug, Clone, Deserialize)]
pub struct Frame {
    pub channel: String,

    #[serde(default)]
    pub data: Value,
}

// ------------------------------------------------------------
// Payload key views
// ------------------------------------------------------------
//
// One view per channel. Unknown fields are ignored and field types
// beyond the key are never checked, so a venue-side schema change
// cannot cost an event.
//

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CoinKey {
    pub coin: String,
}

/// allMids is filed under the channel alone; any payload is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct AllMids(pub IgnoredAny);

/// Same as [`AllMids`], for the notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Notification(pub IgnoredAny);

/// A `trades` frame carries a batch of trades for one coin.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Trades(pub Vec<CoinKey>);

impl Trades {
    /// Coin of the first trade; `None` for an empty batch.
    pub fn coin(&self) -> Option<&str> {
        self.0.first().map(|t| t.coin.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct L2Book {
    pub coin: String,
}

/// Candle bars name their coin `s` and their interval `i`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Candle {
    pub s: String,
    pub i: String,
}

/// A `userEvents` frame holds exactly one of four event kinds, keyed by
/// the single top-level field name.
///
/// Only the kind is decoded, plus the length of a fills batch so that
/// empty batches can be skipped.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UserEvent {
    Fills(Vec<IgnoredAny>),
    Funding(IgnoredAny),
    Liquidation(IgnoredAny),
    NonUserCancel(IgnoredAny),
}

impl UserEvent {
    /// Name of the field holding the inner event.
    pub fn field(&self) -> &'static str {
        match self {
            UserEvent::Fills(_) => "fills",
            UserEvent::Funding(_) => "funding",
            UserEvent::Liquidation(_) => "liquidation",
            UserEvent::NonUserCancel(_) => "nonUserCancel",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserFills {
    pub user: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserFundings {
    pub user: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserNonFundingLedgerUpdates {
    pub user: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn channel_wire_names_round_trip_through_from_str() {
        for channel in Channel::ALL {
            assert_eq!(channel.as_str().parse::<Channel>().unwrap(), channel);
            assert_eq!(
                serde_json::to_value(channel).unwrap(),
                json!(channel.as_str())
            );
        }
        assert!("bbo".parse::<Channel>().is_err());
    }

    #[test]
    fn subscribe_message_matches_wire_format() {
        let msg = SubscriptionMessage {
            method: Method::Subscribe,
            subscription: Subscription::candle("BTC", "1m"),
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "method": "subscribe",
                "subscription": {"type": "candle", "coin": "BTC", "interval": "1m"}
            })
        );

        let msg = SubscriptionMessage {
            method: Method::Unsubscribe,
            subscription: Subscription::all_mids(),
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"method": "unsubscribe", "subscription": {"type": "allMids"}})
        );
    }

    #[test]
    fn subscriptions_compare_structurally() {
        assert_eq!(Subscription::trades("BTC"), Subscription::trades("BTC"));
        assert_ne!(Subscription::trades("BTC"), Subscription::l2_book("BTC"));
        assert_eq!(Subscription::candle("ETH", "5m").to_string(), "candle:ETH:5m");
    }

    #[test]
    fn key_views_ignore_everything_but_the_key() {
        let raw = json!({
            "t": 1, "T": 2, "s": "BTC", "i": "1m",
            "o": "100.5", "c": 101, "h": {"odd": true}, "extra": [1, 2]
        });
        let candle: Candle = serde_json::from_value(raw).unwrap();
        assert_eq!(candle, Candle { s: "BTC".into(), i: "1m".into() });

        let trades: Trades =
            serde_json::from_value(json!([{"coin": "ETH", "tid": "1", "px": 3}])).unwrap();
        assert_eq!(trades.coin(), Some("ETH"));
        assert_eq!(Trades(Vec::new()).coin(), None);

        let mids: Result<AllMids, _> = serde_json::from_value(Value::Null);
        assert!(mids.is_ok());
    }

    #[test]
    fn user_event_is_keyed_by_kind() {
        let raw = json!({"nonUserCancel": [{"coin": "ETH", "oid": 9}]});
        let event: UserEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(event, UserEvent::NonUserCancel(IgnoredAny));
        assert_eq!(event.field(), "nonUserCancel");

        let fills: UserEvent = serde_json::from_value(json!({"fills": []})).unwrap();
        assert_eq!(fills, UserEvent::Fills(Vec::new()));

        assert!(serde_json::from_value::<UserEvent>(json!({"twap": {}})).is_err());
    }
}
