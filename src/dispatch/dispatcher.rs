use std::collections::{HashMap, HashSet};
use std::time::Duration;

use log::{debug, error, info, trace, warn};
use serde_json::Value;

use super::handler::{erase, ChannelPayload, ErasedHandler};
use crate::connection::{ConnectionHandle, FrameSink};
use crate::metrics::{RuntimeMetrics, METRICS};
use crate::schema::{
    Channel, Frame, Method, Subscription, SubscriptionMessage, PONG, SUBSCRIPTION_RESPONSE,
};

/// What `route` did with a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Echo of a subscribe/unsubscribe request
    Acknowledged,
    /// Heartbeat reply
    Pong,
    /// Handed to the channel's handler
    Delivered(Channel),
    /// Known channel, nothing registered
    NoHandler(Channel),
    /// Channel name outside the known set
    UnknownChannel(String),
    /// Payload lacks the key its channel is filed under
    PayloadMismatch(Channel),
    /// Not a `{channel, data}` object
    Malformed,
}

/// Subscription bookkeeping plus channel → handler routing.
///
/// RESPONSIBILITIES:
/// - Turn subscribe/unsubscribe intents into wire messages
/// - Remember the active subscription set (for replay after reconnect)
/// - Route inbound frames to exactly one handler per channel
///
/// NOT RESPONSIBLE FOR:
/// - Acknowledgement tracking (responses are logged only)
/// - Deciding where data is stored
pub struct Dispatcher {
    connection: ConnectionHandle,
    subscriptions: HashSet<Subscription>,
    handlers: HashMap<Channel, Box<dyn ErasedHandler>>,
    resubscribe_on_reconnect: bool,
}

impl Dispatcher {
    pub fn new(connection: ConnectionHandle) -> Self {
        Self {
            connection,
            subscriptions: HashSet::new(),
            handlers: HashMap::new(),
            resubscribe_on_reconnect: true,
        }
    }

    pub fn with_resubscribe(mut self, enabled: bool) -> Self {
        self.resubscribe_on_reconnect = enabled;
        self
    }

    /// Records the intent and sends the subscribe request.
    ///
    /// Returns whether the request reached the socket. The intent is kept
    /// either way, so a replay after reconnect will cover it.
    pub fn subscribe(&mut self, subscription: Subscription) -> bool {
        info!("Subscribing to {}", subscription);
        let sent = self.send_request(Method::Subscribe, &subscription);
        self.subscriptions.insert(subscription);
        sent
    }

    /// Records the intent without sending anything.
    ///
    /// For plans sent by [`send_paced`] while `run` owns the dispatcher.
    /// Returns `false` if the subscription was already tracked.
    pub fn track(&mut self, subscription: Subscription) -> bool {
        self.subscriptions.insert(subscription)
    }

    pub fn unsubscribe(&mut self, subscription: &Subscription) -> bool {
        info!("Unsubscribing from {}", subscription);
        self.subscriptions.remove(subscription);
        self.send_request(Method::Unsubscribe, subscription)
    }

    fn send_request(&self, method: Method, subscription: &Subscription) -> bool {
        let request = SubscriptionMessage {
            method,
            subscription: subscription.clone(),
        };
        let sent = self.connection.send(&request);
        if sent {
            RuntimeMetrics::bump(&METRICS.subscriptions_sent);
        }
        sent
    }

    /// Re-sends every active subscription. Returns how many reached the
    /// socket.
    pub fn replay_subscriptions(&self) -> usize {
        info!("Replaying {} subscriptions", self.subscriptions.len());
        self.subscriptions
            .iter()
            .filter(|sub| self.send_request(Method::Subscribe, sub))
            .count()
    }

    pub fn is_subscribed(&self, subscription: &Subscription) -> bool {
        self.subscriptions.contains(subscription)
    }

    pub fn active_subscriptions(&self) -> impl Iterator<Item = &Subscription> {
        self.subscriptions.iter()
    }

    /// Installs the handler for `T`'s channel, replacing any previous one.
    ///
    /// The handler receives the decoded view and the frame's `data`
    /// untouched.
    pub fn register_handler<T, F>(&mut self, handler: F)
    where
        T: ChannelPayload,
        F: FnMut(T, Value) + Send + 'static,
    {
        if self.handlers.insert(T::CHANNEL, erase(handler)).is_some() {
            debug!("Replaced handler for channel: {}", T::CHANNEL);
        } else {
            debug!("Registered handler for channel: {}", T::CHANNEL);
        }
    }

    pub fn unregister_handler(&mut self, channel: Channel) -> bool {
        let removed = self.handlers.remove(&channel).is_some();
        if removed {
            debug!("Unregistered handler for channel: {}", channel);
        }
        removed
    }

    pub fn has_handler(&self, channel: Channel) -> bool {
        self.handlers.contains_key(&channel)
    }

    /// Routes one decoded frame.
    ///
    /// Never fails: every outcome other than `Delivered` is logged and the
    /// frame is dropped. A bad payload only costs that one message.
    pub fn route(&mut self, frame: Value) -> RouteOutcome {
        let frame: Frame = match serde_json::from_value(frame) {
            Ok(frame) => frame,
            Err(e) => {
                RuntimeMetrics::bump(&METRICS.frames_unrouted);
                warn!("Dropping frame without a channel: {}", e);
                return RouteOutcome::Malformed;
            }
        };

        match frame.channel.as_str() {
            SUBSCRIPTION_RESPONSE => {
                info!("Subscription response {}", frame.data);
                return RouteOutcome::Acknowledged;
            }
            PONG => {
                trace!("pong");
                return RouteOutcome::Pong;
            }
            _ => {}
        }

        let channel = match frame.channel.parse::<Channel>() {
            Ok(channel) => channel,
            Err(_) => {
                RuntimeMetrics::bump(&METRICS.frames_unrouted);
                debug!("No handler for channel: {}", frame.channel);
                return RouteOutcome::UnknownChannel(frame.channel);
            }
        };

        let Some(handler) = self.handlers.get_mut(&channel) else {
            RuntimeMetrics::bump(&METRICS.frames_unrouted);
            debug!("No handler for channel: {}", channel);
            return RouteOutcome::NoHandler(channel);
        };

        match handler.call(frame.data) {
            Ok(()) => RouteOutcome::Delivered(channel),
            Err(e) => {
                RuntimeMetrics::bump(&METRICS.payload_mismatches);
                error!("Payload on channel {} has no usable key: {}", channel, e);
                RouteOutcome::PayloadMismatch(channel)
            }
        }
    }
}

/// Sends subscribe requests one by one, pausing after each.
///
/// Runs beside `ConnectionManager::run` so the pauses actually space the
/// requests out on the wire. Requests that find the socket down are
/// dropped; a tracked intent is covered by the replay after reconnect.
pub async fn send_paced(connection: ConnectionHandle, plan: Vec<(Subscription, Duration)>) -> usize {
    let mut sent = 0;
    for (subscription, pause) in plan {
        info!("Subscribing to {}", subscription);
        let request = SubscriptionMessage {
            method: Method::Subscribe,
            subscription,
        };
        if connection.send(&request) {
            RuntimeMetrics::bump(&METRICS.subscriptions_sent);
            sent += 1;
        }
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }
    sent
}

impl FrameSink for Dispatcher {
    fn on_frame(&mut self, frame: Value) {
        self.route(frame);
    }

    fn on_reconnected(&mut self) {
        if self.resubscribe_on_reconnect {
            self.replay_subscriptions();
        }
    }
}
