use std::marker::PhantomData;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::schema::{
    AllMids, Candle, Channel, L2Book, Notification, Trades, UserEvent, UserFills, UserFundings,
    UserNonFundingLedgerUpdates,
};

/// Typed key view of exactly one channel.
///
/// The view type fixes the channel at compile time, so a handler
/// registered for `Trades` can only ever be installed on, and receive
/// data from, the `trades` channel.
///
/// IMPORTANT:
/// - Adding a channel means adding a `Channel` variant, a view type,
///   and an impl here.
/// - A view decodes only what its handler needs to look at. The handler
///   still gets the full `data` value next to it.
pub trait ChannelPayload: DeserializeOwned + Send + 'static {
    const CHANNEL: Channel;
}

macro_rules! channel_payload {
    ($($payload:ty => $channel:expr),* $(,)?) => {
        $(
            impl ChannelPayload for $payload {
                const CHANNEL: Channel = $channel;
            }
        )*
    };
}

channel_payload! {
    AllMids => Channel::AllMids,
    Notification => Channel::Notification,
    Trades => Channel::Trades,
    L2Book => Channel::L2Book,
    Candle => Channel::Candle,
    UserEvent => Channel::UserEvents,
    UserFills => Channel::UserFills,
    UserFundings => Channel::UserFundings,
    UserNonFundingLedgerUpdates => Channel::UserNonFundingLedgerUpdates,
}

/// Handler with its payload type erased, so handlers for different
/// channels can share one table.
pub(crate) trait ErasedHandler: Send {
    /// Decodes the handler's view from `data` and invokes it with both.
    /// Fails without invoking when the view does not decode.
    fn call(&mut self, data: Value) -> Result<(), serde_json::Error>;
}

struct Typed<T, F> {
    f: F,
    _payload: PhantomData<fn(T)>,
}

impl<T, F> ErasedHandler for Typed<T, F>
where
    T: ChannelPayload,
    F: FnMut(T, Value) + Send,
{
    fn call(&mut self, data: Value) -> Result<(), serde_json::Error> {
        let view: T = Deserialize::deserialize(&data)?;
        (self.f)(view, data);
        Ok(())
    }
}

pub(crate) fn erase<T, F>(f: F) -> Box<dyn ErasedHandler>
where
    T: ChannelPayload,
    F: FnMut(T, Value) + Send + 'static,
{
    Box::new(Typed {
        f,
        _payload: PhantomData,
    })
}
