use std::path::PathBuf;

use log::debug;
use serde_json::Value;

use crate::dispatch::Dispatcher;
use crate::schema::{
    AllMids, Candle, Channel, L2Book, Notification, Trades, UserEvent, UserFills, UserFundings,
    UserNonFundingLedgerUpdates,
};
use crate::storage::category::{
    CategoryKey, USER_EVENTS_FILLS, USER_EVENTS_FUNDING, USER_EVENTS_LIQUIDATION,
    USER_EVENTS_NON_USER_CANCEL,
};
use crate::storage::StorageEngine;

/// Per-channel persistence handlers.
///
/// Each handler derives the category key from its view and hands the
/// frame's `data`, exactly as received, to the storage engine:
///
/// | channel                      | category                  |
/// |------------------------------|---------------------------|
/// | allMids, notification        | `[channel]`               |
/// | userEvents (by kind)         | `[userEvents<Kind>]`      |
/// | trades, l2Book               | `[channel, coin]`         |
/// | candle                       | `[candle, coin, interval]`|
/// | userFills, userFundings, userNonFundingLedgerUpdates | `[channel, user]` |
///
/// Every method returns the written file, or `None` when nothing was
/// stored (empty batch, or a storage failure that was already logged).
#[derive(Clone)]
pub struct Archiver {
    storage: StorageEngine,
}

impl Archiver {
    pub fn new(storage: StorageEngine) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &StorageEngine {
        &self.storage
    }

    /// Registers one handler per channel on `dispatcher`.
    pub fn install(&self, dispatcher: &mut Dispatcher) {
        let a = self.clone();
        dispatcher.register_handler(move |_: AllMids, data| {
            a.on_all_mids(&data);
        });

        let a = self.clone();
        dispatcher.register_handler(move |_: Notification, data| {
            a.on_notification(&data);
        });

        let a = self.clone();
        dispatcher.register_handler(move |view: Trades, data| {
            a.on_trades(&view, &data);
        });

        let a = self.clone();
        dispatcher.register_handler(move |view: L2Book, data| {
            a.on_l2_book(&view, &data);
        });

        let a = self.clone();
        dispatcher.register_handler(move |view: Candle, data| {
            a.on_candle(&view, &data);
        });

        let a = self.clone();
        dispatcher.register_handler(move |view: UserEvent, data| {
            a.on_user_event(&view, &data);
        });

        let a = self.clone();
        dispatcher.register_handler(move |view: UserFills, data| {
            a.on_user_fills(&view, &data);
        });

        let a = self.clone();
        dispatcher.register_handler(move |view: UserFundings, data| {
            a.on_user_fundings(&view, &data);
        });

        let a = self.clone();
        dispatcher.register_handler(move |view: UserNonFundingLedgerUpdates, data| {
            a.on_user_ledger_updates(&view, &data);
        });
    }

    pub fn on_all_mids(&self, data: &Value) -> Option<PathBuf> {
        debug!("Received allMids data");
        self.storage
            .persist(&CategoryKey::kind(Channel::AllMids.as_str()), data)
    }

    pub fn on_notification(&self, data: &Value) -> Option<PathBuf> {
        debug!("Received notification data");
        self.storage
            .persist(&CategoryKey::kind(Channel::Notification.as_str()), data)
    }

    /// A batch is keyed by the coin of its first trade.
    pub fn on_trades(&self, view: &Trades, data: &Value) -> Option<PathBuf> {
        let coin = view.coin()?;
        debug!("Received trades data for {}", coin);
        self.storage
            .persist(&CategoryKey::with_coin(Channel::Trades.as_str(), coin), data)
    }

    pub fn on_l2_book(&self, view: &L2Book, data: &Value) -> Option<PathBuf> {
        debug!("Received l2Book data for {}", view.coin);
        self.storage.persist(
            &CategoryKey::with_coin(Channel::L2Book.as_str(), &view.coin),
            data,
        )
    }

    pub fn on_candle(&self, view: &Candle, data: &Value) -> Option<PathBuf> {
        debug!("Received candle data for {} {}", view.s, view.i);
        self.storage
            .persist(&CategoryKey::candle(&view.s, &view.i), data)
    }

    /// Stores only the inner event, under a per-kind category.
    pub fn on_user_event(&self, event: &UserEvent, data: &Value) -> Option<PathBuf> {
        debug!("Received userEvents data");
        let category = match event {
            UserEvent::Fills(fills) if fills.is_empty() => return None,
            UserEvent::Fills(_) => USER_EVENTS_FILLS,
            UserEvent::Funding(_) => USER_EVENTS_FUNDING,
            UserEvent::Liquidation(_) => USER_EVENTS_LIQUIDATION,
            UserEvent::NonUserCancel(_) => USER_EVENTS_NON_USER_CANCEL,
        };
        let inner = data.get(event.field())?;
        self.storage.persist(&CategoryKey::kind(category), inner)
    }

    pub fn on_user_fills(&self, view: &UserFills, data: &Value) -> Option<PathBuf> {
        debug!("Received userFills data for user {}", view.user);
        self.storage.persist(
            &CategoryKey::with_user(Channel::UserFills.as_str(), &view.user),
            data,
        )
    }

    pub fn on_user_fundings(&self, view: &UserFundings, data: &Value) -> Option<PathBuf> {
        debug!("Received userFundings data for user {}", view.user);
        self.storage.persist(
            &CategoryKey::with_user(Channel::UserFundings.as_str(), &view.user),
            data,
        )
    }

    pub fn on_user_ledger_updates(
        &self,
        view: &UserNonFundingLedgerUpdates,
        data: &Value,
    ) -> Option<PathBuf> {
        debug!(
            "Received userNonFundingLedgerUpdates data for user {}",
            view.user
        );
        self.storage.persist(
            &CategoryKey::with_user(Channel::UserNonFundingLedgerUpdates.as_str(), &view.user),
            data,
        )
    }
}
