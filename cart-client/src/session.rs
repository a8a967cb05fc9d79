//! 会话状态 - shared by the engine, the debouncer and checkout

use crate::address::AddressBook;
use crate::api::Services;
use crate::bus::EventBus;
use crate::config::ClientConfig;
use crate::selection::SelectionSet;
use crate::shipping::ShippingQuoteCalculator;
use crate::store::CartStore;
use crate::voucher::VoucherBook;
use crate::ClientResult;
use parking_lot::Mutex;
use shared::message::CartEvent;
use shared::models::{CartSnapshot, SelectedItem};

/// Store, selection, addresses, vouchers and shipping quote of one cart session
pub struct CartSession {
    pub store: CartStore,
    pub selection: Mutex<SelectionSet>,
    pub addresses: AddressBook,
    pub vouchers: VoucherBook,
    pub shipping: ShippingQuoteCalculator,
    pub bus: EventBus,
    pub config: ClientConfig,
}

impl CartSession {
    pub fn new(config: ClientConfig, services: &Services) -> Self {
        let bus = EventBus::with_capacity(config.event_capacity);
        Self {
            store: CartStore::new(services.cart.clone(), bus.clone(), config.request_timeout),
            selection: Mutex::new(SelectionSet::new()),
            addresses: AddressBook::new(services.addresses.clone(), config.request_timeout),
            vouchers: VoucherBook::new(services.vouchers.clone(), config.request_timeout),
            shipping: ShippingQuoteCalculator::new(
                services.shipping.clone(),
                bus.clone(),
                config.shipping_debounce,
                config.request_timeout,
            ),
            bus,
            config,
        }
    }

    /// Re-fetch the cart, then prune the selection and re-quote shipping
    pub async fn reconcile(&self) -> ClientResult<()> {
        self.store.reconcile().await?;
        self.snapshot_changed();
        Ok(())
    }

    /// Apply snapshot side effects: evict unavailable keys, invalidate quote
    pub fn snapshot_changed(&self) {
        let snapshot = self.store.snapshot();
        let removed = self.selection.lock().prune(&snapshot);
        if !removed.is_empty() {
            tracing::debug!(count = removed.len(), "Pruned unavailable lines from selection");
            self.bus.publish(CartEvent::SelectionPruned { keys: removed });
        }
        self.requote(&snapshot);
    }

    /// Re-fire the shipping quote for the current inputs
    pub fn refresh_quote(&self) {
        let snapshot = self.store.snapshot();
        self.requote(&snapshot);
    }

    fn requote(&self, snapshot: &CartSnapshot) {
        let items = self.selected_items(snapshot);
        self.shipping.recompute(self.addresses.chosen_id(), items);
    }

    /// Selected lines of `snapshot` as order items
    pub fn selected_items(&self, snapshot: &CartSnapshot) -> Vec<SelectedItem> {
        self.selection
            .lock()
            .selected_lines(snapshot)
            .into_iter()
            .map(SelectedItem::from)
            .collect()
    }
}
