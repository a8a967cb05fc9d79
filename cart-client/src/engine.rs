//! CartEngine - presentation-facing facade
//!
//! Owns one cart session: store, selection, debouncer, shipping quote,
//! address book, shop vouchers and checkout. The presentation layer reads [`CartView`]
//! and subscribes to [`CartEvent`]s; everything else goes through the
//! imperative handles below.

use crate::api::{CartService, Navigator, Services};
use crate::checkout::{CheckoutOrchestrator, CheckoutResult};
use crate::debounce::{IntentOutcome, QuantityDebouncer, QuantityError};
use crate::http::bounded;
use crate::selection::SelectionSet;
use crate::session::CartSession;
use crate::shipping::ShippingQuote;
use crate::voucher::{AppliedVoucher, VoucherError};
use crate::{ClientConfig, ClientResult};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use shared::error::ErrorCode;
use shared::message::{CartEvent, CheckoutPhase, Notice};
use shared::models::{Address, CartLine, CartSnapshot, LineKey, PaymentMethod};
use std::sync::Arc;
use tokio::sync::broadcast;

/// One shop header on the cart page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShopGroup {
    pub shop_id: String,
    pub shop_name: Option<String>,
    /// Lines of this shop, in cart order
    pub keys: Vec<LineKey>,
    pub checked: bool,
    /// Subtotal of the selected lines of this shop
    pub selected_subtotal: Decimal,
    pub voucher: Option<AppliedVoucher>,
}

/// Read-only snapshot of everything the cart page renders
#[derive(Debug, Clone, PartialEq)]
pub struct CartView {
    pub lines: Vec<CartLine>,
    pub shops: Vec<ShopGroup>,
    pub selection: Vec<LineKey>,
    pub all_checked: bool,
    pub selected_quantity: u32,
    pub selected_subtotal: Decimal,
    /// Vouchers of shops with selected lines
    pub voucher_discount: Decimal,
    pub shipping: ShippingQuote,
    pub shipping_fee: Option<Decimal>,
    pub calculating: bool,
    /// Keys with a scheduled or in-flight quantity write
    pub pending: Vec<LineKey>,
    pub addresses: Vec<Address>,
    pub chosen_address: Option<String>,
    pub payment_method: PaymentMethod,
    pub phase: CheckoutPhase,
}

pub struct CartEngine {
    session: Arc<CartSession>,
    cart: Arc<dyn CartService>,
    debouncer: QuantityDebouncer,
    checkout: CheckoutOrchestrator,
    payment_method: Mutex<PaymentMethod>,
}

impl CartEngine {
    pub fn new(config: ClientConfig, services: Services) -> Self {
        let session = Arc::new(CartSession::new(config, &services));
        Self {
            debouncer: QuantityDebouncer::new(session.clone(), services.cart.clone()),
            checkout: CheckoutOrchestrator::new(session.clone(), &services),
            cart: services.cart.clone(),
            session,
            payment_method: Mutex::new(PaymentMethod::default()),
        }
    }

    /// Engine talking to the real services over HTTP
    pub fn remote(config: ClientConfig, navigator: Arc<dyn Navigator>) -> ClientResult<Self> {
        let http = config.build_http_client()?;
        Ok(Self::new(config, Services::remote(http, navigator)))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CartEvent> {
        self.session.bus.subscribe()
    }

    pub fn bus(&self) -> &crate::bus::EventBus {
        &self.session.bus
    }

    pub fn config(&self) -> &ClientConfig {
        &self.session.config
    }

    /// Load cart and addresses; `buy_now` replaces the selection with that key
    ///
    /// Failures are surfaced as notices; a failed cart load leaves an empty
    /// cart.
    pub async fn mount(&self, buy_now: Option<LineKey>) {
        let (cart, addresses) = tokio::join!(self.session.store.load(), self.session.addresses.refresh());
        if let Err(e) = cart {
            tracing::error!(error = %e, "Failed to load cart");
            self.session
                .bus
                .notify(Notice::error(ErrorCode::SyncFailed, e.user_message()));
        }
        if let Err(e) = addresses {
            tracing::warn!(error = %e, "Failed to load addresses");
            self.session
                .bus
                .notify(Notice::warning(ErrorCode::NoAddress, e.user_message()));
        }
        if let Some(key) = buy_now {
            tracing::debug!(%key, "Buy now selection");
            self.session.selection.lock().select_only(key);
        }
        self.session.snapshot_changed();
    }

    pub fn view(&self) -> CartView {
        let snapshot = self.session.store.snapshot();
        let (selection, shops, all_checked, selected_quantity, selected_subtotal, selected_shops) = {
            let selection = self.session.selection.lock();
            (
                selection.keys(),
                self.shop_groups(&snapshot, &selection),
                selection.all_checked(&snapshot),
                selection.selected_quantity(&snapshot),
                selection.selected_subtotal(&snapshot),
                selection.selected_shops(&snapshot),
            )
        };
        let shipping = self.session.shipping.current();
        CartView {
            lines: snapshot.items,
            shops,
            selection,
            all_checked,
            selected_quantity,
            selected_subtotal,
            voucher_discount: self.session.vouchers.totals(&selected_shops).discount,
            shipping,
            shipping_fee: shipping.fee(),
            calculating: shipping.is_calculating(),
            pending: self.debouncer.pending_keys(),
            addresses: self.session.addresses.addresses(),
            chosen_address: self.session.addresses.chosen_id(),
            payment_method: self.payment_method(),
            phase: self.checkout.phase(),
        }
    }

    fn shop_groups(&self, snapshot: &CartSnapshot, selection: &SelectionSet) -> Vec<ShopGroup> {
        let mut groups: Vec<ShopGroup> = Vec::new();
        for line in &snapshot.items {
            let shop = line.shop_key();
            match groups.iter_mut().find(|g| g.shop_id == shop) {
                Some(group) => group.keys.push(line.key()),
                None => groups.push(ShopGroup {
                    shop_id: shop.to_string(),
                    shop_name: line.shop_owner_name.clone(),
                    keys: vec![line.key()],
                    checked: selection.shop_checked(shop, snapshot),
                    selected_subtotal: selection.shop_subtotal(shop, snapshot),
                    voucher: self.session.vouchers.get(shop),
                }),
            }
        }
        groups
    }

    /// Select or deselect one line; unpurchasable lines cannot be selected
    pub fn toggle_one(&self, key: &LineKey, included: bool) -> bool {
        if included {
            let purchasable = self
                .session
                .store
                .line(key)
                .is_some_and(|line| line.is_purchasable());
            if !purchasable {
                tracing::debug!(%key, "Refusing to select unavailable line");
                return false;
            }
        }
        self.session.selection.lock().toggle(key.clone(), included);
        self.session.refresh_quote();
        true
    }

    pub fn toggle_all(&self, included: bool) {
        let snapshot = self.session.store.snapshot();
        self.session.selection.lock().toggle_all(included, &snapshot);
        self.session.refresh_quote();
    }

    /// Select every purchasable line of a shop, or deselect all of them
    pub fn toggle_shop(&self, shop_id: &str, included: bool) {
        let snapshot = self.session.store.snapshot();
        self.session
            .selection
            .lock()
            .toggle_shop(shop_id, included, &snapshot);
        self.session.refresh_quote();
    }

    /// Validate a voucher code against the shop's selected subtotal
    pub async fn apply_voucher(
        &self,
        shop_id: &str,
        code: &str,
    ) -> Result<AppliedVoucher, VoucherError> {
        let snapshot = self.session.store.snapshot();
        let subtotal = self.session.selection.lock().shop_subtotal(shop_id, &snapshot);
        let result = self.session.vouchers.apply(shop_id, code, subtotal).await;
        let notice = match &result {
            Ok(voucher) => Notice::success(format!("Voucher applied: -{}", voucher.discount)),
            Err(e) => Notice::error(e.code(), e.to_string()),
        };
        self.session.bus.notify(notice);
        result
    }

    pub fn remove_voucher(&self, shop_id: &str) -> bool {
        let removed = self.session.vouchers.remove(shop_id).is_some();
        if removed {
            self.session.bus.notify(Notice::info("Voucher removed"));
        }
        removed
    }

    /// Request a new quantity for a line (debounced write)
    pub fn change_quantity(
        &self,
        key: &LineKey,
        quantity: u32,
    ) -> Result<IntentOutcome, QuantityError> {
        self.debouncer.request(key, quantity).inspect_err(|e| {
            let notice = match e {
                QuantityError::ExceedsStock { .. } => Notice::warning(e.code(), e.to_string()),
                _ => Notice::error(e.code(), e.to_string()),
            };
            self.session.bus.notify(notice);
        })
    }

    /// One more than the displayed quantity
    pub fn increment(&self, key: &LineKey) -> Result<IntentOutcome, QuantityError> {
        let current = self.displayed_quantity(key)?;
        self.change_quantity(key, current.saturating_add(1))
    }

    /// One less than the displayed quantity
    pub fn decrement(&self, key: &LineKey) -> Result<IntentOutcome, QuantityError> {
        let current = self.displayed_quantity(key)?;
        self.change_quantity(key, current.saturating_sub(1))
    }

    fn displayed_quantity(&self, key: &LineKey) -> Result<u32, QuantityError> {
        self.session
            .store
            .line(key)
            .map(|line| line.quantity)
            .ok_or_else(|| QuantityError::UnknownLine(key.clone()))
    }

    /// Delete a line by row id, then reconcile and drop its key from the
    /// selection
    pub async fn remove(&self, line_id: &str) -> ClientResult<()> {
        let key = self
            .session
            .store
            .snapshot()
            .items
            .iter()
            .find(|line| line.id == line_id)
            .map(CartLine::key);
        if let Some(key) = &key {
            self.debouncer.cancel(key);
        }

        let timeout = self.session.config.request_timeout;
        let result = bounded(timeout, self.cart.remove_line(line_id)).await;
        match &result {
            Ok(()) => {
                tracing::info!(line_id, "Cart line removed");
                if let Some(key) = &key {
                    self.session.selection.lock().remove(key);
                }
                self.session.bus.notify(Notice::success("Item removed"));
            }
            Err(e) => {
                tracing::error!(line_id, error = %e, "Failed to remove cart line");
                self.session
                    .bus
                    .notify(Notice::error(ErrorCode::SyncFailed, e.user_message()));
            }
        }

        self.reconcile().await;
        result
    }

    /// Re-fetch the cart; failures are surfaced as a notice
    pub async fn reconcile(&self) {
        if let Err(e) = self.session.reconcile().await {
            tracing::warn!(error = %e, "Reconcile failed");
            self.session
                .bus
                .notify(Notice::warning(ErrorCode::SyncFailed, e.user_message()));
            self.session.refresh_quote();
        }
    }

    /// Reload addresses and re-quote shipping if the chosen one changed
    pub async fn refresh_addresses(&self) -> ClientResult<()> {
        match self.session.addresses.refresh().await {
            Ok(changed) => {
                if changed {
                    self.session.refresh_quote();
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to refresh addresses");
                self.session
                    .bus
                    .notify(Notice::warning(ErrorCode::NoAddress, e.user_message()));
                Err(e)
            }
        }
    }

    /// Choose the delivery address; unknown ids are refused
    pub fn select_address(&self, address_id: &str) -> bool {
        let changed = self.session.addresses.chosen_id().as_deref() != Some(address_id);
        if !self.session.addresses.select(address_id) {
            return false;
        }
        if changed {
            self.session.refresh_quote();
        }
        true
    }

    pub fn payment_method(&self) -> PaymentMethod {
        *self.payment_method.lock()
    }

    pub fn set_payment_method(&self, method: PaymentMethod) {
        *self.payment_method.lock() = method;
    }

    /// Check out the selection with the chosen payment method
    pub async fn checkout(&self) -> CheckoutResult {
        self.checkout.checkout(self.payment_method()).await
    }

    /// Wait for the shipping quote to settle
    pub async fn shipping_quote(&self) -> ShippingQuote {
        self.session.shipping.resolve().await
    }

    /// Stop all timers; later quantity intents are ignored
    pub fn dispose(&self) {
        self.debouncer.dispose();
        self.session.shipping.dispose();
    }
}

impl Drop for CartEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}
