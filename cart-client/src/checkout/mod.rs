//! Checkout Orchestrator
//!
//! ```text
//! IDLE ─▶ VALIDATING ─┬─▶ ROUTING_COD ──────────────┬─▶ SUCCEEDED
//!                     └─▶ ROUTING_EXTERNAL_PAYMENT ─┴─▶ FAILED ─▶ IDLE
//! ```
//!
//! Guards run in order and the first one that fails wins: nothing
//! selected, no address at all, no address chosen. The last two pause the
//! flow instead of failing it.
//!
//! Once the guards pass, a shipping quote that is still calculating is
//! awaited so the frozen fee matches what the user saw settle. Flash-sale
//! lines are reserved under one temporary order id before either strategy
//! submits anything.

mod error;
mod strategy;

pub use error::CheckoutFailure;
pub use strategy::{CheckoutStrategy, ORDER_INFO, payment_amount};

use crate::api::{Navigator, OrderService, PaymentService, ReservationService, Services};
use crate::http::bounded;
use crate::session::CartSession;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use shared::error::ErrorCode;
use shared::message::{CartEvent, CheckoutPhase, Notice};
use shared::models::{
    IntendedOrder, LineKey, OrderReceipt, OrderRequest, PaymentMethod, PaymentSessionRequest,
    ReserveRequest, SelectedItem,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// What the presentation layer must do before checkout can continue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressPrompt {
    /// The user has no address at all
    Create,
    /// Addresses exist but none is chosen; open the picker
    Choose,
}

/// Non-failing end of a checkout attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutOutcome {
    /// Order accepted by the order service (may still be queued)
    OrderAccepted(OrderReceipt),
    /// User handed to the payment gateway; no order exists yet
    Redirected { url: String },
    /// Paused until the user provides an address
    NeedsAddress(AddressPrompt),
    /// Another checkout is still running
    AlreadyInProgress,
}

/// Inputs frozen when checkout passes its guards
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutSession {
    pub address_id: String,
    pub payment_method: PaymentMethod,
    pub user_id: Option<String>,
    pub keys: Vec<LineKey>,
    pub items: Vec<SelectedItem>,
    pub subtotal: Decimal,
    /// Settled quote; `None` when not applicable or unavailable
    pub shipping_fee: Option<Decimal>,
    /// Shops with selected lines
    pub shops: BTreeSet<String>,
    pub voucher_id: Option<String>,
    pub voucher_discount: Decimal,
}

pub type CheckoutResult = Result<CheckoutOutcome, CheckoutFailure>;

pub struct CheckoutOrchestrator {
    session: Arc<CartSession>,
    orders: Arc<dyn OrderService>,
    payments: Arc<dyn PaymentService>,
    reservations: Arc<dyn ReservationService>,
    navigator: Arc<dyn Navigator>,
    phase: Mutex<CheckoutPhase>,
    running: AtomicBool,
}

/// Clears the running flag however `checkout` returns
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl CheckoutOrchestrator {
    pub fn new(session: Arc<CartSession>, services: &Services) -> Self {
        Self {
            session,
            orders: services.orders.clone(),
            payments: services.payments.clone(),
            reservations: services.reservations.clone(),
            navigator: services.navigator.clone(),
            phase: Mutex::new(CheckoutPhase::Idle),
            running: AtomicBool::new(false),
        }
    }

    pub fn phase(&self) -> CheckoutPhase {
        *self.phase.lock()
    }

    fn set_phase(&self, phase: CheckoutPhase) {
        *self.phase.lock() = phase;
        tracing::debug!(%phase, "Checkout phase");
        self.session
            .bus
            .publish(CartEvent::CheckoutStateChanged { phase });
    }

    /// Run one checkout attempt with `method`
    pub async fn checkout(&self, method: PaymentMethod) -> CheckoutResult {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::debug!("Checkout already in progress");
            return Ok(CheckoutOutcome::AlreadyInProgress);
        }
        let _guard = RunGuard(&self.running);

        self.set_phase(CheckoutPhase::Validating);
        let mut checkout = match self.validate(method) {
            Ok(session) => session,
            Err(Guard::Pause(prompt)) => {
                tracing::info!(?prompt, "Checkout paused for address");
                self.set_phase(CheckoutPhase::Idle);
                return Ok(CheckoutOutcome::NeedsAddress(prompt));
            }
            Err(Guard::Fail(failure)) => return Err(self.fail(failure)),
        };
        checkout.shipping_fee = match self.settled_fee().await {
            Ok(fee) => fee,
            Err(failure) => return Err(self.fail(failure)),
        };

        let strategy = CheckoutStrategy::for_method(method);
        self.set_phase(strategy.phase());
        tracing::info!(
            %method,
            lines = checkout.items.len(),
            address_id = %checkout.address_id,
            shipping_fee = ?checkout.shipping_fee,
            "Checkout started"
        );

        let result = match strategy {
            CheckoutStrategy::DirectOrder { .. } => self.place_order(&checkout).await,
            CheckoutStrategy::PaymentRedirect { method } => {
                self.start_payment(method, &checkout).await
            }
        };

        match result {
            Ok(outcome) => {
                self.set_phase(CheckoutPhase::Succeeded);
                Ok(outcome)
            }
            Err(failure) => Err(self.fail(failure)),
        }
    }

    fn validate(&self, method: PaymentMethod) -> Result<CheckoutSession, Guard> {
        let snapshot = self.session.store.snapshot();
        let (keys, items, subtotal, shops) = {
            let selection = self.session.selection.lock();
            let lines = selection.selected_lines(&snapshot);
            let keys: Vec<LineKey> = lines.iter().map(|l| l.key()).collect();
            let items: Vec<SelectedItem> = lines.iter().copied().map(SelectedItem::from).collect();
            (
                keys,
                items,
                selection.selected_subtotal(&snapshot),
                selection.selected_shops(&snapshot),
            )
        };

        if items.is_empty() {
            return Err(Guard::Fail(CheckoutFailure::NoItemsSelected));
        }
        if self.session.addresses.is_empty() {
            return Err(Guard::Pause(AddressPrompt::Create));
        }
        let Some(address_id) = self.session.addresses.chosen_id() else {
            return Err(Guard::Pause(AddressPrompt::Choose));
        };

        let vouchers = self.session.vouchers.totals(&shops);
        Ok(CheckoutSession {
            address_id,
            payment_method: method,
            user_id: snapshot.user_id.clone(),
            keys,
            items,
            subtotal,
            shipping_fee: None,
            shops,
            voucher_id: vouchers.voucher_id,
            voucher_discount: vouchers.discount,
        })
    }

    /// Fee to freeze, waiting out a quote that is still calculating
    async fn settled_fee(&self) -> Result<Option<Decimal>, CheckoutFailure> {
        let shipping = &self.session.shipping;
        let current = shipping.current();
        if !current.is_calculating() {
            return Ok(current.fee());
        }

        tracing::debug!("Waiting for shipping quote before checkout");
        let config = &self.session.config;
        let limit = config.shipping_debounce + config.request_timeout;
        let quote = bounded(limit, async { Ok(shipping.resolve().await) }).await?;
        Ok(quote.fee())
    }

    /// Reserve every flash-sale line under one temporary order id
    ///
    /// `None` when nothing selected is a flash-sale item. The first refusal
    /// aborts the checkout.
    async fn reserve_flash_sale(
        &self,
        checkout: &CheckoutSession,
    ) -> Result<Option<String>, CheckoutFailure> {
        let flash: Vec<&SelectedItem> = checkout.items.iter().filter(|i| i.is_flash_sale).collect();
        if flash.is_empty() {
            return Ok(None);
        }

        let temp_order_id = temp_order_id(checkout.user_id.as_deref());
        let timeout = self.session.config.request_timeout;
        for item in flash {
            let request = ReserveRequest::for_item(&temp_order_id, item);
            let result = bounded(timeout, self.reservations.reserve(&request))
                .await
                .map_err(|e| CheckoutFailure::ReservationFailed(e.user_message()))?;
            if !result.success {
                tracing::warn!(product_id = %item.product_id, "Flash sale reservation refused");
                return Err(CheckoutFailure::ReservationFailed(result.message.unwrap_or_else(
                    || ErrorCode::ReservationFailed.message().to_string(),
                )));
            }
            tracing::debug!(
                product_id = %item.product_id,
                reserved = ?result.reserved_quantity,
                "Flash sale stock reserved"
            );
        }
        Ok(Some(temp_order_id))
    }

    async fn place_order(&self, checkout: &CheckoutSession) -> Result<CheckoutOutcome, CheckoutFailure> {
        let temp_order_id = self.reserve_flash_sale(checkout).await?;
        let request = OrderRequest {
            selected_items: checkout.items.clone(),
            address_id: checkout.address_id.clone(),
            payment_method: checkout.payment_method,
            shipping_fee: checkout.shipping_fee,
            voucher_id: checkout.voucher_id.clone(),
            voucher_discount: checkout.voucher_discount,
            temp_order_id,
        };
        let timeout = self.session.config.request_timeout;
        let receipt = bounded(timeout, self.orders.create_order(&request)).await?;

        tracing::info!(status = ?receipt.status, "Order accepted");
        self.session.selection.lock().remove_all(&checkout.keys);
        // 已下单店铺的优惠券已被使用
        for shop in &checkout.shops {
            self.session.vouchers.remove(shop);
        }
        if let Err(e) = self.session.reconcile().await {
            tracing::warn!(error = %e, "Reconcile after order failed");
        }
        let message = if receipt.message.is_empty() {
            "Order placed".to_string()
        } else {
            receipt.message.clone()
        };
        self.session.bus.notify(Notice::success(message));
        Ok(CheckoutOutcome::OrderAccepted(receipt))
    }

    async fn start_payment(
        &self,
        method: PaymentMethod,
        checkout: &CheckoutSession,
    ) -> Result<CheckoutOutcome, CheckoutFailure> {
        let user_id = checkout
            .user_id
            .clone()
            .ok_or_else(|| CheckoutFailure::PaymentSession("Cart has no user id".into()))?;
        let temp_order_id = self.reserve_flash_sale(checkout).await?;

        let intended = IntendedOrder {
            user_id: user_id.clone(),
            address_id: checkout.address_id.clone(),
            shipping_fee: checkout.shipping_fee,
            voucher_id: checkout.voucher_id.clone(),
            voucher_discount: checkout.voucher_discount,
            temp_order_id,
            selected_items: checkout.items.clone(),
        };
        let order_data_json = serde_json::to_string(&intended)
            .map_err(|e| CheckoutFailure::PaymentSession(e.to_string()))?;
        let request = PaymentSessionRequest {
            amount: payment_amount(
                checkout.subtotal,
                checkout.shipping_fee,
                checkout.voucher_discount,
            ),
            order_info: ORDER_INFO.to_string(),
            user_id,
            address_id: checkout.address_id.clone(),
            order_data_json,
        };

        let timeout = self.session.config.request_timeout;
        let session = bounded(timeout, self.payments.create_session(method, &request))
            .await
            .map_err(|e| CheckoutFailure::PaymentSession(e.user_message()))?;

        let url = session
            .payment_url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                CheckoutFailure::PaymentSession(
                    session
                        .message
                        .unwrap_or_else(|| ErrorCode::PaymentSessionFailed.message().to_string()),
                )
            })?;

        tracing::info!(%method, amount = request.amount, "Redirecting to payment gateway");
        self.navigator.redirect(&url);
        Ok(CheckoutOutcome::Redirected { url })
    }

    fn fail(&self, failure: CheckoutFailure) -> CheckoutFailure {
        tracing::error!(code = %failure.code(), error = %failure, "Checkout failed");
        self.set_phase(CheckoutPhase::Failed);
        self.session
            .bus
            .notify(Notice::error(failure.code(), failure.to_string()));
        self.set_phase(CheckoutPhase::Idle);
        failure
    }
}

enum Guard {
    Pause(AddressPrompt),
    Fail(CheckoutFailure),
}

/// `temp_{userId}_{epoch millis}`
fn temp_order_id(user_id: Option<&str>) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("temp_{}_{millis}", user_id.unwrap_or("guest"))
}
