//! In-memory collaborators for tests
//!
//! Every fake records its calls so tests can assert on what reached the
//! "network".

use crate::api::{
    AddressService, CartService, Navigator, OrderService, PaymentService, ReservationService,
    Services, ShippingService, VoucherService,
};
use crate::{ClientError, ClientResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use shared::error::ApiErrorBody;
use shared::models::{
    Address, CartItemUpdate, CartLine, CartSnapshot, OrderReceipt, OrderRequest, PaymentMethod,
    PaymentSession, PaymentSessionRequest, ReservationResult, ReserveRequest, ShippingQuoteRequest,
    VoucherQuery, VoucherValidation,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Cart line with the given key parts, price and stock
pub fn line(product: &str, size: Option<&str>, quantity: u32, price: i64, stock: u32) -> CartLine {
    CartLine {
        id: format!("row-{}-{}", product, size.unwrap_or("none")),
        product_id: product.to_string(),
        size_id: size.map(str::to_string),
        product_name: Some(format!("Product {product}")),
        quantity,
        unit_price: Decimal::from(price),
        original_price: None,
        total_price: Some(Decimal::from(price) * Decimal::from(quantity)),
        available_stock: stock,
        product_available: true,
        size_available: true,
        shop_owner_id: None,
        shop_owner_name: None,
        is_flash_sale: false,
    }
}

/// `line` sold by shop `shop_id`
pub fn in_shop(mut line: CartLine, shop_id: &str) -> CartLine {
    line.shop_owner_id = Some(shop_id.to_string());
    line.shop_owner_name = Some(format!("Shop {shop_id}"));
    line
}

/// `line` marked as a flash-sale item
pub fn flash_sale(mut line: CartLine) -> CartLine {
    line.is_flash_sale = true;
    line
}

pub fn snapshot(items: Vec<CartLine>) -> CartSnapshot {
    CartSnapshot {
        id: Some("cart-1".to_string()),
        user_id: Some("user-1".to_string()),
        items,
    }
}

pub fn address(id: &str, is_default: bool) -> Address {
    Address {
        id: id.to_string(),
        is_default,
        recipient_name: Some("Test".to_string()),
        recipient_phone: None,
        street_address: None,
    }
}

/// Scripted failure for a fake write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeFailure {
    /// Legacy `{message: "INSUFFICIENT_STOCK:<n>"}` rejection
    Stock { available: u32 },
    /// Structured stock rejection without an available count
    StockUnknown { message: String },
    Server(String),
}

impl FakeFailure {
    fn to_error(&self) -> ClientError {
        match self {
            Self::Stock { available } => ClientError::Api {
                status: 400,
                body: ApiErrorBody {
                    error: None,
                    message: Some(format!("INSUFFICIENT_STOCK:{available}")),
                    details: None,
                },
            },
            Self::StockUnknown { message } => ClientError::Api {
                status: 409,
                body: ApiErrorBody {
                    error: Some("INSUFFICIENT_STOCK".to_string()),
                    message: Some(message.clone()),
                    details: None,
                },
            },
            Self::Server(msg) => ClientError::Internal(msg.clone()),
        }
    }
}

// ========== Cart ==========

#[derive(Debug, Default)]
struct FakeCartState {
    cart: CartSnapshot,
    fetch_fails: bool,
    update_failure: Option<FakeFailure>,
    remove_fails: bool,
    update_latency: Duration,
    updates: Vec<CartItemUpdate>,
    removals: Vec<String>,
}

#[derive(Debug, Default)]
pub struct FakeCart {
    state: Mutex<FakeCartState>,
    fetches: AtomicUsize,
    active_updates: AtomicUsize,
    max_active_updates: AtomicUsize,
}

impl FakeCart {
    pub fn new(cart: CartSnapshot) -> Self {
        Self {
            state: Mutex::new(FakeCartState {
                cart,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub fn set_cart(&self, cart: CartSnapshot) {
        self.state.lock().cart = cart;
    }

    pub fn cart(&self) -> CartSnapshot {
        self.state.lock().cart.clone()
    }

    pub fn fail_fetch(&self, fail: bool) {
        self.state.lock().fetch_fails = fail;
    }

    pub fn fail_updates(&self, failure: Option<FakeFailure>) {
        self.state.lock().update_failure = failure;
    }

    pub fn fail_removal(&self, fail: bool) {
        self.state.lock().remove_fails = fail;
    }

    pub fn set_update_latency(&self, latency: Duration) {
        self.state.lock().update_latency = latency;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> Vec<CartItemUpdate> {
        self.state.lock().updates.clone()
    }

    pub fn update_count(&self) -> usize {
        self.state.lock().updates.len()
    }

    pub fn removals(&self) -> Vec<String> {
        self.state.lock().removals.clone()
    }

    /// Highest number of quantity writes seen in flight at once
    pub fn max_concurrent_updates(&self) -> usize {
        self.max_active_updates.load(Ordering::SeqCst)
    }
}

struct ActiveUpdate<'a>(&'a AtomicUsize);

impl Drop for ActiveUpdate<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CartService for FakeCart {
    async fn fetch_cart(&self) -> ClientResult<CartSnapshot> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        if state.fetch_fails {
            return Err(ClientError::Internal("cart unavailable".into()));
        }
        Ok(state.cart.clone())
    }

    async fn update_quantity(&self, update: &CartItemUpdate) -> ClientResult<()> {
        let (latency, failure) = {
            let mut state = self.state.lock();
            state.updates.push(update.clone());
            (state.update_latency, state.update_failure.clone())
        };

        let active = self.active_updates.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_updates.fetch_max(active, Ordering::SeqCst);
        let _active = ActiveUpdate(&self.active_updates);

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if let Some(failure) = failure {
            return Err(failure.to_error());
        }

        let mut state = self.state.lock();
        let key = shared::models::LineKey::new(&update.product_id, update.size_id.as_deref());
        if let Some(line) = state.cart.items.iter_mut().find(|l| l.key() == key) {
            *line = line.with_quantity(update.quantity);
        }
        Ok(())
    }

    async fn remove_line(&self, line_id: &str) -> ClientResult<()> {
        let mut state = self.state.lock();
        state.removals.push(line_id.to_string());
        if state.remove_fails {
            return Err(ClientError::Internal("remove failed".into()));
        }
        state.cart.items.retain(|l| l.id != line_id);
        Ok(())
    }
}

// ========== Addresses ==========

#[derive(Debug, Default)]
pub struct FakeAddresses {
    list: Mutex<Vec<Address>>,
    fails: AtomicBool,
    calls: AtomicUsize,
}

impl FakeAddresses {
    pub fn new(list: Vec<Address>) -> Self {
        Self {
            list: Mutex::new(list),
            ..Default::default()
        }
    }

    pub fn set(&self, list: Vec<Address>) {
        *self.list.lock() = list;
    }

    pub fn fail(&self, fail: bool) {
        self.fails.store(fail, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AddressService for FakeAddresses {
    async fn list_addresses(&self) -> ClientResult<Vec<Address>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fails.load(Ordering::SeqCst) {
            return Err(ClientError::Internal("address service down".into()));
        }
        Ok(self.list.lock().clone())
    }
}

// ========== Shipping ==========

#[derive(Debug, Default)]
struct FakeShippingState {
    fee: Option<Decimal>,
    fails: bool,
    latency: Duration,
    calls: Vec<ShippingQuoteRequest>,
}

#[derive(Debug, Default)]
pub struct FakeShipping {
    state: Mutex<FakeShippingState>,
}

impl FakeShipping {
    pub fn new(fee: Decimal) -> Self {
        Self {
            state: Mutex::new(FakeShippingState {
                fee: Some(fee),
                ..Default::default()
            }),
        }
    }

    pub fn set_fee(&self, fee: Decimal) {
        self.state.lock().fee = Some(fee);
    }

    pub fn fail(&self, fail: bool) {
        self.state.lock().fails = fail;
    }

    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    pub fn calls(&self) -> Vec<ShippingQuoteRequest> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }
}

#[async_trait]
impl ShippingService for FakeShipping {
    async fn quote(&self, request: &ShippingQuoteRequest) -> ClientResult<Option<Decimal>> {
        // 费用在请求时确定
        let (fee, fails, latency) = {
            let mut state = self.state.lock();
            state.calls.push(request.clone());
            (state.fee, state.fails, state.latency)
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if fails {
            return Err(ClientError::Internal("shipping service down".into()));
        }
        Ok(fee)
    }
}

// ========== Orders ==========

#[derive(Debug, Default)]
struct FakeOrdersState {
    rejection: Option<ApiErrorBody>,
    latency: Duration,
    calls: Vec<OrderRequest>,
}

#[derive(Debug, Default)]
pub struct FakeOrders {
    state: Mutex<FakeOrdersState>,
}

impl FakeOrders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every order with this error body (HTTP 400)
    pub fn reject_with(&self, body: Option<ApiErrorBody>) {
        self.state.lock().rejection = body;
    }

    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    pub fn calls(&self) -> Vec<OrderRequest> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }
}

#[async_trait]
impl OrderService for FakeOrders {
    async fn create_order(&self, request: &OrderRequest) -> ClientResult<OrderReceipt> {
        let (rejection, latency) = {
            let mut state = self.state.lock();
            state.calls.push(request.clone());
            (state.rejection.clone(), state.latency)
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if let Some(body) = rejection {
            return Err(ClientError::Api { status: 400, body });
        }
        Ok(OrderReceipt {
            message: "Order is being processed".to_string(),
            status: Some("PENDING".to_string()),
            order_id: None,
        })
    }
}

// ========== Payments ==========

#[derive(Debug, Default)]
struct FakePaymentsState {
    payment_url: Option<String>,
    fails: bool,
    calls: Vec<(PaymentMethod, PaymentSessionRequest)>,
}

#[derive(Debug, Default)]
pub struct FakePayments {
    state: Mutex<FakePaymentsState>,
}

impl FakePayments {
    pub fn new(payment_url: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(FakePaymentsState {
                payment_url: Some(payment_url.into()),
                ..Default::default()
            }),
        }
    }

    pub fn fail(&self, fail: bool) {
        self.state.lock().fails = fail;
    }

    /// Answer successfully but without a URL
    pub fn omit_url(&self) {
        self.state.lock().payment_url = None;
    }

    pub fn calls(&self) -> Vec<(PaymentMethod, PaymentSessionRequest)> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }
}

#[async_trait]
impl PaymentService for FakePayments {
    async fn create_session(
        &self,
        method: PaymentMethod,
        request: &PaymentSessionRequest,
    ) -> ClientResult<PaymentSession> {
        let mut state = self.state.lock();
        state.calls.push((method, request.clone()));
        if state.fails {
            return Err(ClientError::Internal("payment gateway error".into()));
        }
        Ok(PaymentSession {
            code: Some("00".to_string()),
            message: Some("success".to_string()),
            payment_url: state.payment_url.clone(),
            txn_ref: Some("TXN-1".to_string()),
        })
    }
}

// ========== Vouchers ==========

#[derive(Debug, Default)]
struct FakeVouchersState {
    /// code -> (voucher id, discount)
    codes: HashMap<String, (String, Decimal)>,
    fails: bool,
    calls: Vec<VoucherQuery>,
}

#[derive(Debug, Default)]
pub struct FakeVouchers {
    state: Mutex<FakeVouchersState>,
}

impl FakeVouchers {
    /// Accept `code` with this id and discount; every other code is invalid
    pub fn accept(&self, code: &str, voucher_id: &str, discount: Decimal) {
        self.state
            .lock()
            .codes
            .insert(code.to_string(), (voucher_id.to_string(), discount));
    }

    pub fn fail(&self, fail: bool) {
        self.state.lock().fails = fail;
    }

    pub fn calls(&self) -> Vec<VoucherQuery> {
        self.state.lock().calls.clone()
    }
}

#[async_trait]
impl VoucherService for FakeVouchers {
    async fn validate(&self, query: &VoucherQuery) -> ClientResult<VoucherValidation> {
        let mut state = self.state.lock();
        state.calls.push(query.clone());
        if state.fails {
            return Err(ClientError::Internal("voucher service down".into()));
        }
        Ok(match state.codes.get(&query.code) {
            Some((id, discount)) => VoucherValidation {
                valid: true,
                code: Some(query.code.clone()),
                title: Some(format!("Voucher {}", query.code)),
                discount: Some(*discount),
                voucher_id: Some(id.clone()),
                message: None,
            },
            None => VoucherValidation {
                valid: false,
                message: Some("Voucher not found".to_string()),
                ..Default::default()
            },
        })
    }
}

// ========== Reservations ==========

#[derive(Debug, Default)]
struct FakeReservationsState {
    /// Product ids whose reservation is refused
    sold_out: Vec<String>,
    calls: Vec<ReserveRequest>,
}

#[derive(Debug, Default)]
pub struct FakeReservations {
    state: Mutex<FakeReservationsState>,
}

impl FakeReservations {
    pub fn sell_out(&self, product_id: &str) {
        self.state.lock().sold_out.push(product_id.to_string());
    }

    pub fn calls(&self) -> Vec<ReserveRequest> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }
}

#[async_trait]
impl ReservationService for FakeReservations {
    async fn reserve(&self, request: &ReserveRequest) -> ClientResult<ReservationResult> {
        let mut state = self.state.lock();
        state.calls.push(request.clone());
        if state.sold_out.contains(&request.product_id) {
            return Ok(ReservationResult {
                success: false,
                status: Some("FAILED".to_string()),
                reserved_quantity: None,
                message: Some(format!("Flash sale stock exhausted for {}", request.product_id)),
            });
        }
        Ok(ReservationResult {
            success: true,
            status: Some("RESERVED".to_string()),
            reserved_quantity: Some(request.quantity),
            message: None,
        })
    }
}

// ========== Navigation ==========

#[derive(Debug, Default)]
pub struct RecordingNavigator {
    redirects: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn redirects(&self) -> Vec<String> {
        self.redirects.lock().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn redirect(&self, url: &str) {
        self.redirects.lock().push(url.to_string());
    }
}

// ========== Bundle ==========

/// One fake per collaborator, shared with the [`Services`] they back
pub struct FakeServices {
    pub cart: Arc<FakeCart>,
    pub addresses: Arc<FakeAddresses>,
    pub shipping: Arc<FakeShipping>,
    pub orders: Arc<FakeOrders>,
    pub payments: Arc<FakePayments>,
    pub vouchers: Arc<FakeVouchers>,
    pub reservations: Arc<FakeReservations>,
    pub navigator: Arc<RecordingNavigator>,
}

impl FakeServices {
    /// Fakes around `cart`, one default address and a 30 000 shipping fee
    pub fn new(cart: CartSnapshot) -> Self {
        Self {
            cart: Arc::new(FakeCart::new(cart)),
            addresses: Arc::new(FakeAddresses::new(vec![address("addr-1", true)])),
            shipping: Arc::new(FakeShipping::new(Decimal::from(30_000))),
            orders: Arc::new(FakeOrders::new()),
            payments: Arc::new(FakePayments::new("https://pay.test/checkout?txn=TXN-1")),
            vouchers: Arc::new(FakeVouchers::default()),
            reservations: Arc::new(FakeReservations::default()),
            navigator: Arc::new(RecordingNavigator::default()),
        }
    }

    pub fn services(&self) -> Services {
        Services {
            cart: self.cart.clone(),
            addresses: self.addresses.clone(),
            shipping: self.shipping.clone(),
            orders: self.orders.clone(),
            payments: self.payments.clone(),
            vouchers: self.vouchers.clone(),
            reservations: self.reservations.clone(),
            navigator: self.navigator.clone(),
        }
    }
}
