//! Remote collaborators
//!
//! Each service the engine talks to is a trait so tests can swap in the
//! in-memory fakes from [`crate::testing`]. [`RemoteServices`] implements
//! all of them over an [`HttpClient`](crate::http::HttpClient).

mod remote;

pub use remote::{RemoteServices, paths, payment_path};

use crate::ClientResult;
use crate::http::HttpClient;
use async_trait::async_trait;
use rust_decimal::Decimal;
use shared::models::{
    Address, CartItemUpdate, CartSnapshot, OrderReceipt, OrderRequest, PaymentMethod,
    PaymentSession, PaymentSessionRequest, ReservationResult, ReserveRequest,
    ShippingQuoteRequest, VoucherQuery, VoucherValidation,
};
use std::sync::Arc;

/// Cart service
#[async_trait]
pub trait CartService: Send + Sync {
    /// Authoritative cart of the current user
    async fn fetch_cart(&self) -> ClientResult<CartSnapshot>;

    async fn update_quantity(&self, update: &CartItemUpdate) -> ClientResult<()>;

    /// Delete a line by its row id
    async fn remove_line(&self, line_id: &str) -> ClientResult<()>;
}

/// Address service
#[async_trait]
pub trait AddressService: Send + Sync {
    async fn list_addresses(&self) -> ClientResult<Vec<Address>>;
}

/// Shipping fee service
#[async_trait]
pub trait ShippingService: Send + Sync {
    /// `Ok(None)` when the service answers without a fee
    async fn quote(&self, request: &ShippingQuoteRequest) -> ClientResult<Option<Decimal>>;
}

/// Order service
#[async_trait]
pub trait OrderService: Send + Sync {
    async fn create_order(&self, request: &OrderRequest) -> ClientResult<OrderReceipt>;
}

/// Payment service for redirect-based methods
#[async_trait]
pub trait PaymentService: Send + Sync {
    async fn create_session(
        &self,
        method: PaymentMethod,
        request: &PaymentSessionRequest,
    ) -> ClientResult<PaymentSession>;
}

/// Shop voucher service
#[async_trait]
pub trait VoucherService: Send + Sync {
    async fn validate(&self, query: &VoucherQuery) -> ClientResult<VoucherValidation>;
}

/// 秒杀库存预留
#[async_trait]
pub trait ReservationService: Send + Sync {
    /// A refusal may come back as `Ok` with `success == false` or as an
    /// API error
    async fn reserve(&self, request: &ReserveRequest) -> ClientResult<ReservationResult>;
}

/// Full-page navigation performed by the host (browser, webview, terminal)
pub trait Navigator: Send + Sync {
    fn redirect(&self, url: &str);
}

/// Every collaborator the engine needs
#[derive(Clone)]
pub struct Services {
    pub cart: Arc<dyn CartService>,
    pub addresses: Arc<dyn AddressService>,
    pub shipping: Arc<dyn ShippingService>,
    pub orders: Arc<dyn OrderService>,
    pub payments: Arc<dyn PaymentService>,
    pub vouchers: Arc<dyn VoucherService>,
    pub reservations: Arc<dyn ReservationService>,
    pub navigator: Arc<dyn Navigator>,
}

impl Services {
    /// All services over one HTTP client
    pub fn remote<H>(http: H, navigator: Arc<dyn Navigator>) -> Self
    where
        H: HttpClient + 'static,
    {
        let remote = Arc::new(RemoteServices::new(http));
        Self {
            cart: remote.clone(),
            addresses: remote.clone(),
            shipping: remote.clone(),
            orders: remote.clone(),
            payments: remote.clone(),
            vouchers: remote.clone(),
            reservations: remote,
            navigator,
        }
    }
}
