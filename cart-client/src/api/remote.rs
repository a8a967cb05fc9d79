//! HTTP implementation of the remote collaborators

use super::{
    AddressService, CartService, OrderService, PaymentService, ReservationService,
    ShippingService, VoucherService,
};
use crate::ClientResult;
use crate::http::HttpClient;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::de::IgnoredAny;
use shared::models::{
    Address, CartItemUpdate, CartSnapshot, OrderReceipt, OrderRequest, PaymentMethod,
    PaymentSession, PaymentSessionRequest, ReservationResult, ReserveRequest,
    ShippingQuoteRequest, ShippingQuoteResponse, VoucherQuery, VoucherValidation,
};

/// API 路径
pub mod paths {
    pub const CART: &str = "/v1/stock/cart/user";
    pub const CART_ITEM_UPDATE: &str = "/v1/stock/cart/item/update";
    pub const CART_ITEM_REMOVE: &str = "/v1/stock/cart/item/remove";
    pub const ADDRESSES: &str = "/v1/user/address/getAllAddresses";
    pub const SHIPPING_FEE: &str = "/v1/order/calculate-shipping-fee";
    pub const ORDER_FROM_CART: &str = "/v1/order/create-from-cart";
    pub const PAYMENT_VNPAY: &str = "/v1/payment/vnpay/create";
    pub const PAYMENT_MOMO: &str = "/v1/payment/momo/create";
    pub const VOUCHER_VALIDATE: &str = "/v1/order/vouchers/validate";
    pub const STOCK_RESERVE: &str = "/v1/stock/reservation/reserve";
}

/// Payment endpoint for a redirect method (`CARD` goes through VNPAY)
pub fn payment_path(method: PaymentMethod) -> &'static str {
    match method {
        PaymentMethod::Momo => paths::PAYMENT_MOMO,
        _ => paths::PAYMENT_VNPAY,
    }
}

/// Every remote collaborator behind one HTTP client
#[derive(Debug, Clone)]
pub struct RemoteServices<H> {
    http: H,
}

impl<H: HttpClient> RemoteServices<H> {
    pub fn new(http: H) -> Self {
        Self { http }
    }

    pub fn http(&self) -> &H {
        &self.http
    }
}

#[async_trait]
impl<H: HttpClient> CartService for RemoteServices<H> {
    async fn fetch_cart(&self) -> ClientResult<CartSnapshot> {
        // 没有购物车时服务端可能返回空 body
        let cart: Option<CartSnapshot> = self.http.get(paths::CART).await?;
        Ok(cart.unwrap_or_default())
    }

    async fn update_quantity(&self, update: &CartItemUpdate) -> ClientResult<()> {
        let _: IgnoredAny = self.http.put(paths::CART_ITEM_UPDATE, update).await?;
        Ok(())
    }

    async fn remove_line(&self, line_id: &str) -> ClientResult<()> {
        let path = format!("{}/{}", paths::CART_ITEM_REMOVE, line_id);
        let _: IgnoredAny = self.http.delete(&path).await?;
        Ok(())
    }
}

#[async_trait]
impl<H: HttpClient> AddressService for RemoteServices<H> {
    async fn list_addresses(&self) -> ClientResult<Vec<Address>> {
        let list: Option<Vec<Address>> = self.http.get(paths::ADDRESSES).await?;
        Ok(list.unwrap_or_default())
    }
}

#[async_trait]
impl<H: HttpClient> ShippingService for RemoteServices<H> {
    async fn quote(&self, request: &ShippingQuoteRequest) -> ClientResult<Option<Decimal>> {
        let response: ShippingQuoteResponse = self.http.post(paths::SHIPPING_FEE, request).await?;
        Ok(response.shipping_fee)
    }
}

#[async_trait]
impl<H: HttpClient> OrderService for RemoteServices<H> {
    async fn create_order(&self, request: &OrderRequest) -> ClientResult<OrderReceipt> {
        let receipt: Option<OrderReceipt> = self.http.post(paths::ORDER_FROM_CART, request).await?;
        Ok(receipt.unwrap_or_default())
    }
}

#[async_trait]
impl<H: HttpClient> PaymentService for RemoteServices<H> {
    async fn create_session(
        &self,
        method: PaymentMethod,
        request: &PaymentSessionRequest,
    ) -> ClientResult<PaymentSession> {
        self.http.post(payment_path(method), request).await
    }
}

#[async_trait]
impl<H: HttpClient> VoucherService for RemoteServices<H> {
    async fn validate(&self, query: &VoucherQuery) -> ClientResult<VoucherValidation> {
        let result: Option<VoucherValidation> =
            self.http.get_query(paths::VOUCHER_VALIDATE, query).await?;
        Ok(result.unwrap_or_default())
    }
}

#[async_trait]
impl<H: HttpClient> ReservationService for RemoteServices<H> {
    async fn reserve(&self, request: &ReserveRequest) -> ClientResult<ReservationResult> {
        let result: Option<ReservationResult> =
            self.http.post(paths::STOCK_RESERVE, request).await?;
        Ok(result.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_path() {
        assert_eq!(payment_path(PaymentMethod::Vnpay), paths::PAYMENT_VNPAY);
        assert_eq!(payment_path(PaymentMethod::Card), paths::PAYMENT_VNPAY);
        assert_eq!(payment_path(PaymentMethod::Momo), paths::PAYMENT_MOMO);
    }
}
