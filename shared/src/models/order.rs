//! Order, payment and shipping request/response DTOs

use super::cart::{CartLine, LineKey};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payment method chosen at checkout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentMethod {
    /// Cash on delivery
    #[default]
    Cod,
    Vnpay,
    Card,
    Momo,
}

impl PaymentMethod {
    /// Methods that hand the user to an external payment page before any
    /// order exists
    pub const fn requires_redirect(&self) -> bool {
        !matches!(self, Self::Cod)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cod => "COD",
            Self::Vnpay => "VNPAY",
            Self::Card => "CARD",
            Self::Momo => "MOMO",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line as sent to the order, shipping and payment services
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedItem {
    pub product_id: String,
    pub size_id: Option<String>,
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    #[serde(rename = "isFlashSale", default)]
    pub is_flash_sale: bool,
}

impl SelectedItem {
    pub fn key(&self) -> LineKey {
        LineKey::new(&self.product_id, self.size_id.as_deref())
    }
}

impl From<&CartLine> for SelectedItem {
    fn from(line: &CartLine) -> Self {
        Self {
            product_id: line.product_id.clone(),
            size_id: line.size_id.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            is_flash_sale: line.is_flash_sale,
        }
    }
}

/// Order creation request (`POST create-from-cart`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub selected_items: Vec<SelectedItem>,
    pub address_id: String,
    pub payment_method: PaymentMethod,
    /// Fee frozen at checkout; `None` when no quote was available
    #[serde(with = "rust_decimal::serde::float_option", default)]
    pub shipping_fee: Option<Decimal>,
    #[serde(default)]
    pub voucher_id: Option<String>,
    #[serde(with = "rust_decimal::serde::float", default)]
    pub voucher_discount: Decimal,
    /// Reservation handle, only set when flash-sale stock was reserved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_order_id: Option<String>,
}

/// Acknowledgement of an accepted order
///
/// The order may still be queued server-side; `status` is typically
/// `PENDING` at this point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReceipt {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
}

/// Order contents carried opaquely through an external payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntendedOrder {
    pub user_id: String,
    pub address_id: String,
    #[serde(with = "rust_decimal::serde::float_option", default)]
    pub shipping_fee: Option<Decimal>,
    #[serde(default)]
    pub voucher_id: Option<String>,
    #[serde(with = "rust_decimal::serde::float", default)]
    pub voucher_discount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_order_id: Option<String>,
    pub selected_items: Vec<SelectedItem>,
}

/// Payment session request for redirect-based methods
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSessionRequest {
    /// Whole currency units, never below 1
    pub amount: i64,
    pub order_info: String,
    pub user_id: String,
    pub address_id: String,
    /// JSON-encoded [`IntendedOrder`]
    pub order_data_json: String,
}

/// 秒杀库存预留 (`POST stock/reservation/reserve`), one per flash-sale line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveRequest {
    /// Temporary order id shared by every reservation of one checkout
    pub order_id: String,
    pub product_id: String,
    pub size_id: Option<String>,
    pub quantity: u32,
}

impl ReserveRequest {
    pub fn for_item(order_id: &str, item: &SelectedItem) -> Self {
        Self {
            order_id: order_id.to_string(),
            product_id: item.product_id.clone(),
            size_id: item.size_id.clone(),
            quantity: item.quantity,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub reserved_quantity: Option<u32>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSession {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub payment_url: Option<String>,
    #[serde(default)]
    pub txn_ref: Option<String>,
}

/// Shipping fee quote request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingQuoteRequest {
    pub address_id: String,
    pub selected_items: Vec<SelectedItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingQuoteResponse {
    #[serde(default)]
    pub shipping_fee: Option<Decimal>,
}
