//! Shop voucher validation DTOs

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Query of `GET order/vouchers/validate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoucherQuery {
    pub code: String,
    pub shop_owner_id: String,
    /// Subtotal of the selected lines of that shop
    #[serde(with = "rust_decimal::serde::float")]
    pub order_amount: Decimal,
}

/// Validation answer; `discount` is only meaningful when `valid`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoucherValidation {
    #[serde(default)]
    pub valid: bool,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub discount: Option<Decimal>,
    #[serde(default)]
    pub voucher_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}
