//! 店铺优惠券 - vouchers applied per shop
//!
//! At most one voucher per shop. The discount is fixed when the code is
//! validated; checkout only counts vouchers of shops that still have
//! selected lines.

use crate::api::VoucherService;
use crate::http::bounded;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use shared::error::ErrorCode;
use shared::models::VoucherQuery;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedVoucher {
    pub shop_id: String,
    pub code: String,
    pub title: Option<String>,
    pub voucher_id: Option<String>,
    pub discount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoucherError {
    #[error("Please enter a voucher code")]
    EmptyCode,

    #[error("No selected items from this shop")]
    NothingSelected,

    #[error("{0}")]
    Rejected(String),

    #[error("Failed to check voucher: {0}")]
    Service(String),
}

impl VoucherError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Service(_) => ErrorCode::NetworkError,
            _ => ErrorCode::VoucherInvalid,
        }
    }
}

/// Discount carried into the order and payment payloads
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoucherTotals {
    /// First applied voucher id, in shop order
    pub voucher_id: Option<String>,
    pub discount: Decimal,
}

pub struct VoucherBook {
    service: Arc<dyn VoucherService>,
    applied: Mutex<BTreeMap<String, AppliedVoucher>>,
    timeout: Duration,
}

impl VoucherBook {
    pub fn new(service: Arc<dyn VoucherService>, timeout: Duration) -> Self {
        Self {
            service,
            applied: Mutex::new(BTreeMap::new()),
            timeout,
        }
    }

    /// Validate `code` against the shop's selected subtotal and apply it
    ///
    /// Replaces any voucher already applied to that shop. A refused code
    /// leaves the previous voucher in place.
    pub async fn apply(
        &self,
        shop_id: &str,
        code: &str,
        shop_subtotal: Decimal,
    ) -> Result<AppliedVoucher, VoucherError> {
        let code = code.trim().to_uppercase();
        if code.is_empty() {
            return Err(VoucherError::EmptyCode);
        }
        if shop_subtotal <= Decimal::ZERO {
            return Err(VoucherError::NothingSelected);
        }

        let query = VoucherQuery {
            code: code.clone(),
            shop_owner_id: shop_id.to_string(),
            order_amount: shop_subtotal,
        };
        let result = bounded(self.timeout, self.service.validate(&query))
            .await
            .map_err(|e| {
                tracing::warn!(shop_id, error = %e, "Voucher validation failed");
                VoucherError::Service(e.user_message())
            })?;

        if !result.valid {
            tracing::debug!(shop_id, %code, "Voucher rejected");
            return Err(VoucherError::Rejected(
                result
                    .message
                    .unwrap_or_else(|| ErrorCode::VoucherInvalid.message().to_string()),
            ));
        }

        // 折扣不超过店铺小计
        let discount = result
            .discount
            .unwrap_or_default()
            .clamp(Decimal::ZERO, shop_subtotal);
        let voucher = AppliedVoucher {
            shop_id: shop_id.to_string(),
            code: result.code.unwrap_or(code),
            title: result.title,
            voucher_id: result.voucher_id,
            discount,
        };
        tracing::info!(shop_id, code = %voucher.code, %discount, "Voucher applied");
        self.applied
            .lock()
            .insert(shop_id.to_string(), voucher.clone());
        Ok(voucher)
    }

    pub fn remove(&self, shop_id: &str) -> Option<AppliedVoucher> {
        self.applied.lock().remove(shop_id)
    }

    pub fn get(&self, shop_id: &str) -> Option<AppliedVoucher> {
        self.applied.lock().get(shop_id).cloned()
    }

    pub fn applied(&self) -> Vec<AppliedVoucher> {
        self.applied.lock().values().cloned().collect()
    }

    pub fn clear(&self) {
        self.applied.lock().clear();
    }

    /// Vouchers of the given shops, summed
    pub fn totals(&self, shops: &BTreeSet<String>) -> VoucherTotals {
        let applied = self.applied.lock();
        let mut totals = VoucherTotals::default();
        for voucher in applied.values().filter(|v| shops.contains(&v.shop_id)) {
            if totals.voucher_id.is_none() {
                totals.voucher_id = voucher.voucher_id.clone();
            }
            totals.discount += voucher.discount;
        }
        totals
    }
}
