//! Checkout strategies, one per payment route
//!
//! | Strategy          | Order created                         | Client ends with |
//! |-------------------|---------------------------------------|------------------|
//! | `DirectOrder`     | by this client, maybe queued          | `OrderReceipt`   |
//! | `PaymentRedirect` | by the payment service, after payment | redirect URL     |

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal::prelude::ToPrimitive;
use shared::message::CheckoutPhase;
use shared::models::PaymentMethod;

/// Free-text order description sent to the payment gateway
pub const ORDER_INFO: &str = "Thanh toan don hang";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutStrategy {
    /// Submit the order now; the acknowledgement means "accepted"
    DirectOrder { method: PaymentMethod },
    /// Start a payment session and hand the user to the gateway; no order
    /// exists until the gateway confirms payment
    PaymentRedirect { method: PaymentMethod },
}

impl CheckoutStrategy {
    pub fn for_method(method: PaymentMethod) -> Self {
        if method.requires_redirect() {
            Self::PaymentRedirect { method }
        } else {
            Self::DirectOrder { method }
        }
    }

    pub fn method(&self) -> PaymentMethod {
        match self {
            Self::DirectOrder { method } | Self::PaymentRedirect { method } => *method,
        }
    }

    /// Phase entered when this strategy starts routing
    pub fn phase(&self) -> CheckoutPhase {
        match self {
            Self::DirectOrder { .. } => CheckoutPhase::RoutingCod,
            Self::PaymentRedirect { .. } => CheckoutPhase::RoutingExternalPayment,
        }
    }

    /// Whether an order exists once this strategy succeeds
    pub fn creates_order(&self) -> bool {
        matches!(self, Self::DirectOrder { .. })
    }
}

/// Gateway amount in whole currency units:
/// `max(1, round(subtotal + fee - voucher discount))`
pub fn payment_amount(subtotal: Decimal, shipping_fee: Option<Decimal>, discount: Decimal) -> i64 {
    let total = (subtotal + shipping_fee.unwrap_or_default() - discount)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    total.to_i64().unwrap_or(i64::MAX).max(1)
}
