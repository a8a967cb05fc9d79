//! Error category classification

use super::codes::ErrorCode;
use serde::{Deserialize, Serialize};

/// How an error is handled by the cart/checkout flow
///
/// - Validation: rejected locally, nothing sent
/// - TransientSync: a write or refresh failed, fixed by the next reconcile
/// - StockConflict: server lowered a quantity, clamp and warn
/// - CheckoutPrecondition: blocks checkout entry until the user acts
/// - CheckoutBusiness: typed checkout rejection with a remediation
/// - ExternalPayment: payment session could not be created, nothing to unwind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    TransientSync,
    StockConflict,
    CheckoutPrecondition,
    CheckoutBusiness,
    ExternalPayment,
    General,
}

impl ErrorCategory {
    pub fn of(code: ErrorCode) -> Self {
        match code {
            ErrorCode::QuantityBelowMinimum
            | ErrorCode::QuantityExceedsStock
            | ErrorCode::UnknownLine => Self::Validation,
            ErrorCode::SyncFailed | ErrorCode::NetworkError | ErrorCode::Timeout => {
                Self::TransientSync
            }
            ErrorCode::InsufficientStock => Self::StockConflict,
            ErrorCode::NoItemsSelected | ErrorCode::NoAddress | ErrorCode::AddressNotChosen => {
                Self::CheckoutPrecondition
            }
            ErrorCode::AddressNotFound
            | ErrorCode::CartEmpty
            | ErrorCode::CheckoutFailed
            | ErrorCode::VoucherInvalid
            | ErrorCode::ReservationFailed => Self::CheckoutBusiness,
            ErrorCode::PaymentSessionFailed | ErrorCode::UsePaymentService => {
                Self::ExternalPayment
            }
            ErrorCode::Unknown => Self::General,
        }
    }

    /// Whether local state may need a reconcile after an error of this kind
    pub fn needs_reconcile(&self) -> bool {
        matches!(self, Self::TransientSync | Self::StockConflict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(ErrorCode::QuantityExceedsStock.category(), ErrorCategory::Validation);
        assert_eq!(ErrorCode::Timeout.category(), ErrorCategory::TransientSync);
        assert_eq!(ErrorCode::InsufficientStock.category(), ErrorCategory::StockConflict);
        assert_eq!(ErrorCode::NoItemsSelected.category(), ErrorCategory::CheckoutPrecondition);
        assert_eq!(ErrorCode::CartEmpty.category(), ErrorCategory::CheckoutBusiness);
        assert_eq!(ErrorCode::ReservationFailed.category(), ErrorCategory::CheckoutBusiness);
        assert_eq!(ErrorCode::PaymentSessionFailed.category(), ErrorCategory::ExternalPayment);
        assert_eq!(ErrorCode::Unknown.category(), ErrorCategory::General);
    }

    #[test]
    fn test_needs_reconcile() {
        assert!(ErrorCategory::TransientSync.needs_reconcile());
        assert!(ErrorCategory::StockConflict.needs_reconcile());
        assert!(!ErrorCategory::Validation.needs_reconcile());
        assert!(!ErrorCategory::ExternalPayment.needs_reconcile());
    }
}
