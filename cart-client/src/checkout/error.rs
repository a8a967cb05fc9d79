//! Checkout failures surfaced to the caller

use crate::ClientError;
use shared::error::ErrorCode;
use thiserror::Error;

/// Why a checkout ended in `FAILED`
///
/// None of these are retried automatically; the selection is left as it
/// was so the user can correct and retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutFailure {
    #[error("No items selected")]
    NoItemsSelected,

    #[error("Insufficient stock (available: {available:?}, requested: {requested:?})")]
    InsufficientStock {
        available: Option<u32>,
        requested: Option<u32>,
    },

    #[error("Delivery address not found: {0}")]
    AddressNotFound(String),

    #[error("Cart is empty: {0}")]
    CartEmpty(String),

    #[error("Payment session failed: {0}")]
    PaymentSession(String),

    /// Flash-sale stock reservation refused; no order was created
    #[error("Stock reservation failed: {0}")]
    ReservationFailed(String),

    #[error("Checkout failed: {0}")]
    CheckoutFailed(String),
}

impl CheckoutFailure {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NoItemsSelected => ErrorCode::NoItemsSelected,
            Self::InsufficientStock { .. } => ErrorCode::InsufficientStock,
            Self::AddressNotFound(_) => ErrorCode::AddressNotFound,
            Self::CartEmpty(_) => ErrorCode::CartEmpty,
            Self::PaymentSession(_) => ErrorCode::PaymentSessionFailed,
            Self::ReservationFailed(_) => ErrorCode::ReservationFailed,
            Self::CheckoutFailed(_) => ErrorCode::CheckoutFailed,
        }
    }
}

impl From<CheckoutFailure> for ErrorCode {
    fn from(failure: CheckoutFailure) -> Self {
        failure.code()
    }
}

impl From<&ClientError> for CheckoutFailure {
    fn from(err: &ClientError) -> Self {
        let message = err.user_message();
        match err.code() {
            ErrorCode::InsufficientStock => {
                let details = err.stock_conflict().unwrap_or_default();
                Self::InsufficientStock {
                    available: details.available,
                    requested: details.requested,
                }
            }
            ErrorCode::AddressNotFound => Self::AddressNotFound(message),
            ErrorCode::CartEmpty => Self::CartEmpty(message),
            ErrorCode::ReservationFailed => Self::ReservationFailed(message),
            _ => Self::CheckoutFailed(message),
        }
    }
}

impl From<ClientError> for CheckoutFailure {
    fn from(err: ClientError) -> Self {
        Self::from(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn api(body: serde_json::Value) -> ClientError {
        ClientError::Api {
            status: 400,
            body: serde_json::from_value(body).unwrap(),
        }
    }

    #[test]
    fn test_structured_stock_failure() {
        let err = api(json!({
            "error": "INSUFFICIENT_STOCK",
            "message": "Insufficient stock",
            "details": {"available": "2", "requested": "5"}
        }));
        assert_eq!(
            CheckoutFailure::from(err),
            CheckoutFailure::InsufficientStock {
                available: Some(2),
                requested: Some(5)
            }
        );
    }

    #[test]
    fn test_business_failures() {
        let f = CheckoutFailure::from(api(json!({"error": "ADDRESS_NOT_FOUND", "message": "gone"})));
        assert_eq!(f, CheckoutFailure::AddressNotFound("gone".into()));
        assert_eq!(f.code(), ErrorCode::AddressNotFound);

        let f = CheckoutFailure::from(api(json!({"error": "CART_EMPTY", "message": "Cart not found"})));
        assert_eq!(f.code(), ErrorCode::CartEmpty);

        let f = CheckoutFailure::from(api(json!({"error": "ORDER_FAILED", "message": "db down"})));
        assert_eq!(f, CheckoutFailure::CheckoutFailed("db down".into()));

        let f = CheckoutFailure::from(ClientError::Timeout(std::time::Duration::from_secs(15)));
        assert_eq!(f.code(), ErrorCode::CheckoutFailed);
    }
}
