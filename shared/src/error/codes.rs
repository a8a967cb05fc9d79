//! Unified error codes for the cart and checkout flow
//!
//! Codes travel as SCREAMING_SNAKE strings, the same spelling the order and
//! cart services put in the `error` field of their error bodies. Strings the
//! client does not know map to [`ErrorCode::Unknown`].

use super::category::ErrorCategory;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", from = "String")]
pub enum ErrorCode {
    // ==================== Validation ====================
    /// Requested quantity is below 1
    QuantityBelowMinimum,
    /// Requested quantity exceeds the stock shown on the line
    QuantityExceedsStock,
    /// No line with this key in the current cart
    UnknownLine,

    // ==================== Transient sync ====================
    /// A cart write or refresh failed
    SyncFailed,
    /// Transport-level failure
    NetworkError,
    /// Request exceeded its deadline
    Timeout,

    // ==================== Stock conflict / business ====================
    /// Server rejected a quantity because stock dropped
    InsufficientStock,

    // ==================== Checkout preconditions ====================
    NoItemsSelected,
    /// The user has no delivery address at all
    NoAddress,
    /// Addresses exist but none is chosen
    AddressNotChosen,

    // ==================== Checkout business ====================
    AddressNotFound,
    CartEmpty,
    CheckoutFailed,
    /// Voucher code rejected for this shop
    VoucherInvalid,
    /// Flash-sale stock could not be reserved
    ReservationFailed,

    // ==================== External payment ====================
    PaymentSessionFailed,
    /// Order service refused a redirect-based method
    UsePaymentService,

    /// Anything else
    Unknown,
}

impl ErrorCode {
    /// Wire spelling of this code
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::QuantityBelowMinimum => "QUANTITY_BELOW_MINIMUM",
            Self::QuantityExceedsStock => "QUANTITY_EXCEEDS_STOCK",
            Self::UnknownLine => "UNKNOWN_LINE",
            Self::SyncFailed => "SYNC_FAILED",
            Self::NetworkError => "NETWORK_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::InsufficientStock => "INSUFFICIENT_STOCK",
            Self::NoItemsSelected => "NO_ITEMS_SELECTED",
            Self::NoAddress => "NO_ADDRESS",
            Self::AddressNotChosen => "ADDRESS_NOT_CHOSEN",
            Self::AddressNotFound => "ADDRESS_NOT_FOUND",
            Self::CartEmpty => "CART_EMPTY",
            Self::CheckoutFailed => "CHECKOUT_FAILED",
            Self::VoucherInvalid => "VOUCHER_INVALID",
            Self::ReservationFailed => "RESERVATION_FAILED",
            Self::PaymentSessionFailed => "PAYMENT_SESSION_FAILED",
            Self::UsePaymentService => "USE_PAYMENT_SERVICE",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Parse a wire code; unrecognised strings become `Unknown`
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "QUANTITY_BELOW_MINIMUM" => Self::QuantityBelowMinimum,
            "QUANTITY_EXCEEDS_STOCK" => Self::QuantityExceedsStock,
            "UNKNOWN_LINE" => Self::UnknownLine,
            "SYNC_FAILED" => Self::SyncFailed,
            "NETWORK_ERROR" => Self::NetworkError,
            "TIMEOUT" => Self::Timeout,
            "INSUFFICIENT_STOCK" => Self::InsufficientStock,
            "NO_ITEMS_SELECTED" => Self::NoItemsSelected,
            "NO_ADDRESS" => Self::NoAddress,
            "ADDRESS_NOT_CHOSEN" => Self::AddressNotChosen,
            "ADDRESS_NOT_FOUND" => Self::AddressNotFound,
            "CART_EMPTY" => Self::CartEmpty,
            "CHECKOUT_FAILED" | "ORDER_FAILED" => Self::CheckoutFailed,
            "VOUCHER_INVALID" => Self::VoucherInvalid,
            "RESERVATION_FAILED" => Self::ReservationFailed,
            "PAYMENT_SESSION_FAILED" => Self::PaymentSessionFailed,
            "USE_PAYMENT_SERVICE" => Self::UsePaymentService,
            _ => Self::Unknown,
        }
    }

    /// Developer-facing English message; user-facing text is localized by the UI
    pub const fn message(&self) -> &'static str {
        match self {
            Self::QuantityBelowMinimum => "Quantity must be at least 1",
            Self::QuantityExceedsStock => "Quantity exceeds available stock",
            Self::UnknownLine => "Cart line not found",
            Self::SyncFailed => "Failed to sync cart",
            Self::NetworkError => "Network error occurred",
            Self::Timeout => "Request timed out",
            Self::InsufficientStock => "Insufficient stock",
            Self::NoItemsSelected => "No items selected",
            Self::NoAddress => "No delivery address found",
            Self::AddressNotChosen => "Please choose a delivery address",
            Self::AddressNotFound => "Delivery address not found",
            Self::CartEmpty => "Cart is empty",
            Self::CheckoutFailed => "Checkout failed",
            Self::VoucherInvalid => "Voucher is not valid for this shop",
            Self::ReservationFailed => "Could not reserve flash sale stock",
            Self::PaymentSessionFailed => "Failed to start payment",
            Self::UsePaymentService => "This payment method must go through the payment service",
            Self::Unknown => "An unknown error occurred",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::of(*self)
    }
}

impl From<String> for ErrorCode {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ErrorCode; 18] = [
        ErrorCode::QuantityBelowMinimum,
        ErrorCode::QuantityExceedsStock,
        ErrorCode::UnknownLine,
        ErrorCode::SyncFailed,
        ErrorCode::NetworkError,
        ErrorCode::Timeout,
        ErrorCode::InsufficientStock,
        ErrorCode::NoItemsSelected,
        ErrorCode::NoAddress,
        ErrorCode::AddressNotChosen,
        ErrorCode::AddressNotFound,
        ErrorCode::CartEmpty,
        ErrorCode::CheckoutFailed,
        ErrorCode::VoucherInvalid,
        ErrorCode::ReservationFailed,
        ErrorCode::PaymentSessionFailed,
        ErrorCode::UsePaymentService,
        ErrorCode::Unknown,
    ];

    #[test]
    fn test_parse_matches_as_str() {
        for code in ALL {
            assert_eq!(ErrorCode::parse(code.as_str()), code);
        }
    }

    #[test]
    fn test_serde_uses_wire_spelling() {
        for code in ALL {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
            let back: ErrorCode = serde_json::from_str(&json).unwrap();
            assert_eq!(back, code);
        }
    }

    #[test]
    fn test_unknown_and_legacy_codes() {
        assert_eq!(ErrorCode::parse("SOMETHING_NEW"), ErrorCode::Unknown);
        assert_eq!(ErrorCode::parse("ORDER_FAILED"), ErrorCode::CheckoutFailed);
        let code: ErrorCode = serde_json::from_str("\"NOPE\"").unwrap();
        assert_eq!(code, ErrorCode::Unknown);
    }
}
