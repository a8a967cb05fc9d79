//! Unified error vocabulary for the cart and checkout flow
//!
//! - [`ErrorCode`]: wire-compatible business codes
//! - [`ErrorCategory`]: how each code is handled (validation, sync, stock, ...)
//! - [`ApiErrorBody`]: the `{ error, message, details }` body remote services send
//!
//! # Example
//!
//! ```
//! use shared::error::{ApiErrorBody, ErrorCategory, ErrorCode};
//!
//! let body: ApiErrorBody = serde_json::from_str(
//!     r#"{"error":"INSUFFICIENT_STOCK","details":{"available":2,"requested":5}}"#,
//! ).unwrap();
//!
//! assert_eq!(body.code(), ErrorCode::InsufficientStock);
//! assert_eq!(body.code().category(), ErrorCategory::StockConflict);
//! assert_eq!(body.stock_details().and_then(|d| d.available), Some(2));
//! ```

mod category;
mod codes;
mod types;

pub use category::ErrorCategory;
pub use codes::ErrorCode;
pub use types::{ApiErrorBody, STOCK_MESSAGE_PREFIX, StockDetails};
