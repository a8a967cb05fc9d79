//! Shared types for the cart client
//!
//! Wire models for the cart, address, order, shipping and payment
//! services, the unified error vocabulary, and the typed events published
//! on the session bus.

pub mod error;
pub mod message;
pub mod models;

// Re-exports
pub use serde::{Deserialize, Serialize};

pub use error::{ApiErrorBody, ErrorCategory, ErrorCode, StockDetails};
pub use message::{CartEvent, CheckoutPhase, Notice, Severity};
pub use models::{CartLine, CartSnapshot, LineKey, PaymentMethod};
