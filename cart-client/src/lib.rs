//! Cart Client - cart synchronization and checkout engine
//!
//! Keeps a locally held cart consistent with the remote cart service while
//! the user issues rapid overlapping changes, and drives checkout through
//! either a direct order or an external payment redirect.
//!
//! # Example
//!
//! ```no_run
//! # use cart_client::{CartEngine, ClientConfig};
//! # use cart_client::api::Navigator;
//! # use std::sync::Arc;
//! struct Browser;
//! impl Navigator for Browser {
//!     fn redirect(&self, url: &str) {
//!         println!("open {url}");
//!     }
//! }
//!
//! # async fn example() -> Result<(), cart_client::ClientError> {
//! let engine = CartEngine::remote(ClientConfig::from_env(), Arc::new(Browser))?;
//! engine.mount(None).await;
//! engine.toggle_all(true);
//! let view = engine.view();
//! println!("{} items, subtotal {}", view.selected_quantity, view.selected_subtotal);
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod api;
pub mod bus;
pub mod checkout;
pub mod config;
pub mod debounce;
pub mod engine;
pub mod error;
pub mod http;
pub mod logger;
pub mod selection;
pub mod session;
pub mod shipping;
pub mod store;
pub mod voucher;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use bus::EventBus;
pub use checkout::{
    AddressPrompt, CheckoutFailure, CheckoutOutcome, CheckoutResult, CheckoutStrategy,
};
pub use config::ClientConfig;
pub use debounce::{IntentOutcome, QuantityError};
pub use engine::{CartEngine, CartView, ShopGroup};
pub use error::{ClientError, ClientResult};
pub use http::{HttpClient, NetworkHttpClient};
pub use selection::SelectionSet;
pub use shipping::ShippingQuote;
pub use voucher::{AppliedVoucher, VoucherError};

// Re-export shared types for convenience
pub use shared::error::{ErrorCategory, ErrorCode};
pub use shared::message::{CartEvent, CheckoutPhase, Notice, Severity};
pub use shared::models::{LineKey, PaymentMethod};
