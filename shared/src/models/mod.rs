//! Cart, address and checkout models shared by the client crates

pub mod address;
pub mod cart;
pub mod order;
pub mod voucher;

pub use address::{Address, preferred_address};
pub use cart::{
    CartItemUpdate, CartLine, CartSnapshot, LineKey, NO_SIZE, ParseLineKeyError, UNKNOWN_SHOP,
};
pub use order::{
    IntendedOrder, OrderReceipt, OrderRequest, PaymentMethod, PaymentSession,
    PaymentSessionRequest, ReservationResult, ReserveRequest, SelectedItem, ShippingQuoteRequest,
    ShippingQuoteResponse,
};
pub use voucher::{VoucherQuery, VoucherValidation};
