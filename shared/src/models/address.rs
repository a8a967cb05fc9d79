//! Delivery address model
//!
//! Only the fields the checkout flow reads; address CRUD lives elsewhere.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub id: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub recipient_name: Option<String>,
    #[serde(default)]
    pub recipient_phone: Option<String>,
    #[serde(default)]
    pub street_address: Option<String>,
}

/// Pick the address to pre-select: the default one, else the first
pub fn preferred_address(addresses: &[Address]) -> Option<&Address> {
    addresses
        .iter()
        .find(|a| a.is_default)
        .or_else(|| addresses.first())
}
