//! Cart line and cart snapshot models
//!
//! A [`CartLine`] is identified by its [`LineKey`] (`"{productId}:{sizeId}"`),
//! not by the database row id. The key is the unit of selection and of
//! debounced quantity writes on the client.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Size segment used in line keys for products sold without a size
pub const NO_SIZE: &str = "no-size";

/// Shop group for lines that carry neither a shop owner id nor a name
pub const UNKNOWN_SHOP: &str = "unknown";

/// Composite identity of a cart line
///
/// Formatted as `"{productId}:{sizeId}"`, or `"{productId}:no-size"` when the
/// product has no size variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineKey(String);

impl LineKey {
    /// Build the key for a product/size pair (empty size ids count as "no size")
    pub fn new(product_id: &str, size_id: Option<&str>) -> Self {
        let size = size_id.filter(|s| !s.is_empty()).unwrap_or(NO_SIZE);
        Self(format!("{product_id}:{size}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Product part of the key
    pub fn product_id(&self) -> &str {
        self.0.rsplit_once(':').map_or(self.0.as_str(), |(p, _)| p)
    }

    /// Size part of the key, `None` for sizeless products
    pub fn size_id(&self) -> Option<&str> {
        self.0
            .rsplit_once(':')
            .map(|(_, s)| s)
            .filter(|s| *s != NO_SIZE)
    }
}

impl fmt::Display for LineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error returned when parsing a malformed line key
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid line key: {0:?}")]
pub struct ParseLineKeyError(String);

impl FromStr for LineKey {
    type Err = ParseLineKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once(':') {
            Some((product, size)) if !product.is_empty() && !size.is_empty() => {
                Ok(Self::new(product, Some(size)))
            }
            _ => Err(ParseLineKeyError(s.to_string())),
        }
    }
}

/// One (product, size) pairing in the cart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    /// Row id on the cart service, only used for removal
    #[serde(default)]
    pub id: String,
    pub product_id: String,
    #[serde(default)]
    pub size_id: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
    pub quantity: u32,
    pub unit_price: Decimal,
    #[serde(default)]
    pub original_price: Option<Decimal>,
    /// Server-computed line total; recomputed locally on optimistic updates
    #[serde(default)]
    pub total_price: Option<Decimal>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub available_stock: u32,
    #[serde(default = "default_true", deserialize_with = "null_as_true")]
    pub product_available: bool,
    #[serde(default = "default_true", deserialize_with = "null_as_true")]
    pub size_available: bool,
    #[serde(default)]
    pub shop_owner_id: Option<String>,
    #[serde(default)]
    pub shop_owner_name: Option<String>,
    /// 秒杀商品, stock must be reserved before the order is submitted
    #[serde(
        rename = "isFlashSale",
        alias = "flashSale",
        default,
        deserialize_with = "null_as_default"
    )]
    pub is_flash_sale: bool,
}

impl CartLine {
    pub fn key(&self) -> LineKey {
        LineKey::new(&self.product_id, self.size_id.as_deref())
    }

    /// Whether this line may be part of a checkout selection
    pub fn is_purchasable(&self) -> bool {
        self.product_available && self.size_available && self.available_stock > 0
    }

    /// Shop group of this line: owner id, else owner name, else [`UNKNOWN_SHOP`]
    pub fn shop_key(&self) -> &str {
        self.shop_owner_id
            .as_deref()
            .or(self.shop_owner_name.as_deref())
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN_SHOP)
    }

    /// Line total, preferring the server figure when present
    pub fn line_total(&self) -> Decimal {
        self.total_price
            .unwrap_or_else(|| self.unit_price * Decimal::from(self.quantity))
    }

    /// Copy of this line at another quantity, total recomputed from unit price
    pub fn with_quantity(&self, quantity: u32) -> Self {
        Self {
            quantity,
            total_price: Some(self.unit_price * Decimal::from(quantity)),
            ..self.clone()
        }
    }
}

/// Full local view of a cart as returned by the cart service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSnapshot {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<CartLine>,
}

impl CartSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn line(&self, key: &LineKey) -> Option<&CartLine> {
        self.items.iter().find(|line| &line.key() == key)
    }

    /// Keys of every line, in cart order
    pub fn keys(&self) -> Vec<LineKey> {
        self.items.iter().map(CartLine::key).collect()
    }
}

/// Quantity write for one line (`PUT cart/item/update`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemUpdate {
    pub product_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_id: Option<String>,
    pub quantity: u32,
}

impl CartItemUpdate {
    pub fn for_key(key: &LineKey, quantity: u32) -> Self {
        Self {
            product_id: key.product_id().to_string(),
            size_id: key.size_id().map(str::to_string),
            quantity,
        }
    }
}

fn default_true() -> bool {
    true
}

fn null_as_true<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(true))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
