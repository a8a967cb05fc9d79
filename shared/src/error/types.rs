//! Error body returned by the cart, order and payment services

use super::codes::ErrorCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix the cart service puts in front of the remaining stock when it
/// rejects a quantity update
pub const STOCK_MESSAGE_PREFIX: &str = "INSUFFICIENT_STOCK:";

/// Structured error body `{ error, message, details }`
///
/// Every field is optional: older endpoints only send `{ message }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<Value>,
}

impl ApiErrorBody {
    /// Business code carried by this body
    ///
    /// Falls back to the legacy `"INSUFFICIENT_STOCK:<n>"` message form.
    pub fn code(&self) -> ErrorCode {
        if let Some(error) = self.error.as_deref() {
            return ErrorCode::parse(error);
        }
        match self.message.as_deref() {
            Some(m) if m.trim_start().starts_with(STOCK_MESSAGE_PREFIX) => {
                ErrorCode::InsufficientStock
            }
            _ => ErrorCode::Unknown,
        }
    }

    pub fn message_or_default(&self) -> String {
        self.message
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.code().message().to_string())
    }

    /// Available/requested counts for a stock rejection, when present
    pub fn stock_details(&self) -> Option<StockDetails> {
        let from_details = self.details.as_ref().map(StockDetails::from_value);
        let from_message = self.message.as_deref().and_then(StockDetails::from_message);

        match (from_details, from_message) {
            (Some(d), _) if d.available.is_some() || d.requested.is_some() => Some(d),
            (_, Some(m)) => Some(m),
            _ => None,
        }
    }
}

/// Stock counts attached to an `INSUFFICIENT_STOCK` rejection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockDetails {
    pub available: Option<u32>,
    pub requested: Option<u32>,
}

impl StockDetails {
    /// Read `{available, requested}`; counts may be numbers or numeric strings
    pub fn from_value(value: &Value) -> Self {
        Self {
            available: value.get("available").and_then(count),
            requested: value.get("requested").and_then(count),
        }
    }

    /// Parse `"INSUFFICIENT_STOCK:<n>"`
    pub fn from_message(message: &str) -> Option<Self> {
        let rest = message.trim().strip_prefix(STOCK_MESSAGE_PREFIX)?;
        let available = rest.trim().parse().ok()?;
        Some(Self {
            available: Some(available),
            requested: None,
        })
    }
}

fn count(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
