//! 会话事件类型定义
//!
//! Typed events published on the in-process session bus. A presentation
//! layer subscribes to these instead of listening to ambient global events.

use crate::error::ErrorCode;
use crate::models::LineKey;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Checkout state machine phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckoutPhase {
    #[default]
    Idle,
    Validating,
    RoutingCod,
    RoutingExternalPayment,
    Succeeded,
    Failed,
}

impl fmt::Display for CheckoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::RoutingCod => "routing_cod",
            Self::RoutingExternalPayment => "routing_external_payment",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Toast severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// User-facing notice (the UI localizes by `code`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub severity: Severity,
    pub code: Option<ErrorCode>,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            code: None,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Success,
            code: None,
            message: message.into(),
        }
    }

    pub fn warning(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code: Some(code),
            message: message.into(),
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code: Some(code),
            message: message.into(),
        }
    }
}

/// 会话事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum CartEvent {
    /// The confirmed cart was replaced by a fetch
    SnapshotReplaced { line_count: usize },
    /// Keys dropped from the selection because their line vanished or
    /// became unavailable
    SelectionPruned { keys: Vec<LineKey> },
    /// A debounced quantity write finished (`confirmed` is false on failure)
    QuantitySettled {
        key: LineKey,
        quantity: u32,
        confirmed: bool,
    },
    ShippingQuoteChanged {
        fee: Option<Decimal>,
        calculating: bool,
    },
    CheckoutStateChanged { phase: CheckoutPhase },
    Notice(Notice),
    // 跨组件信号
    AvatarUpdated { avatar_url: String },
    ChatRequested {
        shop_owner_id: String,
        product_id: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let event = CartEvent::CheckoutStateChanged {
            phase: CheckoutPhase::RoutingCod,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "checkout_state_changed");
        assert_eq!(value["data"]["phase"], "ROUTING_COD");
    }

    #[test]
    fn test_notice_constructors() {
        let n = Notice::warning(ErrorCode::InsufficientStock, "only 2 left");
        assert_eq!(n.severity, Severity::Warning);
        assert_eq!(n.code, Some(ErrorCode::InsufficientStock));
        assert!(Notice::success("ok").code.is_none());
    }
}
