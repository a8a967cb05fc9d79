//! Client configuration

use std::time::Duration;

/// Cart client configuration
///
/// # 环境变量
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | CART_API_BASE_URL | http://localhost:8080 | API 网关地址 |
/// | CART_API_TOKEN | (none) | Bearer token |
/// | CART_REQUEST_TIMEOUT_SECS | 15 | 请求超时(秒) |
/// | CART_QUANTITY_DEBOUNCE_MS | 500 | 数量修改防抖窗口 |
/// | CART_DUPLICATE_CLICK_MS | 100 | 重复点击过滤窗口 |
/// | CART_SHIPPING_DEBOUNCE_MS | 500 | 运费计算防抖窗口 |
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server base URL (e.g., "http://localhost:8080")
    pub base_url: String,

    /// JWT token for authentication
    pub token: Option<String>,

    /// Bound applied to every remote call
    pub request_timeout: Duration,

    /// Quiet period before a quantity change is written
    pub quantity_debounce: Duration,

    /// Repeats of the same intent inside this window are dropped
    pub duplicate_click_window: Duration,

    /// Quiet period before a shipping quote is requested
    pub shipping_debounce: Duration,

    /// Capacity of the session event bus
    pub event_capacity: usize,
}

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_QUANTITY_DEBOUNCE_MS: u64 = 500;
pub const DEFAULT_DUPLICATE_CLICK_MS: u64 = 100;
pub const DEFAULT_SHIPPING_DEBOUNCE_MS: u64 = 500;
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

impl ClientConfig {
    /// Create a new client configuration
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            quantity_debounce: Duration::from_millis(DEFAULT_QUANTITY_DEBOUNCE_MS),
            duplicate_click_window: Duration::from_millis(DEFAULT_DUPLICATE_CLICK_MS),
            shipping_debounce: Duration::from_millis(DEFAULT_SHIPPING_DEBOUNCE_MS),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// 从环境变量加载配置
    ///
    /// 未设置或无法解析的变量使用默认值
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("CART_API_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.into()),
            token: std::env::var("CART_API_TOKEN")
                .ok()
                .filter(|t| !t.is_empty()),
            request_timeout: Duration::from_secs(env_u64(
                "CART_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )),
            quantity_debounce: Duration::from_millis(env_u64(
                "CART_QUANTITY_DEBOUNCE_MS",
                DEFAULT_QUANTITY_DEBOUNCE_MS,
            )),
            duplicate_click_window: Duration::from_millis(env_u64(
                "CART_DUPLICATE_CLICK_MS",
                DEFAULT_DUPLICATE_CLICK_MS,
            )),
            shipping_debounce: Duration::from_millis(env_u64(
                "CART_SHIPPING_DEBOUNCE_MS",
                DEFAULT_SHIPPING_DEBOUNCE_MS,
            )),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Set the JWT token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_quantity_debounce(mut self, window: Duration) -> Self {
        self.quantity_debounce = window;
        self
    }

    pub fn with_duplicate_click_window(mut self, window: Duration) -> Self {
        self.duplicate_click_window = window;
        self
    }

    pub fn with_shipping_debounce(mut self, window: Duration) -> Self {
        self.shipping_debounce = window;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Create an HTTP client from this configuration
    pub fn build_http_client(&self) -> crate::ClientResult<crate::http::NetworkHttpClient> {
        crate::http::NetworkHttpClient::new(self)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.quantity_debounce, Duration::from_millis(500));
        assert_eq!(config.duplicate_click_window, Duration::from_millis(100));
        assert_eq!(config.shipping_debounce, Duration::from_millis(500));
        assert!(config.token.is_none());
    }

    #[test]
    fn test_builder() {
        let config = ClientConfig::new("http://api.test")
            .with_token("t")
            .with_quantity_debounce(Duration::from_millis(400))
            .with_event_capacity(0);
        assert_eq!(config.token.as_deref(), Some("t"));
        assert_eq!(config.quantity_debounce, Duration::from_millis(400));
        assert_eq!(config.event_capacity, 1);
    }

    #[test]
    fn test_env_fallback_on_garbage() {
        assert_eq!(env_u64("CART_TEST_SURELY_UNSET_VAR", 42), 42);
    }
}
