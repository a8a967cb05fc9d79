//! Logging Infrastructure
//!
//! Only binaries call these; the library just emits `tracing` events.

use tracing_subscriber::EnvFilter;

/// Initialize the logger at `info` (or `RUST_LOG` when set)
pub fn init_logger() {
    init_logger_with(None, false);
}

/// Initialize the logger with an explicit level and output format
pub fn init_logger_with(log_level: Option<&str>, json: bool) {
    let filter = match log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(false);

    // 重复初始化（例如测试中）时忽略错误
    if json {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.try_init();
    }
}
