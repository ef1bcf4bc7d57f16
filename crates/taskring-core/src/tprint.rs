//! Leveled print macros for taskring
//!
//! Thread-safe, optionally-flushing debug output on stderr.
//!
//! # Environment Variables
//!
//! - `TASKRING_FLUSH_EPRINT=1` - Flush stderr after each print (useful for debugging crashes)
//! - `TASKRING_LOG_LEVEL=<level>` - Set log level: 0=off, 1=error, 2=warn, 3=info, 4=debug
//!
//! # Usage
//!
//! ```ignore
//! use taskring_core::{tr_debug, tr_info, tr_warn, tr_error};
//!
//! tr_info!("worker {} started", id);
//! tr_debug!("reserved={} capacity={}", reserved, capacity);
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Log levels (matches common conventions)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
}

impl LogLevel {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "[ERROR]",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Info => "[INFO] ",
            LogLevel::Debug => "[DEBUG]",
        }
    }
}

// Global configuration (initialized once)
static FLUSH_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Warn as u8);
static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize logging from environment variables
///
/// Called automatically on first log, but can be called explicitly for
/// deterministic initialization.
pub fn init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return; // Already initialized
    }

    if let Ok(val) = std::env::var("TASKRING_FLUSH_EPRINT") {
        let flush = matches!(val.as_str(), "1" | "true" | "yes" | "on");
        FLUSH_ENABLED.store(flush, Ordering::Relaxed);
    }

    if let Ok(val) = std::env::var("TASKRING_LOG_LEVEL") {
        let level = match val.to_lowercase().as_str() {
            "off" | "0" => LogLevel::Off,
            "error" | "1" => LogLevel::Error,
            "warn" | "2" => LogLevel::Warn,
            "info" | "3" => LogLevel::Info,
            "debug" | "4" => LogLevel::Debug,
            _ => LogLevel::Warn,
        };
        LOG_LEVEL.store(level as u8, Ordering::Relaxed);
    }
}

/// Check if flush is enabled
#[inline]
pub fn flush_enabled() -> bool {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    FLUSH_ENABLED.load(Ordering::Relaxed)
}

/// Get current log level
#[inline]
pub fn log_level() -> LogLevel {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Set log level programmatically
pub fn set_log_level(level: LogLevel) {
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Check if a log level is enabled
#[inline]
pub fn level_enabled(level: LogLevel) -> bool {
    level as u8 <= log_level() as u8
}

/// Internal: Leveled print
///
/// Uses a lock on stderr to ensure atomic line output.
#[doc(hidden)]
pub fn _tlog_impl(level: LogLevel, args: std::fmt::Arguments<'_>) {
    if !level_enabled(level) {
        return;
    }
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let _ = write!(handle, "{} ", level.prefix());
    let _ = handle.write_fmt(args);
    let _ = handle.write_all(b"\n");
    if flush_enabled() {
        let _ = handle.flush();
    }
}

/// Error level log (always shown unless logging is off)
#[macro_export]
macro_rules! tr_error {
    ($($arg:tt)*) => {{
        $crate::tprint::_tlog_impl($crate::tprint::LogLevel::Error, format_args!($($arg)*));
    }};
}

/// Warn level log
#[macro_export]
macro_rules! tr_warn {
    ($($arg:tt)*) => {{
        $crate::tprint::_tlog_impl($crate::tprint::LogLevel::Warn, format_args!($($arg)*));
    }};
}

/// Info level log
#[macro_export]
macro_rules! tr_info {
    ($($arg:tt)*) => {{
        $crate::tprint::_tlog_impl($crate::tprint::LogLevel::Info, format_args!($($arg)*));
    }};
}

/// Debug level log
#[macro_export]
macro_rules! tr_debug {
    ($($arg:tt)*) => {{
        $crate::tprint::_tlog_impl($crate::tprint::LogLevel::Debug, format_args!($($arg)*));
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_gating() {
        set_log_level(LogLevel::Warn);
        assert!(level_enabled(LogLevel::Error));
        assert!(level_enabled(LogLevel::Warn));
        assert!(!level_enabled(LogLevel::Debug));

        set_log_level(LogLevel::Off);
        assert!(!level_enabled(LogLevel::Error));
    }

    #[test]
    fn test_prefixes() {
        assert_eq!(LogLevel::Error.prefix(), "[ERROR]");
        assert_eq!(LogLevel::from_u8(3), LogLevel::Info);
    }
}
