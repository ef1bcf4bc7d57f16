//! Environment variable utilities
//!
//! Generic `env_get<T>` function for parsing environment variables with defaults.
//!
//! # Usage
//!
//! ```ignore
//! use taskring_core::env::{env_get, env_get_bool};
//!
//! let workers: usize = env_get("TASKRING_NUM_WORKERS", 4);
//! let spins: u32 = env_get("TASKRING_IDLE_SPINS", 64);
//!
//! // Boolean helper (accepts "1", "true", "yes", "on")
//! let flush: bool = env_get_bool("TASKRING_FLUSH_EPRINT", false);
//! ```

use std::str::FromStr;

/// Get environment variable parsed as type T, or return default
///
/// Works with any type that implements `FromStr`.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Get environment variable as boolean
///
/// Accepts: "1", "true", "yes", "on" (case-insensitive) as true.
/// Everything else (including unset) returns the default.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// Get environment variable as optional value
///
/// Returns `Some(T)` if the variable is set and parses successfully,
/// `None` otherwise.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_get_default() {
        let v: usize = env_get("TASKRING_TEST_UNSET_VAR_XYZ", 7);
        assert_eq!(v, 7);
    }

    #[test]
    fn test_env_get_bool_default() {
        assert!(!env_get_bool("TASKRING_TEST_UNSET_VAR_XYZ", false));
        assert!(env_get_bool("TASKRING_TEST_UNSET_VAR_XYZ", true));
    }

    #[test]
    fn test_env_get_opt_unset() {
        let v: Option<u32> = env_get_opt("TASKRING_TEST_UNSET_VAR_XYZ");
        assert_eq!(v, None);
    }
}
