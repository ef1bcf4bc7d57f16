//! Error types for the taskring runtime

use core::fmt;

/// Result type for queue and scheduler construction
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors that can occur when building a queue
///
/// Steady-state operations never produce these: a failed reservation is a
/// `false`, an empty pop is a `None`, and a rejected schedule hands the
/// routine back. Only construction is fallible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Requested capacity cannot be rounded to a representable power of two
    CapacityOverflow,

    /// The allocator strategy returned a null slot array
    AllocationFailed,
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::CapacityOverflow => write!(f, "capacity too large for power-of-two rounding"),
            QueueError::AllocationFailed => write!(f, "slot array allocation failed"),
        }
    }
}

impl std::error::Error for QueueError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = QueueError::AllocationFailed;
        assert_eq!(format!("{}", e), "slot array allocation failed");

        let e = QueueError::CapacityOverflow;
        assert_eq!(format!("{}", e), "capacity too large for power-of-two rounding");
    }
}
