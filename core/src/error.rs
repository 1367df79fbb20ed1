//! # FORGE Error Handling
//!
//! Error handling follows three rules:
//! - Resource exhaustion is returned as an error value and must be checked
//!   before any write proceeds
//! - Broken invariants are fatal and never retried, see [`unrecoverable_if`]
//! - Requests for state the hardware does not support are filtered silently
//!   by the state tracker and never surface here

use core::fmt;

// =============================================================================
// RESULT TYPE
// =============================================================================

/// FORGE Result type alias
pub type Result<T> = core::result::Result<T, Error>;

// =============================================================================
// ERROR ENUM
// =============================================================================

/// FORGE unified error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Generic Errors
    // =========================================================================
    /// Invalid parameter provided
    InvalidParameter,
    /// Object used before `initialize`
    NotInitialized,

    // =========================================================================
    // Memory Errors
    // =========================================================================
    /// Device memory allocation failed (`OUT_OF_DEVICE_MEMORY`)
    OutOfDeviceMemory,
    /// Address not aligned
    MisalignedAddress,

    // =========================================================================
    // Command Stream Errors
    // =========================================================================
    /// Write would run past the end of the current command buffer
    CommandBufferFull,
    /// Write would run past a heap window or a heap that may not be replaced
    HeapExhausted,

    // =========================================================================
    // Tag Errors
    // =========================================================================
    /// Tag node is not in the state required by the operation
    InvalidTagState,
    /// Tag node does not belong to this pool
    UnknownTag,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Generic
            Self::InvalidParameter => write!(f, "invalid parameter"),
            Self::NotInitialized => write!(f, "object not initialized"),

            // Memory
            Self::OutOfDeviceMemory => write!(f, "out of device memory"),
            Self::MisalignedAddress => write!(f, "misaligned address"),

            // Command stream
            Self::CommandBufferFull => write!(f, "command buffer full"),
            Self::HeapExhausted => write!(f, "heap window exhausted"),

            // Tags
            Self::InvalidTagState => write!(f, "tag node in invalid state"),
            Self::UnknownTag => write!(f, "tag node not owned by this pool"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

// =============================================================================
// FATAL INVARIANTS
// =============================================================================

/// Abort when `condition` holds.
///
/// Used for programming errors that would corrupt the command stream if
/// execution continued. The failure is logged before the panic so it reaches
/// the log sink even when the panic handler aborts.
#[inline]
#[track_caller]
pub fn unrecoverable_if(condition: bool, what: &str) {
    if condition {
        let location = core::panic::Location::caller();
        log::error!("unrecoverable: {} at {}", what, location);
        panic!("unrecoverable: {}", what);
    }
}

/// Macro form of [`unrecoverable_if`] that stringifies the condition.
#[macro_export]
macro_rules! unrecoverable_if {
    ($cond:expr) => {
        $crate::error::unrecoverable_if($cond, core::stringify!($cond))
    };
}
