//! Physics Error Types
//!
//! Unified error type for the engine. Fallible public operations (body
//! lookup, constraint validation, configuration checks) return
//! `Result<T, PhysicsError>` instead of raw booleans or panicking.
//! Internal invariant violations (see the broad-phase tree) are programmer
//! errors and panic with a descriptive message instead.

use core::fmt;

/// Unified error type for physics operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PhysicsError {
    /// A body handle does not refer to a live body in this space.
    InvalidBodyHandle {
        /// The stale or out-of-range handle that was provided
        handle: u32,
    },
    /// A constraint references bodies it cannot operate on.
    InvalidConstraint {
        /// Human-readable description of the problem
        reason: &'static str,
    },
    /// Invalid configuration parameter.
    InvalidConfiguration {
        /// Description of the invalid configuration
        reason: &'static str,
    },
    /// A constraint handle does not refer to a live constraint in this space.
    InvalidConstraintHandle {
        /// The stale or out-of-range handle that was provided
        handle: u32,
    },
}

impl fmt::Display for PhysicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBodyHandle { handle } => {
                write!(f, "body handle {handle} does not refer to a live body")
            }
            Self::InvalidConstraint { reason } => {
                write!(f, "invalid constraint: {reason}")
            }
            Self::InvalidConfiguration { reason } => {
                write!(f, "invalid configuration: {reason}")
            }
            Self::InvalidConstraintHandle { handle } => {
                write!(
                    f,
                    "constraint handle {handle} does not refer to a live constraint"
                )
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for PhysicsError {}

// ============================================================================
// Tests
// ============================================================================
