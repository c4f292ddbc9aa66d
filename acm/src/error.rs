//! Error kinds reported by the manager.
//!
//! Synchronous calls return these directly. The asynchronous power-down path never
//! surfaces an error to a caller: a failed preparation is retried and only shows up
//! in the log and in [crate::module::PowerStats].

use crate::platform::ClockError;
use core::fmt::{self, Display};

/// Errors of the clock/power manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcmError {
    /// The requested clock index has no backing handle.
    InvalidClock { index: usize },
    /// A client or registry entry could not be allocated.
    OutOfMemory,
    /// `idle` was called more times than `busy`. The refcount is left untouched.
    RefcountUnderflow { refcount: usize, requested: usize },
    /// A module refused to be powered off. Retried after the grace period.
    PowerOffPrepareFailed,
    /// A suspend gave up waiting for a module to become idle.
    SuspendTimeout,
    /// The refcount reached zero on a module that is not powered.
    NotPowered,
    /// A module was still powered after it was suspended.
    StillPowered,
    /// The descriptor lists more clocks than a module can hold.
    TooManyClocks { count: usize, max: usize },
    /// The parent module is not registered with the same host.
    ForeignParent,
    /// The module is not registered with this host.
    UnknownModule,
    /// No such hardware lock.
    InvalidLock { id: usize },
    /// The clock primitive failed.
    Clock(ClockError),
}

impl From<ClockError> for AcmError {
    fn from(value: ClockError) -> Self {
        AcmError::Clock(value)
    }
}

impl Display for AcmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcmError::InvalidClock { index } => write!(f, "no clock at index {}", index),
            AcmError::OutOfMemory => f.write_str("out of memory"),
            AcmError::RefcountUnderflow {
                refcount,
                requested,
            } => write!(
                f,
                "refcount underflow: dropping {} references from {}",
                requested, refcount
            ),
            AcmError::PowerOffPrepareFailed => f.write_str("power-off preparation failed"),
            AcmError::SuspendTimeout => f.write_str("timed out waiting for idle"),
            AcmError::NotPowered => f.write_str("module went idle while unpowered"),
            AcmError::StillPowered => f.write_str("module still powered after suspend"),
            AcmError::TooManyClocks { count, max } => {
                write!(f, "{} clocks requested, at most {} supported", count, max)
            }
            AcmError::ForeignParent => f.write_str("parent module belongs to another host"),
            AcmError::UnknownModule => f.write_str("module is not registered"),
            AcmError::InvalidLock { id } => write!(f, "invalid hardware lock {}", id),
            AcmError::Clock(err) => write!(f, "clock error: {}", err),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for AcmError {}

pub type Result<T> = core::result::Result<T, AcmError>;
