//! Narrow interfaces to the hardware and to the execution environment.
//!
//! Responsibilities:
//! - [Clock] and [ClockProvider] stand for the clock tree, including the peripheral
//!   reset line that hangs off each module clock.
//! - [PowerGate] switches power-gate partitions; [MemoryClientControl] fences the
//!   memory controller around a module reset.
//! - [Executor] provides deferred work, wait queues and busy-wait delays.
//!
//! Every primitive may be called while a module lock is held, so implementations
//! must not block for long and must never call back into the manager.
use crate::error::Result;
use alloc::{boxed::Box, sync::Arc};
use core::{
    fmt::{self, Debug, Display},
    time::Duration,
};
use utils::define_id;

#[cfg(feature = "std")]
pub mod thread;

define_id!(
    /// Identifier of an independently powerable region of the chip.
    PartitionId,
    u32
);

// region: Clocks

/// A clock input of a module. Rates are in Hz.
pub trait Clock: Send + Sync + Debug {
    fn enable(&self) -> core::result::Result<(), ClockError>;
    fn disable(&self);
    fn rate(&self) -> u64;
    fn set_rate(&self, rate: u64) -> core::result::Result<(), ClockError>;
    /// Closest rate the hardware can produce for `rate`.
    fn round_rate(&self, rate: u64) -> u64;
    fn reset_assert(&self);
    fn reset_deassert(&self);
}

/// Resolves clock handles by consumer device and clock name.
pub trait ClockProvider: Send + Sync {
    fn get(&self, device: &str, name: &str) -> core::result::Result<Arc<dyn Clock>, ClockError>;
}

/// Failures of the clock primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockError {
    /// No clock is registered under the requested name.
    NotFound,
    /// The clock cannot run at the requested rate.
    RateRejected { rate: u64 },
    /// Driver-specific failure code.
    Hardware { code: i32 },
}

impl Display for ClockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClockError::NotFound => f.write_str("clock not found"),
            ClockError::RateRejected { rate } => write!(f, "rate {} Hz rejected", rate),
            ClockError::Hardware { code } => write!(f, "hardware error {}", code),
        }
    }
}

// endregion

// region: Power gating and memory controller

/// Power-gate control. Both operations are idempotent.
pub trait PowerGate: Send + Sync {
    fn gate(&self, id: PartitionId);
    fn ungate(&self, id: PartitionId);
}

/// Memory-controller support for resetting a partition without in-flight traffic.
pub trait MemoryClientControl: Send + Sync {
    fn disable_client_access(&self, id: PartitionId);
    fn flush_disable(&self, id: PartitionId);
    fn flush_complete(&self, id: PartitionId);
    fn enable_client_access(&self, id: PartitionId);
}

// endregion

// region: Execution

pub type WorkFn = Box<dyn Fn() + Send + Sync>;

/// A task that runs once on a background context after a delay.
pub trait DelayedWork: Send + Sync {
    /// Arm the work to run after `delay`.
    ///
    /// Does nothing and returns `false` if it is already armed. Arming from inside the
    /// running task is allowed and takes effect once the task returns.
    fn schedule(&self, delay: Duration) -> bool;
    /// Disarm the work. A run that already started is not waited for.
    fn cancel(&self) -> bool;
    /// Run an armed instance now and wait until it has completed.
    /// Also waits for a run that is in progress.
    fn flush(&self);
}

/// Lets a context sleep until a condition holds.
pub trait WaitQueue: Send + Sync {
    /// Wait until `cond` returns true or `timeout` elapses. Returns the last value of `cond`.
    ///
    /// `cond` is rechecked after every [WaitQueue::wake_all], so a waker only has to make
    /// the condition true before waking.
    fn wait_until(&self, cond: &mut dyn FnMut() -> bool, timeout: Duration) -> bool;
    fn wake_all(&self);
}

pub trait Executor: Send + Sync {
    fn create_work(&self, name: &str, task: WorkFn) -> Result<Box<dyn DelayedWork>>;
    fn create_wait_queue(&self) -> Box<dyn WaitQueue>;
    /// Busy-wait for `us` microseconds.
    fn udelay(&self, us: u64);
}

// endregion

/// The set of primitives a host drives its modules with.
#[derive(Clone)]
pub struct Platform {
    pub clocks: Arc<dyn ClockProvider>,
    pub powergate: Arc<dyn PowerGate>,
    pub mc: Arc<dyn MemoryClientControl>,
    pub executor: Arc<dyn Executor>,
}

impl Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform").finish_non_exhaustive()
    }
}
