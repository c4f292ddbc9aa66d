//! Runtime knobs of a [crate::Host]. Defaults come from the build-time flags.

use core::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcmConfig {
    /// Upper bound on the quiescence wait of a suspend.
    pub suspend_idle_timeout: Duration,
    /// Settle time between asserting and releasing a module reset.
    pub reset_settle_us: u64,
    /// Number of hardware locks tracked for diagnostics.
    pub hw_locks: usize,
}

impl Default for AcmConfig {
    fn default() -> Self {
        AcmConfig {
            suspend_idle_timeout: ::config::suspend_idle_timeout(),
            reset_settle_us: ::config::powergate_delay_us(),
            hw_locks: ::config::NUM_HW_LOCKS,
        }
    }
}

impl AcmConfig {
    pub fn with_suspend_timeout(mut self, timeout: Duration) -> Self {
        self.suspend_idle_timeout = timeout;
        self
    }
}
