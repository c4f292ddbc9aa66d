//! Configurations for the clock/power manager.
//! The values are fixed at build time from the workspace `flags.json`, so that a
//! board can retune them without touching the manager itself.

#![no_std]
#![deny(missing_docs)]
#![deny(warnings)]

use core::time::Duration;

/// Raw flags generated by the build script.
pub mod build_flags {
    #![allow(missing_docs)]
    include!(concat!(env!("OUT_DIR"), "/build_flags.rs"));
}

pub use build_flags::{MAX_CLOCKS, MAX_POWERGATE_IDS, NUM_HW_LOCKS};

/// How long a suspend waits for a module to become idle before dumping diagnostics.
pub const fn suspend_idle_timeout() -> Duration {
    Duration::from_millis(build_flags::SUSPEND_IDLE_TIMEOUT_MS as u64)
}

/// Settle time between asserting and releasing a module reset, in microseconds.
pub const fn powergate_delay_us() -> u64 {
    build_flags::POWERGATE_DELAY_US as u64
}
