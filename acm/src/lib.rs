//! Automatic clock/power management for multi-engine SoCs.
//!
//! Every engine block ("module") is kept powered only while somebody holds a busy
//! reference on it. When the last reference goes away the module is powered down
//! after a grace period, on the executor's background context, and the power
//! dependency on its parent is released. Clients of a module negotiate clock rates
//! through the host's [rate::Negotiator].
//!
//! The manager never touches hardware directly; clocks, power-gate partitions and
//! the memory controller are reached through the traits in [platform].
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

#[macro_use]
pub mod logging;

pub mod config;
pub mod diag;
pub mod error;
pub mod host;
pub mod module;
pub mod platform;
pub mod rate;

pub use config::AcmConfig;
pub use error::{AcmError, Result};
pub use host::{Host, HwLockTable};
pub use module::{ClockDesc, Module, ModuleDesc, ModuleHandle, ModuleHooks, ModuleRef, NoHooks};
pub use rate::{ClientId, Negotiator};
