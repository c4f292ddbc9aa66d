//! Diagnostics for suspends that cannot make progress.
//!
//! When a suspend is asked for while modules are still busy, the host logs every
//! module's refcount and the hardware locks still held. When the quiescence wait
//! times out, an [IdleReport] is handed to the host's [DiagnosticsSink].
use crate::{error::AcmError, module::Module};
use alloc::{boxed::Box, vec::Vec};
use log::warn;

/// Refcount and power state of one module at report time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleUsage {
    pub name: Box<str>,
    pub refcount: usize,
    pub powered: bool,
}

impl ModuleUsage {
    pub fn of(module: &Module) -> Self {
        ModuleUsage {
            name: Box::from(module.name()),
            refcount: module.refcount(),
            powered: module.is_powered(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockUsage {
    pub id: usize,
    pub held: usize,
}

/// Snapshot taken when a suspend gave up waiting for a module.
#[derive(Debug, Clone)]
pub struct IdleReport {
    /// The module the suspend was waiting on.
    pub waiting_on: Box<str>,
    pub cause: AcmError,
    /// Every module of the host, in registration order.
    pub modules: Vec<ModuleUsage>,
    /// Hardware locks with a nonzero hold count.
    pub locks: Vec<LockUsage>,
}

/// Consumer of idle-timeout reports.
pub trait DiagnosticsSink: Send + Sync {
    fn report(&self, report: &IdleReport);
}

/// Writes reports to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticsSink for LogSink {
    fn report(&self, report: &IdleReport) {
        warn!("{} while waiting on {}", report.cause, report.waiting_on);
        for usage in report.modules.iter() {
            warn!(
                "  {}: refcount {}, {}",
                usage.name,
                usage.refcount,
                if usage.powered { "powered" } else { "off" }
            );
        }
        for lock in report.locks.iter() {
            warn!("  hw lock {} held {} time(s)", lock.id, lock.held);
        }
    }
}

/// Whoever drives a suspend and can describe the rest of the system.
pub trait IdleReporter {
    /// A system suspend started while the module was busy.
    fn report_busy(&self);
    /// The quiescence wait on `module` timed out.
    fn report_timeout(&self, module: &Module);
}
