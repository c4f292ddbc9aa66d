//! The host: owner of a set of modules and of everything they share.
//!
//! A [Host] keeps the module registry in registration order, the rate
//! [Negotiator], the hardware lock table and the diagnostics sink. Parents must be
//! registered with the same host before their children, so the registry order is
//! always a valid parent-before-child order.
use crate::{
    config::AcmConfig,
    debug_ex,
    diag::{DiagnosticsSink, IdleReport, IdleReporter, LockUsage, ModuleUsage},
    error::{AcmError, Result},
    module::{Module, ModuleDesc, ModuleHandle},
    platform::Platform,
    rate::Negotiator,
};
use alloc::{boxed::Box, sync::Arc, vec::Vec};
use core::{
    fmt::{self, Debug},
    sync::atomic::{AtomicUsize, Ordering},
};
use log::{error, warn};
use spin::RwLock;

// region: Hardware locks

/// Hold counts of the hardware locks shared between engines.
///
/// The manager does not arbitrate these locks; it only tracks how often each one is
/// held so a stuck suspend can name them.
#[derive(Debug)]
pub struct HwLockTable {
    counts: Vec<AtomicUsize>,
}

impl HwLockTable {
    pub fn new(count: usize) -> Self {
        HwLockTable {
            counts: (0..count).map(|_| AtomicUsize::new(0)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    fn slot(&self, id: usize) -> Result<&AtomicUsize> {
        self.counts.get(id).ok_or(AcmError::InvalidLock { id })
    }

    /// Record one more holder of lock `id`. Returns the new hold count.
    pub fn acquire(&self, id: usize) -> Result<usize> {
        Ok(self.slot(id)?.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Record one holder less of lock `id`. Returns the new hold count.
    pub fn release(&self, id: usize) -> Result<usize> {
        let slot = self.slot(id)?;
        slot.fetch_update(Ordering::AcqRel, Ordering::Acquire, |held| held.checked_sub(1))
            .map(|held| held - 1)
            .map_err(|_| {
                error!("hw lock {} released while not held", id);
                AcmError::InvalidLock { id }
            })
    }

    pub fn held(&self, id: usize) -> Result<usize> {
        Ok(self.slot(id)?.load(Ordering::Acquire))
    }

    /// Every lock with a nonzero hold count, by id.
    pub fn held_locks(&self) -> Vec<LockUsage> {
        self.counts
            .iter()
            .enumerate()
            .filter_map(|(id, held)| match held.load(Ordering::Acquire) {
                0 => None,
                held => Some(LockUsage { id, held }),
            })
            .collect()
    }
}

// endregion

pub struct Host {
    platform: Arc<Platform>,
    config: AcmConfig,
    modules: RwLock<Vec<ModuleHandle>>,
    negotiator: Negotiator,
    hw_locks: HwLockTable,
    sink: Arc<dyn DiagnosticsSink>,
}

impl Host {
    pub fn new(platform: Platform, config: AcmConfig, sink: Arc<dyn DiagnosticsSink>) -> Self {
        Host {
            platform: Arc::new(platform),
            config,
            modules: RwLock::new(Vec::new()),
            negotiator: Negotiator::new(),
            hw_locks: HwLockTable::new(config.hw_locks),
            sink,
        }
    }

    pub fn config(&self) -> &AcmConfig {
        &self.config
    }

    pub fn negotiator(&self) -> &Negotiator {
        &self.negotiator
    }

    pub fn hw_locks(&self) -> &HwLockTable {
        &self.hw_locks
    }

    /// Registered modules in registration order.
    pub fn modules(&self) -> Vec<ModuleHandle> {
        self.modules.read().clone()
    }

    pub fn module(&self, name: &str) -> Option<ModuleHandle> {
        self.modules
            .read()
            .iter()
            .find(|m| m.name() == name)
            .cloned()
    }

    fn is_registered(&self, module: &ModuleHandle) -> bool {
        self.modules.read().iter().any(|m| m.ptr_eq(module))
    }

    /// Create and register a module.
    ///
    /// `parent` must already be registered with this host.
    pub fn init_module(
        &self,
        name: &str,
        desc: Arc<ModuleDesc>,
        parent: Option<&ModuleHandle>,
    ) -> Result<ModuleHandle> {
        if let Some(parent) = parent {
            if !self.is_registered(parent) {
                error!("{}: parent {} is not registered here", name, parent.name());
                return Err(AcmError::ForeignParent);
            }
        }
        self.modules
            .write()
            .try_reserve(1)
            .map_err(|_| AcmError::OutOfMemory)?;

        let module = Module::new(name, desc, parent, self.platform.clone(), self.config)?;
        self.modules.write().push(module.clone());
        Ok(module)
    }

    /// Tear a module down: `deinit` hook, forced suspend, clients dropped.
    ///
    /// The module leaves the registry even if the suspend fails; the suspend error is
    /// returned afterwards. Clocks are released once the last handle is dropped.
    pub fn deinit_module(&self, module: &ModuleHandle) -> Result<()> {
        if !self.is_registered(module) {
            return Err(AcmError::UnknownModule);
        }
        module.desc().hooks.deinit(module);
        let res = self.suspend(module, false);
        self.negotiator.forget(module.id());
        self.modules.write().retain(|m| !m.ptr_eq(module));
        debug_ex!("{}: deinitialized", module.name());
        res
    }

    /// Wait for `module` to go idle and suspend it. See [Module::suspend].
    pub fn suspend(&self, module: &Module, system_suspend: bool) -> Result<()> {
        module.suspend(system_suspend, self)
    }

    /// Suspend every module, children before parents.
    ///
    /// Modules without a parent are suspended as part of a system suspend. Every
    /// module is processed; the first error is returned.
    pub fn suspend_all(&self) -> Result<()> {
        let mut res = Ok(());
        for module in self.modules().iter().rev() {
            let err = self.suspend(module, !module.has_parent());
            if res.is_ok() {
                res = err;
            }
        }
        res
    }

    /// Snapshot of every module and held lock, blaming `waiting_on`.
    pub fn idle_report(&self, waiting_on: &Module) -> IdleReport {
        IdleReport {
            waiting_on: Box::from(waiting_on.name()),
            cause: AcmError::SuspendTimeout,
            modules: self
                .modules
                .read()
                .iter()
                .map(|m| ModuleUsage::of(m))
                .collect(),
            locks: self.hw_locks.held_locks(),
        }
    }
}

impl IdleReporter for Host {
    fn report_busy(&self) {
        for module in self.modules.read().iter() {
            warn!("{}: refcount {}", module.name(), module.refcount());
        }
        let held = self.hw_locks.held_locks();
        if held.is_empty() {
            debug_ex!("all hw locks released");
        }
        for lock in held.iter() {
            warn!("hw lock {}: held {} time(s)", lock.id, lock.held);
        }
    }

    fn report_timeout(&self, module: &Module) {
        self.sink.report(&self.idle_report(module));
    }
}

impl Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("config", &self.config)
            .field("modules", &self.modules.read().len())
            .field("hw_locks", &self.hw_locks.len())
            .finish_non_exhaustive()
    }
}
