//! Modules: the engine blocks whose power and clocks are managed.
//!
//! A [Module] is created from an immutable [ModuleDesc] by [crate::Host::init_module]
//! and handed out as a [ModuleHandle]. Its children refer to it through a weak
//! [ModuleRef], so the parent chain never keeps anything alive.
//!
//! Locking: the per-module lock guards the power-down arming and serializes every
//! power transition. The refcount and the `powered` flag live in atomics that are
//! written only under that lock, so hooks and diagnostics may read them freely.
//! Lock order is module, then its parent, then the negotiation lock.
use crate::{
    config::AcmConfig,
    debug_ex,
    error::{AcmError, Result},
    platform::{Clock, DelayedWork, PartitionId, Platform, WaitQueue},
};
use alloc::{boxed::Box, format, sync::Arc, vec::Vec};
use core::{
    fmt::{self, Debug},
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::Duration,
};
use log::warn;
use spin::{Mutex, Once};
use utils::define_id;

mod handle;
mod lifecycle;
mod power;

pub use handle::{ModuleHandle, ModuleRef};
pub use lifecycle::{PowerStats, Powerdown};

define_id!(
    /// Host-unique identity of a module.
    ModuleId,
    usize
);

static NEXT_MODULE_ID: AtomicUsize = AtomicUsize::new(0);

// region: Descriptor

/// A clock input as declared by the descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockDesc {
    pub name: &'static str,
    /// Rate used when no client has asked for anything, in Hz.
    pub default_rate: u64,
}

/// Callbacks a module driver may hook into its power transitions.
///
/// [ModuleHooks::busy], [ModuleHooks::finalize_poweron] and
/// [ModuleHooks::prepare_poweroff] run with the module lock held, so they must not
/// call [Module::busy] or [Module::idle] on the same module.
pub trait ModuleHooks: Send + Sync {
    fn init(&self, _module: &Module) {}
    fn deinit(&self, _module: &Module) {}
    /// Every `busy` call, before the refcount is taken.
    fn busy(&self, _module: &Module) {}
    /// The refcount dropped to zero.
    fn idle(&self, _module: &Module) {}
    /// Power and clocks are up; restore the engine state.
    fn finalize_poweron(&self, _module: &Module) {}
    /// Save the engine state before power goes away. An error postpones the power-off
    /// by one grace period.
    fn prepare_poweroff(&self, _module: &Module) -> Result<()> {
        Ok(())
    }
    fn suspend(&self, _module: &Module) {}
}

/// Hooks of a module that needs none.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl ModuleHooks for NoHooks {}

/// Static configuration of a module.
#[derive(Clone)]
pub struct ModuleDesc {
    pub clocks: Vec<ClockDesc>,
    pub powergate_ids: [Option<PartitionId>; ::config::MAX_POWERGATE_IDS],
    /// Whether the partitions are switched off while the module is idle.
    /// Partitions of modules that cannot power-gate are ungated for good at init.
    pub can_powergate: bool,
    /// Grace period between going idle and powering down.
    pub powerdown_delay: Duration,
    pub hooks: Arc<dyn ModuleHooks>,
}

impl Default for ModuleDesc {
    fn default() -> Self {
        ModuleDesc {
            clocks: Vec::new(),
            powergate_ids: [None; ::config::MAX_POWERGATE_IDS],
            can_powergate: false,
            powerdown_delay: Duration::ZERO,
            hooks: Arc::new(NoHooks),
        }
    }
}

impl Debug for ModuleDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDesc")
            .field("clocks", &self.clocks)
            .field("powergate_ids", &self.powergate_ids)
            .field("can_powergate", &self.can_powergate)
            .field("powerdown_delay", &self.powerdown_delay)
            .finish_non_exhaustive()
    }
}

// endregion

/// State guarded by the module lock.
#[derive(Debug)]
pub(crate) struct PowerState {
    pub(crate) powerdown: Powerdown,
}

pub struct Module {
    id: ModuleId,
    name: Box<str>,
    desc: Arc<ModuleDesc>,
    platform: Arc<Platform>,
    config: AcmConfig,
    clocks: Vec<Arc<dyn Clock>>,
    parent: Option<ModuleRef>,
    refcount: AtomicUsize,
    powered: AtomicBool,
    state: Mutex<PowerState>,
    stats: lifecycle::Stats,
    powerdown: Box<dyn DelayedWork>,
    idle_wq: Box<dyn WaitQueue>,
}

impl Module {
    /// Resolve the clocks, allocate the deferred power-down and bind the parent.
    ///
    /// Every clock is programmed to its rounded default rate, enabled only for the
    /// duration of the write. The module starts unpowered with a zero refcount.
    pub(crate) fn new(
        name: &str,
        desc: Arc<ModuleDesc>,
        parent: Option<&ModuleHandle>,
        platform: Arc<Platform>,
        config: AcmConfig,
    ) -> Result<ModuleHandle> {
        if desc.clocks.len() > ::config::MAX_CLOCKS {
            return Err(AcmError::TooManyClocks {
                count: desc.clocks.len(),
                max: ::config::MAX_CLOCKS,
            });
        }

        let mut clocks: Vec<Arc<dyn Clock>> = Vec::new();
        clocks
            .try_reserve_exact(desc.clocks.len())
            .map_err(|_| AcmError::OutOfMemory)?;
        for clk_desc in desc.clocks.iter() {
            let clk = platform.clocks.get(name, clk_desc.name)?;
            let rate = clk.round_rate(clk_desc.default_rate);
            clk.enable()?;
            if let Err(err) = clk.set_rate(rate) {
                warn!("{}: cannot set {} to {} Hz: {}", name, clk_desc.name, rate, err);
            }
            clk.disable();
            clocks.push(clk);
        }

        let owner: Arc<Once<ModuleRef>> = Arc::new(Once::new());
        let task_owner = owner.clone();
        let powerdown = platform.executor.create_work(
            &format!("{}-powerdown", name),
            Box::new(move || {
                if let Some(module) = task_owner.get().and_then(ModuleRef::get_handle) {
                    module.powerdown_work();
                }
            }),
        )?;
        let idle_wq = platform.executor.create_wait_queue();

        if !desc.can_powergate {
            for id in desc.powergate_ids.iter().flatten() {
                platform.powergate.ungate(*id);
            }
        }

        let module = ModuleHandle::from(Arc::new(Module {
            id: ModuleId::new(NEXT_MODULE_ID.fetch_add(1, Ordering::Relaxed)),
            name: Box::from(name),
            desc,
            platform,
            config,
            clocks,
            parent: parent.map(ModuleHandle::create_ref),
            refcount: AtomicUsize::new(0),
            powered: AtomicBool::new(false),
            state: Mutex::new(PowerState {
                powerdown: Powerdown::Disarmed,
            }),
            stats: lifecycle::Stats::default(),
            powerdown,
            idle_wq,
        }));
        owner.call_once(|| module.create_ref());

        debug_ex!(
            "{}: initialized with {} clock(s), parent {:?}",
            module.name(),
            module.num_clocks(),
            parent.map(|p| p.name())
        );
        module.desc.hooks.init(&module);
        Ok(module)
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn desc(&self) -> &ModuleDesc {
        &self.desc
    }

    pub fn refcount(&self) -> usize {
        self.refcount.load(Ordering::Acquire)
    }

    pub fn is_powered(&self) -> bool {
        self.powered.load(Ordering::Acquire)
    }

    pub fn is_idle(&self) -> bool {
        self.refcount() == 0
    }

    pub fn clocks(&self) -> &[Arc<dyn Clock>] {
        &self.clocks
    }

    pub fn num_clocks(&self) -> usize {
        self.clocks.len()
    }

    /// The clock handle at `index`.
    pub fn clock(&self, index: usize) -> Result<&Arc<dyn Clock>> {
        self.clocks
            .get(index)
            .ok_or(AcmError::InvalidClock { index })
    }

    /// Descriptor default rate of clock `index`, rounded by the clock.
    pub fn default_rate(&self, index: usize) -> Result<u64> {
        let clk = self.clock(index)?;
        let desc = self
            .desc
            .clocks
            .get(index)
            .ok_or(AcmError::InvalidClock { index })?;
        Ok(clk.round_rate(desc.default_rate))
    }

    pub fn has_parent(&self) -> bool {
        self.parent.is_some()
    }

    /// The parent module, if there is one and it is still alive.
    pub fn parent(&self) -> Option<ModuleHandle> {
        self.parent.as_ref().and_then(ModuleRef::get_handle)
    }
}

impl Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("refcount", &self.refcount())
            .field("powered", &self.is_powered())
            .field("clocks", &self.clocks.len())
            .finish_non_exhaustive()
    }
}
