//! Busy/idle reference counting, the deferred power-down and the suspend-time
//! quiescence wait.
//!
//! A module powers on synchronously on the 0→1 transition of its refcount, after
//! its parent. Reaching zero arms the power-down, which runs on the executor once
//! the grace period elapses: it re-checks that the module is still idle, asks the
//! driver to prepare, and either powers off and releases the parent or, if the
//! preparation failed, arms itself again for another grace period.
use super::Module;
use crate::{
    debug_ex,
    diag::IdleReporter,
    error::{AcmError, Result},
};
use core::sync::atomic::{AtomicUsize, Ordering};
use log::{error, warn};

/// Arming of the deferred power-down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Powerdown {
    Disarmed,
    /// Armed by the refcount reaching zero.
    Armed,
    /// Armed again after `attempts` consecutive failed preparations.
    Retrying { attempts: u32 },
}

/// Snapshot of a module's power transition counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PowerStats {
    pub power_ons: usize,
    pub power_offs: usize,
    pub prepare_failures: usize,
}

#[derive(Debug, Default)]
pub(super) struct Stats {
    power_ons: AtomicUsize,
    power_offs: AtomicUsize,
    prepare_failures: AtomicUsize,
}

impl Module {
    /// Take a busy reference, powering the module (and its parent chain) on if needed.
    ///
    /// Cancels a pending power-down. If the power-down is already running, this waits
    /// on the module lock until it has finished and then powers on again.
    pub fn busy(&self) {
        let mut state = self.state.lock();
        self.powerdown.cancel();
        state.powerdown = Powerdown::Disarmed;
        self.desc.hooks.busy(self);

        let refs = self.refcount.fetch_add(1, Ordering::AcqRel) + 1;
        if refs == 1 && !self.is_powered() {
            if let Some(parent) = self.parent() {
                parent.busy();
            } else if self.parent.is_some() {
                error!("{}: parent module is gone, powering on alone", self.name);
            }
            debug_ex!("{}: powering on", self.name);
            self.power_on();
            self.powered.store(true, Ordering::Release);
            self.stats.power_ons.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Drop one busy reference.
    pub fn idle(&self) -> Result<()> {
        self.idle_mult(1)
    }

    /// Drop `refs` busy references at once.
    ///
    /// Reaching zero arms the power-down, wakes suspend waiters and calls the idle hook.
    /// Dropping more references than are held fails with
    /// [AcmError::RefcountUnderflow] and changes nothing.
    pub fn idle_mult(&self, refs: usize) -> Result<()> {
        if refs == 0 {
            return Ok(());
        }
        {
            let mut state = self.state.lock();
            let current = self.refcount.load(Ordering::Acquire);
            let Some(remaining) = current.checked_sub(refs) else {
                error!(
                    "{}: idle({}) with only {} busy reference(s)",
                    self.name, refs, current
                );
                return Err(AcmError::RefcountUnderflow {
                    refcount: current,
                    requested: refs,
                });
            };
            if remaining == 0 && !self.is_powered() {
                error!("{}: went idle while unpowered", self.name);
                return Err(AcmError::NotPowered);
            }
            if remaining != 0 {
                self.refcount.store(remaining, Ordering::Release);
                return Ok(());
            }
            // armed before the count is published, so a waiter seeing zero can flush it
            self.powerdown.schedule(self.desc.powerdown_delay);
            state.powerdown = Powerdown::Armed;
            self.refcount.store(0, Ordering::Release);
        }

        self.idle_wq.wake_all();
        self.desc.hooks.idle(self);
        Ok(())
    }

    /// Body of the deferred power-down.
    pub(crate) fn powerdown_work(&self) {
        let mut state = self.state.lock();
        if self.refcount() != 0 || !self.is_powered() {
            return;
        }

        if let Err(err) = self.desc.hooks.prepare_poweroff(self) {
            let attempts = match state.powerdown {
                Powerdown::Retrying { attempts } => attempts.saturating_add(1),
                _ => 1,
            };
            state.powerdown = Powerdown::Retrying { attempts };
            self.stats.prepare_failures.fetch_add(1, Ordering::Relaxed);
            warn!(
                "{}: cannot power off ({}), retry #{} in {:?}",
                self.name, err, attempts, self.desc.powerdown_delay
            );
            self.powerdown.schedule(self.desc.powerdown_delay);
            return;
        }

        debug_ex!("{}: powering off", self.name);
        self.power_off();
        self.powered.store(false, Ordering::Release);
        state.powerdown = Powerdown::Disarmed;
        self.stats.power_offs.fetch_add(1, Ordering::Relaxed);

        if let Some(parent) = self.parent() {
            if let Err(err) = parent.idle() {
                error!("{}: cannot release parent {}: {}", self.name, parent.name(), err);
            }
        }
    }

    /// Current arming of the power-down. Takes the module lock, so not for hooks.
    pub fn powerdown_state(&self) -> Powerdown {
        self.state.lock().powerdown
    }

    pub fn stats(&self) -> PowerStats {
        PowerStats {
            power_ons: self.stats.power_ons.load(Ordering::Relaxed),
            power_offs: self.stats.power_offs.load(Ordering::Relaxed),
            prepare_failures: self.stats.prepare_failures.load(Ordering::Relaxed),
        }
    }

    /// Wait for the module to go idle, finish any pending power-down and suspend it.
    ///
    /// The wait is bounded by the host's suspend timeout. Timing out is reported through
    /// `reporter` but does not stop the suspend. Returns [AcmError::StillPowered] if the
    /// module did not end up unpowered.
    pub fn suspend(&self, system_suspend: bool, reporter: &dyn IdleReporter) -> Result<()> {
        if system_suspend && !self.is_idle() {
            reporter.report_busy();
        }

        let quiescent = self
            .idle_wq
            .wait_until(&mut || self.is_idle(), self.config.suspend_idle_timeout);
        if !quiescent {
            warn!(
                "{}: still busy after {:?} (refcount {})",
                self.name,
                self.config.suspend_idle_timeout,
                self.refcount()
            );
            reporter.report_timeout(self);
        }
        if system_suspend {
            debug_ex!("{}: entered idle", self.name);
        }

        self.powerdown.flush();
        if system_suspend {
            debug_ex!("{}: flushed delayed work", self.name);
        }

        self.desc.hooks.suspend(self);

        if self.is_powered() {
            error!("{}: still powered after suspend", self.name);
            return Err(AcmError::StillPowered);
        }
        Ok(())
    }

    // region: Clock access

    /// Read the rate of clock `index`, keeping the module powered for the access.
    pub fn clock_rate(&self, index: usize) -> Result<u64> {
        let clk = self.clock(index)?;
        self.busy();
        let rate = clk.rate();
        self.idle()?;
        Ok(rate)
    }

    /// Program clock `index` directly, keeping the module powered for the access.
    ///
    /// This bypasses negotiation; the next negotiation event overrides it.
    pub fn set_clock_rate(&self, index: usize, rate: u64) -> Result<()> {
        let clk = self.clock(index)?;
        self.busy();
        let res = clk.set_rate(rate);
        self.idle()?;
        res.map_err(AcmError::from)
    }

    // endregion
}

impl Drop for Module {
    /// The power-down cannot run once the last handle is gone, so a module dropped
    /// while powered is powered off here and its reference on the parent released.
    fn drop(&mut self) {
        self.powerdown.cancel();
        if !self.is_powered() {
            return;
        }
        let refs = self.refcount();
        if refs != 0 {
            error!("{}: dropped with {} busy reference(s)", self.name, refs);
        }
        if let Err(err) = self.desc.hooks.prepare_poweroff(self) {
            warn!("{}: powering off regardless ({})", self.name, err);
        }
        self.power_off();
        self.powered.store(false, Ordering::Release);
        self.refcount.store(0, Ordering::Release);
        self.state.get_mut().powerdown = Powerdown::Disarmed;
        self.stats.power_offs.fetch_add(1, Ordering::Relaxed);
        debug_ex!("{}: powered off on drop", self.name);

        if let Some(parent) = self.parent() {
            if let Err(err) = parent.idle() {
                error!("{}: cannot release parent {}: {}", self.name, parent.name(), err);
            }
        }
    }
}
