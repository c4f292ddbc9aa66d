//! Physical power sequencing of a module: partitions, clocks and the reset pulse.
use super::Module;
use crate::{
    debug_ex,
    error::Result,
    platform::{Clock, PartitionId},
};
use alloc::sync::Arc;
use log::warn;

impl Module {
    fn unpowergate(&self) {
        if self.desc.can_powergate {
            for id in self.desc.powergate_ids.iter().flatten() {
                self.platform.powergate.ungate(*id);
            }
        }
    }

    fn powergate(&self) {
        if self.desc.can_powergate {
            for id in self.desc.powergate_ids.iter().flatten() {
                self.platform.powergate.gate(*id);
            }
        }
    }

    fn clock_enable(&self) {
        for (clk, desc) in self.clocks.iter().zip(self.desc.clocks.iter()) {
            if let Err(err) = clk.enable() {
                warn!("{}: cannot enable clock {}: {}", self.name, desc.name, err);
            }
        }
    }

    fn clock_disable(&self) {
        for clk in self.clocks.iter() {
            clk.disable();
        }
    }

    /// Power-on sequence. Called with the module lock held.
    pub(super) fn power_on(&self) {
        self.unpowergate();
        self.clock_enable();
        self.desc.hooks.finalize_poweron(self);
    }

    /// Power-off sequence. Called with the module lock held, after a successful prepare.
    pub(super) fn power_off(&self) {
        self.clock_disable();
        self.powergate();
    }

    /// Reset domains: each present partition paired with the clock in the same slot.
    fn reset_domains(&self) -> impl Iterator<Item = (PartitionId, &Arc<dyn Clock>)> + '_ {
        self.desc
            .powergate_ids
            .iter()
            .enumerate()
            .filter_map(|(slot, id)| Some(((*id)?, self.clocks.get(slot)?)))
    }

    /// Pulse the reset of every partition of the module.
    ///
    /// Memory-client access to a partition is cut and flushed before its reset is
    /// asserted, and only restored after the reset is released, so no bus transaction
    /// reaches the engine mid-reset. Fails with [crate::AcmError::InvalidClock] before
    /// touching hardware if a partition has no clock in its slot.
    pub fn reset(&self) -> Result<()> {
        for (slot, id) in self.desc.powergate_ids.iter().enumerate() {
            if id.is_some() {
                self.clock(slot)?;
            }
        }
        debug_ex!(
            "{}: asserting module reset ({:?})",
            self.name,
            self.desc.powergate_ids
        );

        let mc = &self.platform.mc;
        for (id, clk) in self.reset_domains() {
            mc.disable_client_access(id);
            clk.reset_assert();
            mc.flush_disable(id);
        }

        self.platform.executor.udelay(self.config.reset_settle_us);

        for (id, clk) in self.reset_domains() {
            mc.flush_complete(id);
            clk.reset_deassert();
            mc.enable_client_access(id);
        }

        debug_ex!("{}: module out of reset", self.name);
        Ok(())
    }
}
