//! Per-client clock rate negotiation.
//!
//! Every client of a module keeps a requested rate for each of the module's clocks.
//! The rate programmed into a clock is the highest request among the module's
//! clients, or the clock's rounded default when no client asks for more than 0 (no
//! preference). Any change to the client set or to a request recomputes and
//! reprograms the affected clocks.
//!
//! One lock guards the client lists of every module. It is taken after the module
//! lock and never the other way round: the negotiator does not take module locks.
use crate::{
    error::{AcmError, Result},
    module::{Module, ModuleId},
};
use alloc::{collections::BTreeMap, vec::Vec};
use log::warn;
use spin::Mutex;
use utils::define_id;

define_id!(
    /// Opaque identity of a rate client, chosen by the caller.
    ClientId,
    usize
);

#[derive(Debug)]
struct Client {
    id: ClientId,
    /// Requested rate per clock index, already rounded. 0 is no preference.
    rates: Vec<u64>,
}

#[derive(Debug, Default)]
pub struct Negotiator {
    clients: Mutex<BTreeMap<ModuleId, Vec<Client>>>,
}

impl Negotiator {
    pub const fn new() -> Self {
        Negotiator {
            clients: Mutex::new(BTreeMap::new()),
        }
    }

    /// Register `client` with `module`, requesting the default rate on every clock.
    ///
    /// The hardware is not touched: defaults never exceed what is already programmed
    /// for a module without clients.
    pub fn add_client(&self, module: &Module, client: ClientId) -> Result<()> {
        let mut rates = Vec::new();
        rates
            .try_reserve_exact(module.num_clocks())
            .map_err(|_| AcmError::OutOfMemory)?;
        for index in 0..module.num_clocks() {
            rates.push(module.default_rate(index)?);
        }

        let mut clients = self.clients.lock();
        let list = clients.entry(module.id()).or_default();
        list.try_reserve(1).map_err(|_| AcmError::OutOfMemory)?;
        list.push(Client { id: client, rates });
        Ok(())
    }

    /// Unregister `client` and reprogram every clock of `module` without its requests.
    ///
    /// Unknown clients are ignored.
    pub fn remove_client(&self, module: &Module, client: ClientId) {
        let mut clients = self.clients.lock();
        let Some(list) = clients.get_mut(&module.id()) else {
            return;
        };
        let Some(pos) = list.iter().position(|c| c.id == client) else {
            return;
        };
        list.remove(pos);
        if list.is_empty() {
            clients.remove(&module.id());
        }

        let list = clients.get(&module.id()).map(Vec::as_slice).unwrap_or(&[]);
        for index in 0..module.num_clocks() {
            if let Err(err) = Self::apply(module, list, index) {
                warn!(
                    "{}: cannot reprogram clock {} after client {} left: {}",
                    module.name(),
                    index,
                    client,
                    err
                );
            }
        }
    }

    /// Record `rate` as `client`'s request for clock `index` and reprogram that clock.
    ///
    /// The request is rounded before it is stored. The clock is reprogrammed even if
    /// `client` is not registered, in which case nothing is recorded.
    pub fn set_rate(
        &self,
        module: &Module,
        client: ClientId,
        rate: u64,
        index: usize,
    ) -> Result<()> {
        let clk = module.clock(index)?;
        let mut clients = self.clients.lock();
        let list = clients.get_mut(&module.id());
        if let Some(entry) = list
            .and_then(|list| list.iter_mut().find(|c| c.id == client))
            .and_then(|c| c.rates.get_mut(index))
        {
            *entry = clk.round_rate(rate);
        }

        let list = clients.get(&module.id()).map(Vec::as_slice).unwrap_or(&[]);
        Self::apply(module, list, index)
    }

    /// The rate clock `index` should run at given the current requests.
    pub fn effective_rate(&self, module: &Module, index: usize) -> Result<u64> {
        module.clock(index)?;
        let clients = self.clients.lock();
        let list = clients.get(&module.id()).map(Vec::as_slice).unwrap_or(&[]);
        Self::compute(module, list, index)
    }

    pub fn client_count(&self, module: &Module) -> usize {
        self.clients
            .lock()
            .get(&module.id())
            .map_or(0, Vec::len)
    }

    /// Drop every client of a module that is being torn down.
    pub(crate) fn forget(&self, module: ModuleId) {
        self.clients.lock().remove(&module);
    }

    /// Highest request, or the rounded default when nobody asks for more than 0.
    fn compute(module: &Module, list: &[Client], index: usize) -> Result<u64> {
        let rate = list
            .iter()
            .filter_map(|c| c.rates.get(index).copied())
            .max()
            .unwrap_or(0);
        match rate {
            0 => module.default_rate(index),
            rate => Ok(rate),
        }
    }

    /// Program the negotiated rate, even if it equals the current one.
    fn apply(module: &Module, list: &[Client], index: usize) -> Result<()> {
        let rate = Self::compute(module, list, index)?;
        module.clock(index)?.set_rate(rate)?;
        Ok(())
    }
}
