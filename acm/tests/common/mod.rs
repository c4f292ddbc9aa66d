//! Fake hardware and a deterministic executor shared by the integration tests.
#![allow(dead_code)]

use acm::{
    AcmConfig, AcmError, Host, Module, ModuleDesc, ModuleHooks,
    diag::{DiagnosticsSink, IdleReport},
    platform::{
        Clock, ClockError, ClockProvider, DelayedWork, Executor, MemoryClientControl,
        PartitionId, Platform, PowerGate, WaitQueue, WorkFn,
    },
    ClockDesc,
};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    ClockEnable(String),
    ClockDisable(String),
    SetRate(String, u64),
    ResetAssert(String),
    ResetDeassert(String),
    Gate(u32),
    Ungate(u32),
    McDisable(u32),
    McFlush(u32),
    McFlushDone(u32),
    McEnable(u32),
    Udelay(u64),
    Hook(String, &'static str),
}

pub fn hook(module: &str, name: &'static str) -> Event {
    Event::Hook(module.to_string(), name)
}

#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
    pub fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    pub fn snapshot(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    /// Return and forget everything recorded so far.
    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }

    pub fn count(&self, event: &Event) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == event).count()
    }

    pub fn position(&self, event: &Event) -> Option<usize> {
        self.0.lock().unwrap().iter().position(|e| e == event)
    }

    pub fn set_rates(&self, clock: &str) -> Vec<u64> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Event::SetRate(name, rate) if name == clock => Some(*rate),
                _ => None,
            })
            .collect()
    }
}

// region: Clocks

#[derive(Debug)]
pub struct FakeClock {
    name: String,
    step: u64,
    rate: AtomicU64,
    enabled: AtomicUsize,
    pub fail_set_rate: AtomicBool,
    log: EventLog,
}

impl FakeClock {
    pub fn rate_now(&self) -> u64 {
        self.rate.load(Ordering::SeqCst)
    }

    pub fn enable_count(&self) -> usize {
        self.enabled.load(Ordering::SeqCst)
    }
}

impl Clock for FakeClock {
    fn enable(&self) -> Result<(), ClockError> {
        self.enabled.fetch_add(1, Ordering::SeqCst);
        self.log.push(Event::ClockEnable(self.name.clone()));
        Ok(())
    }

    fn disable(&self) {
        self.enabled.fetch_sub(1, Ordering::SeqCst);
        self.log.push(Event::ClockDisable(self.name.clone()));
    }

    fn rate(&self) -> u64 {
        self.rate.load(Ordering::SeqCst)
    }

    fn set_rate(&self, rate: u64) -> Result<(), ClockError> {
        if self.fail_set_rate.load(Ordering::SeqCst) {
            return Err(ClockError::RateRejected { rate });
        }
        self.rate.store(rate, Ordering::SeqCst);
        self.log.push(Event::SetRate(self.name.clone(), rate));
        Ok(())
    }

    fn round_rate(&self, rate: u64) -> u64 {
        rate - rate % self.step
    }

    fn reset_assert(&self) {
        self.log.push(Event::ResetAssert(self.name.clone()));
    }

    fn reset_deassert(&self) {
        self.log.push(Event::ResetDeassert(self.name.clone()));
    }
}

/// Hands out one [FakeClock] per `device.name`, created on first lookup.
#[derive(Debug, Default)]
pub struct FakeClockProvider {
    clocks: Mutex<BTreeMap<String, Arc<FakeClock>>>,
    steps: Mutex<BTreeMap<String, u64>>,
    missing: Mutex<BTreeSet<String>>,
    log: EventLog,
}

impl FakeClockProvider {
    pub fn set_step(&self, clock: &str, step: u64) {
        self.steps.lock().unwrap().insert(clock.to_string(), step);
    }

    pub fn set_missing(&self, clock: &str) {
        self.missing.lock().unwrap().insert(clock.to_string());
    }

    pub fn clock(&self, clock: &str) -> Arc<FakeClock> {
        self.clocks.lock().unwrap()[clock].clone()
    }
}

impl ClockProvider for FakeClockProvider {
    fn get(&self, device: &str, name: &str) -> Result<Arc<dyn Clock>, ClockError> {
        let full = format!("{}.{}", device, name);
        if self.missing.lock().unwrap().contains(&full) {
            return Err(ClockError::NotFound);
        }
        let step = self.steps.lock().unwrap().get(&full).copied().unwrap_or(1);
        let clk = self
            .clocks
            .lock()
            .unwrap()
            .entry(full.clone())
            .or_insert_with(|| {
                Arc::new(FakeClock {
                    name: full,
                    step,
                    rate: AtomicU64::new(0),
                    enabled: AtomicUsize::new(0),
                    fail_set_rate: AtomicBool::new(false),
                    log: self.log.clone(),
                })
            })
            .clone();
        Ok(clk)
    }
}

// endregion

// region: Power gate and memory controller

#[derive(Debug)]
pub struct FakePowerGate(EventLog);

impl PowerGate for FakePowerGate {
    fn gate(&self, id: PartitionId) {
        self.0.push(Event::Gate(id.value()));
    }

    fn ungate(&self, id: PartitionId) {
        self.0.push(Event::Ungate(id.value()));
    }
}

#[derive(Debug)]
pub struct FakeMc(EventLog);

impl MemoryClientControl for FakeMc {
    fn disable_client_access(&self, id: PartitionId) {
        self.0.push(Event::McDisable(id.value()));
    }

    fn flush_disable(&self, id: PartitionId) {
        self.0.push(Event::McFlush(id.value()));
    }

    fn flush_complete(&self, id: PartitionId) {
        self.0.push(Event::McFlushDone(id.value()));
    }

    fn enable_client_access(&self, id: PartitionId) {
        self.0.push(Event::McEnable(id.value()));
    }
}

// endregion

// region: Manual executor

struct ManualWorkShared {
    name: String,
    armed: Mutex<Option<Duration>>,
    task: WorkFn,
}

struct ManualWork(Arc<ManualWorkShared>);

impl DelayedWork for ManualWork {
    fn schedule(&self, delay: Duration) -> bool {
        let mut armed = self.0.armed.lock().unwrap();
        if armed.is_some() {
            return false;
        }
        *armed = Some(delay);
        true
    }

    fn cancel(&self) -> bool {
        self.0.armed.lock().unwrap().take().is_some()
    }

    fn flush(&self) {
        let armed = self.0.armed.lock().unwrap().take();
        if armed.is_some() {
            (self.0.task)();
        }
    }
}

/// Returns the last value of the condition without sleeping.
struct ImmediateWaitQueue;

impl WaitQueue for ImmediateWaitQueue {
    fn wait_until(&self, cond: &mut dyn FnMut() -> bool, _timeout: Duration) -> bool {
        cond()
    }

    fn wake_all(&self) {}
}

/// Executor whose delayed work only runs when the test says so.
pub struct ManualExecutor {
    works: Mutex<Vec<Arc<ManualWorkShared>>>,
    log: EventLog,
}

impl ManualExecutor {
    pub fn new(log: EventLog) -> Self {
        ManualExecutor {
            works: Mutex::new(Vec::new()),
            log,
        }
    }

    /// Run every work armed at the time of the call, once. Work armed while this
    /// runs waits for the next call.
    pub fn fire_all(&self) -> usize {
        let due: Vec<_> = self
            .works
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.armed.lock().unwrap().take().is_some())
            .cloned()
            .collect();
        for work in due.iter() {
            (work.task)();
        }
        due.len()
    }

    /// Delay the power-down of `module` is armed with, if armed.
    pub fn pending(&self, module: &str) -> Option<Duration> {
        let name = format!("{}-powerdown", module);
        self.works
            .lock()
            .unwrap()
            .iter()
            .find(|w| w.name == name)
            .and_then(|w| *w.armed.lock().unwrap())
    }
}

impl Executor for ManualExecutor {
    fn create_work(&self, name: &str, task: WorkFn) -> acm::Result<Box<dyn DelayedWork>> {
        let shared = Arc::new(ManualWorkShared {
            name: name.to_string(),
            armed: Mutex::new(None),
            task,
        });
        self.works.lock().unwrap().push(shared.clone());
        Ok(Box::new(ManualWork(shared)))
    }

    fn create_wait_queue(&self) -> Box<dyn WaitQueue> {
        Box::new(ImmediateWaitQueue)
    }

    fn udelay(&self, us: u64) {
        self.log.push(Event::Udelay(us));
    }
}

// endregion

// region: Hooks and sink

#[derive(Debug, Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<IdleReport>>,
}

impl RecordingSink {
    pub fn reports(&self) -> Vec<IdleReport> {
        self.reports.lock().unwrap().clone()
    }
}

impl DiagnosticsSink for RecordingSink {
    fn report(&self, report: &IdleReport) {
        self.reports.lock().unwrap().push(report.clone());
    }
}

/// Logs every hook call. `prepare_poweroff` fails while `failures` is nonzero.
pub struct RecordingHooks {
    log: EventLog,
    failures: AtomicUsize,
}

impl RecordingHooks {
    pub fn new(log: &EventLog) -> Arc<Self> {
        Self::failing(log, 0)
    }

    pub fn failing(log: &EventLog, failures: usize) -> Arc<Self> {
        Arc::new(RecordingHooks {
            log: log.clone(),
            failures: AtomicUsize::new(failures),
        })
    }

    fn record(&self, module: &Module, name: &'static str) {
        self.log.push(hook(module.name(), name));
    }
}

impl ModuleHooks for RecordingHooks {
    fn init(&self, module: &Module) {
        self.record(module, "init");
    }

    fn deinit(&self, module: &Module) {
        self.record(module, "deinit");
    }

    fn busy(&self, module: &Module) {
        self.record(module, "busy");
    }

    fn idle(&self, module: &Module) {
        self.record(module, "idle");
    }

    fn finalize_poweron(&self, module: &Module) {
        self.record(module, "finalize_poweron");
    }

    fn prepare_poweroff(&self, module: &Module) -> acm::Result<()> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            self.record(module, "prepare_poweroff_failed");
            return Err(AcmError::PowerOffPrepareFailed);
        }
        self.record(module, "prepare_poweroff");
        Ok(())
    }

    fn suspend(&self, module: &Module) {
        self.record(module, "suspend");
    }
}

// endregion

pub fn desc(
    clocks: &[(&'static str, u64)],
    partitions: &[u32],
    can_powergate: bool,
    powerdown_delay: Duration,
    hooks: Arc<dyn ModuleHooks>,
) -> Arc<ModuleDesc> {
    let mut desc = ModuleDesc {
        clocks: clocks
            .iter()
            .map(|&(name, default_rate)| ClockDesc { name, default_rate })
            .collect(),
        can_powergate,
        powerdown_delay,
        hooks,
        ..Default::default()
    };
    for (slot, id) in partitions.iter().enumerate() {
        desc.powergate_ids[slot] = Some(PartitionId::new(*id));
    }
    Arc::new(desc)
}

pub struct Rig {
    pub log: EventLog,
    pub clocks: Arc<FakeClockProvider>,
    pub sink: Arc<RecordingSink>,
    pub host: Host,
}

impl Rig {
    pub fn new(log: EventLog, executor: Arc<dyn Executor>, config: AcmConfig) -> Rig {
        let clocks = Arc::new(FakeClockProvider {
            log: log.clone(),
            ..Default::default()
        });
        let sink = Arc::new(RecordingSink::default());
        let platform = Platform {
            clocks: clocks.clone(),
            powergate: Arc::new(FakePowerGate(log.clone())),
            mc: Arc::new(FakeMc(log.clone())),
            executor,
        };
        let host = Host::new(platform, config, sink.clone());
        Rig {
            log,
            clocks,
            sink,
            host,
        }
    }

    pub fn manual() -> (Rig, Arc<ManualExecutor>) {
        Self::manual_with(AcmConfig::default())
    }

    pub fn manual_with(config: AcmConfig) -> (Rig, Arc<ManualExecutor>) {
        let log = EventLog::default();
        let exec = Arc::new(ManualExecutor::new(log.clone()));
        (Rig::new(log, exec.clone(), config), exec)
    }

    pub fn threaded(config: AcmConfig) -> Rig {
        Rig::new(
            EventLog::default(),
            Arc::new(acm::platform::thread::ThreadExecutor),
            config,
        )
    }
}

/// Poll `cond` for up to two seconds.
pub fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    cond()
}
