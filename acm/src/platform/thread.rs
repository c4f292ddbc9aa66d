//! [Executor] backed by OS threads, for hosted targets.
//!
//! Each [DelayedWork] gets a worker thread that sleeps until the work is due. Wait
//! queues are a mutex/condvar pair. Workers are detached: dropping the work flags it
//! as shut down and the thread exits on its next wakeup, which keeps a work item
//! droppable from inside its own task.
use super::{DelayedWork, Executor, WaitQueue, WorkFn};
use crate::error::{AcmError, Result};
use alloc::{boxed::Box, format, sync::Arc};
use log::error;
use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    thread,
    time::{Duration, Instant},
};

#[derive(Debug, Default)]
pub struct ThreadExecutor;

impl Executor for ThreadExecutor {
    fn create_work(&self, name: &str, task: WorkFn) -> Result<Box<dyn DelayedWork>> {
        Ok(Box::new(ThreadWork::spawn(name, task)?))
    }

    fn create_wait_queue(&self) -> Box<dyn WaitQueue> {
        Box::new(CondvarWaitQueue::default())
    }

    fn udelay(&self, us: u64) {
        thread::sleep(Duration::from_micros(us));
    }
}

// region: Delayed work

#[derive(Debug, Clone, Copy)]
enum Slot {
    Idle,
    Pending(Instant),
    /// `rearm` holds the deadline of an arming made while the task was running.
    Running { rearm: Option<Instant> },
}

#[derive(Debug)]
struct WorkState {
    slot: Slot,
    completed: u64,
    shutdown: bool,
}

#[derive(Debug)]
struct WorkShared {
    state: Mutex<WorkState>,
    cond: Condvar,
}

impl WorkShared {
    fn lock(&self) -> MutexGuard<'_, WorkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self, name: &str, task: WorkFn) {
        let mut st = self.lock();
        loop {
            if st.shutdown {
                return;
            }
            let deadline = match st.slot {
                Slot::Pending(deadline) => deadline,
                _ => {
                    st = self.cond.wait(st).unwrap_or_else(PoisonError::into_inner);
                    continue;
                }
            };
            let now = Instant::now();
            if now < deadline {
                st = self
                    .cond
                    .wait_timeout(st, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
                continue;
            }
            st.slot = Slot::Running { rearm: None };
            drop(st);
            if catch_unwind(AssertUnwindSafe(|| task())).is_err() {
                error!("work '{}' panicked", name);
            }
            st = self.lock();
            st.completed += 1;
            st.slot = match st.slot {
                Slot::Running { rearm: Some(at) } => Slot::Pending(at),
                _ => Slot::Idle,
            };
            self.cond.notify_all();
        }
    }
}

/// A [DelayedWork] with its own worker thread.
#[derive(Debug)]
pub struct ThreadWork {
    shared: Arc<WorkShared>,
}

impl ThreadWork {
    pub fn spawn(name: &str, task: WorkFn) -> Result<ThreadWork> {
        let shared = Arc::new(WorkShared {
            state: Mutex::new(WorkState {
                slot: Slot::Idle,
                completed: 0,
                shutdown: false,
            }),
            cond: Condvar::new(),
        });
        let worker = shared.clone();
        let thread_name = format!("acm-{}", name);
        thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || worker.run(&thread_name, task))
            .map_err(|err| {
                error!("cannot spawn worker for '{}': {}", name, err);
                AcmError::OutOfMemory
            })?;
        Ok(ThreadWork { shared })
    }
}

impl DelayedWork for ThreadWork {
    fn schedule(&self, delay: Duration) -> bool {
        let mut st = self.shared.lock();
        let at = Instant::now() + delay;
        let armed = match st.slot {
            Slot::Idle => {
                st.slot = Slot::Pending(at);
                true
            }
            Slot::Running { rearm: None } => {
                st.slot = Slot::Running { rearm: Some(at) };
                true
            }
            _ => false,
        };
        if armed {
            self.shared.cond.notify_all();
        }
        armed
    }

    fn cancel(&self) -> bool {
        let mut st = self.shared.lock();
        match st.slot {
            Slot::Pending(_) => {
                st.slot = Slot::Idle;
                self.shared.cond.notify_all();
                true
            }
            Slot::Running { rearm: Some(_) } => {
                st.slot = Slot::Running { rearm: None };
                true
            }
            _ => false,
        }
    }

    fn flush(&self) {
        let mut st = self.shared.lock();
        let now = Instant::now();
        let target = match st.slot {
            Slot::Idle => return,
            Slot::Pending(_) => {
                st.slot = Slot::Pending(now);
                st.completed + 1
            }
            Slot::Running { rearm: None } => st.completed + 1,
            Slot::Running { rearm: Some(_) } => {
                st.slot = Slot::Running { rearm: Some(now) };
                st.completed + 2
            }
        };
        self.shared.cond.notify_all();
        while st.completed < target && !st.shutdown {
            st = self
                .shared
                .cond
                .wait(st)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl Drop for ThreadWork {
    fn drop(&mut self) {
        self.shared.lock().shutdown = true;
        self.shared.cond.notify_all();
    }
}

// endregion

#[derive(Debug, Default)]
pub struct CondvarWaitQueue {
    lock: Mutex<()>,
    cond: Condvar,
}

impl WaitQueue for CondvarWaitQueue {
    fn wait_until(&self, cond: &mut dyn FnMut() -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if cond() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            guard = self
                .cond
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn wake_all(&self) {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.cond.notify_all();
    }
}
