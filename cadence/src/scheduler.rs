//! Lifecycle controller: the driving loop thread and the worker pool.
//!
//! The driving loop calls [`TickDriver::tick`] every `tick_interval`. Pause and
//! stop are cooperative: they bump a generation counter, the loop exits at the
//! next tick boundary, and the caller waits for it. A resume starts a fresh
//! loop with a new generation.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Sender, unbounded};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
    Paused,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchedulerState::Stopped => "stopped",
            SchedulerState::Running => "running",
            SchedulerState::Paused => "paused",
        };
        f.write_str(name)
    }
}

/// Work run once per tick by the driving loop.
pub trait TickDriver: Send + Sync {
    fn tick(&self) -> Result<()>;
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed set of threads draining a job channel.
struct WorkerPool {
    sender: Sender<Job>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    fn spawn(threads: usize, active: Arc<AtomicUsize>) -> Result<Self> {
        let (sender, receiver) = unbounded::<Job>();
        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let receiver = receiver.clone();
            let active = Arc::clone(&active);
            let worker = thread::Builder::new()
                .name(format!("cadence-worker-{index}"))
                .spawn(move || {
                    for job in &receiver {
                        active.fetch_add(1, Ordering::AcqRel);
                        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                            error!(panic = %panic_message(payload.as_ref()), "worker job panicked");
                        }
                        active.fetch_sub(1, Ordering::AcqRel);
                    }
                })
                .context("spawn worker thread")?;
            workers.push(worker);
        }
        Ok(Self { sender, workers })
    }

    /// Close the channel and wait for queued jobs to drain.
    fn shutdown(self) {
        drop(self.sender);
        for worker in self.workers {
            if worker.join().is_err() {
                warn!("worker thread exited abnormally");
            }
        }
    }
}

struct Control {
    state: SchedulerState,
    shut_down: bool,
    driver_thread: Option<JoinHandle<()>>,
    pool: Option<WorkerPool>,
}

struct Shared {
    driver: Arc<dyn TickDriver>,
    tick_interval: Duration,
    generation: AtomicU64,
    ticks: AtomicU64,
    stop_requested: AtomicBool,
    fault: Mutex<Option<EngineError>>,
}

impl Shared {
    fn drive(&self, generation: u64) {
        debug!(generation, "driving loop started");
        while self.generation.load(Ordering::Acquire) == generation {
            let tick = self.ticks.fetch_add(1, Ordering::AcqRel) + 1;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.driver.tick()));
            let message = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(format!("{err:#}")),
                Err(payload) => Some(format!("panic: {}", panic_message(payload.as_ref()))),
            };
            if let Some(message) = message {
                error!(tick, %message, "tick aborted, requesting stop");
                *self.fault.lock() = Some(EngineError::TickFault { tick, message });
                self.stop_requested.store(true, Ordering::Release);
                break;
            }
            thread::park_timeout(self.tick_interval);
        }
        debug!(generation, "driving loop exited");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Owns the driving loop and the worker pool.
pub struct Scheduler {
    shared: Arc<Shared>,
    control: Mutex<Control>,
    worker_threads: usize,
    active: Arc<AtomicUsize>,
}

impl Scheduler {
    pub fn new(driver: Arc<dyn TickDriver>, tick_interval: Duration, worker_threads: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                driver,
                tick_interval,
                generation: AtomicU64::new(0),
                ticks: AtomicU64::new(0),
                stop_requested: AtomicBool::new(false),
                fault: Mutex::new(None),
            }),
            control: Mutex::new(Control {
                state: SchedulerState::Stopped,
                shut_down: false,
                driver_thread: None,
                pool: None,
            }),
            worker_threads,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.control.lock().state
    }

    /// Stopped → Running. Allowed once per scheduler.
    pub fn start(&self) -> Result<()> {
        let mut control = self.control.lock();
        if control.shut_down {
            return Err(EngineError::AlreadyShutDown.into());
        }
        if control.state != SchedulerState::Stopped {
            return Err(invalid("start", control.state));
        }
        control.pool = Some(WorkerPool::spawn(
            self.worker_threads,
            Arc::clone(&self.active),
        )?);
        control.driver_thread = Some(self.spawn_loop()?);
        control.state = SchedulerState::Running;
        info!(workers = self.worker_threads, "scheduler started");
        Ok(())
    }

    /// Running → Paused. Waits for the tick in flight, so no tick runs once
    /// this returns.
    pub fn pause(&self) -> Result<()> {
        let driver_thread = {
            let mut control = self.control.lock();
            if control.state != SchedulerState::Running {
                return Err(invalid("pause", control.state));
            }
            self.shared.generation.fetch_add(1, Ordering::AcqRel);
            control.state = SchedulerState::Paused;
            control.driver_thread.take()
        };
        if let Some(handle) = driver_thread {
            handle.thread().unpark();
            join_loop(handle);
        }
        info!("scheduler paused");
        Ok(())
    }

    /// Paused → Running with a fresh driving loop.
    pub fn resume(&self) -> Result<()> {
        let mut control = self.control.lock();
        if control.state != SchedulerState::Paused {
            return Err(invalid("resume", control.state));
        }
        control.driver_thread = Some(self.spawn_loop()?);
        control.state = SchedulerState::Running;
        info!("scheduler resumed");
        Ok(())
    }

    /// Terminal. Waits for the loop to exit and releases the pool. A second
    /// call does nothing.
    pub fn stop(&self) {
        let (driver_thread, pool) = {
            let mut control = self.control.lock();
            if control.shut_down {
                return;
            }
            control.shut_down = true;
            control.state = SchedulerState::Stopped;
            self.shared.generation.fetch_add(1, Ordering::AcqRel);
            (control.driver_thread.take(), control.pool.take())
        };
        if let Some(handle) = driver_thread {
            handle.thread().unpark();
            join_loop(handle);
        }
        if let Some(pool) = pool {
            pool.shutdown();
        }
        info!(ticks = self.ticks(), "scheduler stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.control.lock().shut_down
    }

    /// Jobs currently executing on the pool. Advisory only.
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Ticks started by any driving loop so far.
    pub fn ticks(&self) -> u64 {
        self.shared.ticks.load(Ordering::Acquire)
    }

    /// Run `job` on the worker pool.
    pub fn submit<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let control = self.control.lock();
        let Some(pool) = &control.pool else {
            return Err(invalid("submit", control.state));
        };
        pool.sender
            .send(Box::new(job))
            .map_err(|_| anyhow!("worker pool channel closed"))
    }

    /// Set by the driving loop after a tick fault.
    pub fn stop_requested(&self) -> bool {
        self.shared.stop_requested.load(Ordering::Acquire)
    }

    /// Take the fault that aborted the driving loop, if any.
    pub fn take_fault(&self) -> Option<EngineError> {
        self.shared.fault.lock().take()
    }

    fn spawn_loop(&self) -> Result<JoinHandle<()>> {
        let shared = Arc::clone(&self.shared);
        let generation = shared.generation.load(Ordering::Acquire);
        thread::Builder::new()
            .name("cadence-tick".to_string())
            .spawn(move || shared.drive(generation))
            .context("spawn driving loop")
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn invalid(action: &'static str, state: SchedulerState) -> anyhow::Error {
    EngineError::InvalidTransition { action, state }.into()
}

fn join_loop(handle: JoinHandle<()>) {
    if handle.thread().id() == thread::current().id() {
        return;
    }
    if handle.join().is_err() {
        warn!("driving loop exited abnormally");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    use crate::test_support::wait_until;

    #[derive(Default)]
    struct CountingDriver {
        ticks: AtomicU64,
        fail_on: Option<u64>,
        panic_on: Option<u64>,
    }

    impl TickDriver for CountingDriver {
        fn tick(&self) -> Result<()> {
            let tick = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on == Some(tick) {
                anyhow::bail!("handler fault on tick {tick}");
            }
            if self.panic_on == Some(tick) {
                panic!("driver blew up");
            }
            Ok(())
        }
    }

    fn scheduler(driver: Arc<CountingDriver>) -> Scheduler {
        Scheduler::new(driver, Duration::from_millis(1), 2)
    }

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn start_drives_ticks_until_stop() {
        let driver = Arc::new(CountingDriver::default());
        let sched = scheduler(Arc::clone(&driver));
        sched.start().expect("start");
        assert_eq!(sched.state(), SchedulerState::Running);
        assert!(wait_until(WAIT, || driver.ticks.load(Ordering::SeqCst) >= 3));

        sched.stop();
        assert!(sched.is_shutdown());
        let after_stop = driver.ticks.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(driver.ticks.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn pause_halts_and_resume_restarts_ticking() {
        let driver = Arc::new(CountingDriver::default());
        let sched = scheduler(Arc::clone(&driver));
        sched.start().expect("start");
        assert!(wait_until(WAIT, || driver.ticks.load(Ordering::SeqCst) >= 1));

        sched.pause().expect("pause");
        assert_eq!(sched.state(), SchedulerState::Paused);
        thread::sleep(Duration::from_millis(20));
        let paused_at = driver.ticks.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(driver.ticks.load(Ordering::SeqCst), paused_at);

        sched.resume().expect("resume");
        assert!(wait_until(WAIT, || driver.ticks.load(Ordering::SeqCst) > paused_at));
        sched.stop();
    }

    #[test]
    fn stop_is_idempotent_and_terminal() {
        let sched = scheduler(Arc::new(CountingDriver::default()));
        sched.start().expect("start");
        sched.stop();
        sched.stop();
        assert_eq!(sched.state(), SchedulerState::Stopped);

        let err = sched.start().expect_err("restart");
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::AlreadyShutDown)
        ));
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        let sched = scheduler(Arc::new(CountingDriver::default()));
        let err = sched.pause().expect_err("pause while stopped");
        assert!(err.to_string().contains("cannot pause while scheduler is stopped"));
        assert!(sched.resume().is_err());

        sched.start().expect("start");
        assert!(sched.start().is_err());
        assert!(sched.resume().is_err());
        sched.stop();
    }

    #[test]
    fn tick_error_records_fault_and_requests_stop() {
        let driver = Arc::new(CountingDriver {
            fail_on: Some(2),
            ..CountingDriver::default()
        });
        let sched = scheduler(Arc::clone(&driver));
        sched.start().expect("start");
        assert!(wait_until(WAIT, || sched.stop_requested()));

        match sched.take_fault() {
            Some(EngineError::TickFault { tick, message }) => {
                assert_eq!(tick, 2);
                assert!(message.contains("handler fault on tick 2"));
            }
            other => panic!("expected tick fault, got {other:?}"),
        }
        sched.stop();
        assert_eq!(driver.ticks.load(Ordering::SeqCst), 2, "loop exits after the fault");
    }

    #[test]
    fn tick_panic_is_contained() {
        let driver = Arc::new(CountingDriver {
            panic_on: Some(1),
            ..CountingDriver::default()
        });
        let sched = scheduler(driver);
        sched.start().expect("start");
        assert!(wait_until(WAIT, || sched.stop_requested()));
        let fault = sched.take_fault().expect("fault");
        assert!(fault.to_string().contains("driver blew up"));
        sched.stop();
    }

    #[test]
    fn submitted_jobs_run_on_the_pool() {
        let sched = scheduler(Arc::new(CountingDriver::default()));
        assert!(sched.submit(|| {}).is_err(), "no pool before start");

        sched.start().expect("start");
        let (tx, rx) = mpsc::channel();
        sched
            .submit(move || tx.send(thread::current().name().map(str::to_string)).expect("send"))
            .expect("submit");
        let name = rx.recv_timeout(WAIT).expect("job ran");
        assert!(name.is_some_and(|name| name.starts_with("cadence-worker-")));
        assert!(wait_until(WAIT, || sched.active_count() == 0));
        sched.stop();
        assert!(sched.submit(|| {}).is_err(), "no pool after stop");
    }
}
