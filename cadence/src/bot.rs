//! The bot: one logic tree, one input queue, one scheduler.
//!
//! Hosts drive a [`Bot`] through `on_start`/`on_pause`/`on_resume`/`on_stop`.
//! Those entry points never return errors; failures are logged and, where the
//! bot cannot continue, turn into a stop. [`Bot::run`] supervises a started bot
//! and reports why it ended.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use anyhow::Result;
use parking_lot::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::behavior::Behavior;
use crate::brain::{Brain, TickOutcome};
use crate::input::queue::InputQueue;
use crate::input::timing::{Clock, SystemClock, TimingPolicy};
use crate::io::config::EngineConfig;
use crate::io::world::Caches;
use crate::scheduler::{Scheduler, SchedulerState, TickDriver};

/// Collaborators shared by everything a bot runs.
pub struct BotContext {
    pub input: Arc<InputQueue>,
    pub caches: Arc<Caches>,
    pub config: EngineConfig,
}

impl BotContext {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Context on an explicit clock. A successful input drops every cached
    /// observation.
    pub fn with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        let input = Arc::new(InputQueue::new(
            TimingPolicy::new(config.timing.clone()),
            clock,
        ));
        let caches = Arc::new(Caches::new());
        let on_success = Arc::clone(&caches);
        input.on_success(move |target| {
            debug!(kind = %target.kind(), label = ?target.label(), "input landed, invalidating caches");
            on_success.invalidate_all();
        });
        Self {
            input,
            caches,
            config,
        }
    }
}

/// Drives the brain from the scheduler's loop.
struct Ticker {
    brain: Arc<Brain>,
    input: Arc<InputQueue>,
}

impl TickDriver for Ticker {
    fn tick(&self) -> Result<()> {
        self.brain.tick(&self.input).map(|_| ())
    }
}

pub struct Bot<B> {
    ctx: Arc<BotContext>,
    behavior: B,
    brain: Arc<Brain>,
    scheduler: Scheduler,
    stopped: AtomicBool,
    stop_requested: AtomicBool,
    failure: Mutex<Option<anyhow::Error>>,
}

impl<B: Behavior> Bot<B> {
    pub fn new(ctx: BotContext, behavior: B) -> Self {
        let ctx = Arc::new(ctx);
        let brain = Arc::new(Brain::new());
        let ticker = Arc::new(Ticker {
            brain: Arc::clone(&brain),
            input: Arc::clone(&ctx.input),
        });
        let scheduler = Scheduler::new(
            ticker,
            ctx.config.tick_interval(),
            ctx.config.worker_threads,
        );
        Self {
            ctx,
            behavior,
            brain,
            scheduler,
            stopped: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            failure: Mutex::new(None),
        }
    }

    pub fn ctx(&self) -> &BotContext {
        &self.ctx
    }

    pub fn brain(&self) -> &Brain {
        &self.brain
    }

    pub fn state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    pub fn is_shutdown(&self) -> bool {
        self.scheduler.is_shutdown()
    }

    /// Jobs running on the worker pool. Advisory only.
    pub fn active_count(&self) -> usize {
        self.scheduler.active_count()
    }

    /// Run `job` on the bot's worker pool.
    pub fn submit<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.scheduler.submit(job)
    }

    /// Register the behavior's tasks and start ticking.
    #[instrument(skip_all, fields(args = args.len()))]
    pub fn on_start(&self, args: &[String]) {
        let state = self.scheduler.state();
        if state != SchedulerState::Stopped
            || self.scheduler.is_shutdown()
            || self.stopped.load(Ordering::Acquire)
        {
            warn!(%state, "ignoring start");
            return;
        }
        info!("starting bot");
        let registered = self
            .brain
            .with_tree(|tree| self.behavior.on_bot_start(args, &self.ctx, tree));
        if let Err(err) = registered.and_then(|()| self.scheduler.start()) {
            error!(error = %format!("{err:#}"), "bot failed to start");
            self.brain.clear();
            *self.failure.lock() = Some(err);
            self.on_stop();
        }
    }

    /// Stop for good. Safe to call more than once.
    #[instrument(skip_all)]
    pub fn on_stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("stopping bot");
        self.behavior.on_bot_stop(&self.ctx);
        self.scheduler.stop();
        self.brain.clear();
        self.ctx.input.wipe();
        self.ctx.caches.invalidate_all();
    }

    #[instrument(skip_all)]
    pub fn on_pause(&self) {
        if let Err(err) = self.scheduler.pause() {
            warn!(error = %err, "ignoring pause");
            return;
        }
        self.brain.invalidate();
        self.ctx.input.wipe();
        self.ctx.caches.invalidate_all();
        self.behavior.on_bot_pause(&self.ctx);
    }

    #[instrument(skip_all)]
    pub fn on_resume(&self) {
        if self.scheduler.state() != SchedulerState::Paused {
            warn!(state = %self.scheduler.state(), "ignoring resume");
            return;
        }
        self.behavior.on_bot_resume(&self.ctx);
        if let Err(err) = self.scheduler.resume() {
            warn!(error = %err, "resume failed");
        }
    }

    /// Run one tick on the caller's thread. Faults are logged and returned.
    pub fn run_tick(&self) -> Result<TickOutcome> {
        self.brain.tick(&self.ctx.input).inspect_err(|err| {
            error!(error = %format!("{err:#}"), "tick failed");
        })
    }

    /// Ask [`Bot::run`] to stop the bot at its next poll.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    /// Supervise a started bot until it shuts down.
    ///
    /// Returns the startup failure or tick fault that ended the run, if any.
    pub fn run(&self) -> Result<()> {
        let interval = self.ctx.config.supervise_interval();
        loop {
            if self.stop_requested.load(Ordering::Acquire) || self.scheduler.stop_requested() {
                self.on_stop();
            }
            if self.scheduler.is_shutdown() {
                break;
            }
            if self.scheduler.state() == SchedulerState::Running {
                debug!(
                    active = self.scheduler.active_count(),
                    ticks = self.scheduler.ticks(),
                    "bot running"
                );
            }
            thread::sleep(interval);
        }

        if let Some(err) = self.failure.lock().take() {
            return Err(err);
        }
        if let Some(fault) = self.scheduler.take_fault() {
            return Err(fault.into());
        }
        info!(ticks = self.scheduler.ticks(), "bot finished");
        Ok(())
    }
}
