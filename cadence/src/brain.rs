//! One tick of bot logic: evaluate the tree unless input is pending, then pump
//! the input queue once.

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing::{instrument, trace};

use crate::core::mission::LogicTree;
use crate::core::task::Evaluation;
use crate::input::queue::{InputQueue, PumpStep};

/// Summary of a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    /// 1-based tick number.
    pub tick: u64,
    /// `None` when evaluation was skipped because input was pending.
    pub evaluation: Option<Evaluation>,
    pub pump: PumpStep,
}

/// Owns the logic tree. The tree mutex serializes ticks.
#[derive(Default)]
pub struct Brain {
    tree: Mutex<LogicTree>,
    ticks: AtomicU64,
}

impl Brain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with exclusive access to the tree.
    pub fn with_tree<R>(&self, f: impl FnOnce(&mut LogicTree) -> R) -> R {
        f(&mut self.tree.lock())
    }

    pub fn invalidate(&self) {
        self.tree.lock().invalidate();
    }

    pub fn clear(&self) {
        self.tree.lock().clear();
    }

    /// Ticks started so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    #[instrument(level = "trace", skip_all)]
    pub fn tick(&self, input: &InputQueue) -> Result<TickOutcome> {
        let mut tree = self.tree.lock();
        let tick = self.ticks.fetch_add(1, Ordering::AcqRel) + 1;

        if input.has_pending() {
            trace!(tick, pending = input.len(), "input pending, skipping evaluation");
            return Ok(TickOutcome {
                tick,
                evaluation: None,
                pump: input.pump_step(),
            });
        }

        let evaluation = tree
            .evaluate()
            .with_context(|| format!("evaluate logic tree on tick {tick}"))?;
        Ok(TickOutcome {
            tick,
            evaluation: Some(evaluation),
            pump: input.pump_step(),
        })
    }
}
