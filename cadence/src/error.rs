//! Typed failures that callers need to match on.
//!
//! Orchestration code returns `anyhow::Result`; the variants here are the ones
//! that get downcast (startup aborts, rejected lifecycle transitions, tick faults).

use std::path::PathBuf;

use thiserror::Error;

use crate::scheduler::SchedulerState;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A data file the bot cannot run without is absent or malformed.
    #[error("missing required resource {}: {reason}", path.display())]
    MissingResource { path: PathBuf, reason: String },

    /// A lifecycle call that is not valid from the current scheduler state.
    #[error("cannot {action} while scheduler is {state}")]
    InvalidTransition {
        action: &'static str,
        state: SchedulerState,
    },

    /// `start` after the scheduler has already been stopped once.
    #[error("scheduler already shut down")]
    AlreadyShutDown,

    /// A tick aborted with an uncaught handler fault.
    #[error("tick {tick} aborted: {message}")]
    TickFault { tick: u64, message: String },
}
