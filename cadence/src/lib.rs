//! Tick-driven task engine with humanized input dispatch.
//!
//! A bot keeps one [`core::mission::LogicTree`] of declarative tasks. Every
//! tick the [`brain::Brain`] evaluates the tree (unless input is still
//! pending), a matching handler enqueues intents on the
//! [`input::queue::InputQueue`], and the queue services one target under its
//! timing policy. Landed inputs invalidate the [`io::world`] caches so the next
//! evaluation sees fresh observations.
//!
//! - **[`core`]**: tasks, missions, and the reconciliation task. No client calls.
//! - **[`input`]**: dispatch queue, input targets, timing.
//! - **[`io`]**: config, resource files, world observation.
//! - **[`scheduler`]** and **[`bot`]**: lifecycle, driving loop, worker pool.

pub mod behavior;
pub mod bot;
pub mod brain;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod input;
pub mod io;
pub mod logging;
pub mod scheduler;
pub mod sim;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
