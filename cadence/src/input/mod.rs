//! Humanized input dispatch.

pub mod queue;
pub mod target;
pub mod timing;
