//! Task engine: declarative tasks, the missions that group them, and the
//! reconciliation task built on top.
//!
//! Nothing here talks to the client directly. Observations come in through
//! [`crate::io::world`] caches and actions leave through [`crate::input`].

pub mod mission;
pub mod reconcile;
pub mod task;
pub mod types;
