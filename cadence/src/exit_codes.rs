//! Stable exit codes for `cadence` CLI commands.

/// Command succeeded; for `simulate`, the manifest was reached.
pub const OK: i32 = 0;
/// Invalid config or resources, or any other error before the bot ran.
pub const INVALID: i32 = 1;
/// `cadence simulate` ran out of ticks before reaching the manifest.
pub const INCOMPLETE: i32 = 2;
/// A tick aborted with a handler fault and the bot stopped.
pub const FAULT: i32 = 3;
