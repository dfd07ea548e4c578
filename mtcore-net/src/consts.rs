//! Timing and sizing constants of the connection runtime.

use std::time::Duration;

/// How long `help.getConfig` may stay unanswered before another DC is tried.
pub const ENUMERATE_DC_TIMEOUT: Duration = Duration::from_secs(8);

/// TCP connect plus transport init.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(8);

/// Reconnect delays in milliseconds; after the table the delay doubles.
pub const RETRY_STEPS_MS: [u64; 4] = [1, 2, 3, 1000];

pub const MAX_RETRY_DELAY_MS: u64 = 64_000;

/// How often the connection worker runs its housekeeping.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Frames queued for writing before callers have to wait.
pub const MAILBOX_CAPACITY: usize = 256;

/// Updates kept for slow subscribers.
pub const UPDATES_CAPACITY: usize = 1024;

/// Read chunk for the socket buffer.
pub const READ_CHUNK: usize = 16 * 1024;

/// Bare DC ids at or above this are temporary (keys-destroyer, config lookups).
pub const TEMPORARY_MAIN_DC: i32 = 1000;

/// Shifted DC ids carry the bare id modulo this.
pub const DC_SHIFT: i32 = 10_000;

pub const DEFAULT_MAIN_DC: i32 = 2;
