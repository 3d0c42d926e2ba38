//! Defaults and limits for consumer group readers.

use std::time::Duration;

/// Default time a pending entry may sit idle before another consumer may
/// reclaim it (30 seconds).
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of pending entries inspected per reclaim scan.
pub const DEFAULT_RECLAIM_BATCH: usize = 10;

/// Default number of entries fetched per read.
pub const DEFAULT_READ_BATCH: usize = 1;

/// Default time a live read blocks waiting for new entries (5 seconds).
///
/// Bounded so that stop requests and reclaim scans are observed regularly.
pub const DEFAULT_READ_WAIT: Duration = Duration::from_secs(5);

/// Maximum entries fetched or inspected by a single command.
pub const MAX_BATCH_SIZE: usize = 1_000;

const _: () = assert!(DEFAULT_RECLAIM_BATCH > 0 && DEFAULT_RECLAIM_BATCH <= MAX_BATCH_SIZE);
const _: () = assert!(DEFAULT_READ_BATCH > 0 && DEFAULT_READ_BATCH <= MAX_BATCH_SIZE);
const _: () = assert!(DEFAULT_IDLE_TIMEOUT.as_millis() > 0);
const _: () = assert!(DEFAULT_READ_WAIT.as_millis() > 0);
