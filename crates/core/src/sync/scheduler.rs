//! Scheduler constants for the background sync loop.

/// Periodic push cadence in seconds while online.
pub const SYNC_INTERVAL_SECS: u64 = 30;

/// Maximum jitter (seconds) added to periodic cycle intervals.
pub const SYNC_INTERVAL_JITTER_SECS: u64 = 5;

/// Shortened cadence when the outbox is known to be non-empty.
pub const SYNC_PENDING_INTERVAL_SECS: u64 = 2;
