//! Time source capability for the software (NTP-style) aligner.
//!
//! A provider answers one four-timestamp exchange: given the local send time
//! `t1` it returns the server receive time `t2` and server send time `t3`.
//! The caller stamps `t4` on return. Exchanges are bounded by a timeout on the
//! caller side, so a provider may block.

use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use contracts::SyncError;

use crate::clock::{Clock, SharedClock, SystemClock};

/// Server side timestamps of one exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeExchange {
    /// Server receive time (ms)
    pub t2: i64,
    /// Server send time (ms)
    pub t3: i64,
}

/// Remote clock reachable through a request/response exchange.
pub trait TimeSyncProvider: Send + Sync + fmt::Debug {
    /// # Errors
    /// `SyncError::TimeSync` when the remote cannot be reached or answers garbage.
    fn exchange(&self, t1: i64) -> Result<TimeExchange, SyncError>;
}

/// Shared provider handle
pub type SharedTimeProvider = Arc<dyn TimeSyncProvider>;

/// Provider that answers from a local clock: zero offset, zero delay.
///
/// Default when no real time source is wired in.
#[derive(Debug, Clone)]
pub struct LoopbackTimeProvider {
    clock: SharedClock,
}

impl LoopbackTimeProvider {
    pub fn new(clock: SharedClock) -> Self {
        Self { clock }
    }
}

impl Default for LoopbackTimeProvider {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl TimeSyncProvider for LoopbackTimeProvider {
    fn exchange(&self, _t1: i64) -> Result<TimeExchange, SyncError> {
        let now = self.clock.now_ms();
        Ok(TimeExchange { t2: now, t3: now })
    }
}

/// Deterministic, synchronous provider for tests.
///
/// Answers as a server whose clock is `offset_ms` ahead of the caller, with
/// `one_way_delay_ms` on each leg. Failures can be queued with `fail_next`.
#[derive(Debug, Default)]
pub struct MockTimeSyncProvider {
    offset_ms: AtomicI64,
    one_way_delay_ms: AtomicI64,
    pending_failures: AtomicUsize,
    calls: AtomicU64,
}

impl MockTimeSyncProvider {
    pub fn with_offset(offset_ms: i64) -> Self {
        let provider = Self::default();
        provider.set_offset(offset_ms);
        provider
    }

    pub fn set_offset(&self, offset_ms: i64) {
        self.offset_ms.store(offset_ms, Ordering::SeqCst);
    }

    pub fn set_one_way_delay(&self, delay_ms: i64) {
        self.one_way_delay_ms.store(delay_ms, Ordering::SeqCst);
    }

    /// Make the next `count` exchanges fail.
    pub fn fail_next(&self, count: usize) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TimeSyncProvider for MockTimeSyncProvider {
    fn exchange(&self, t1: i64) -> Result<TimeExchange, SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SyncError::time_sync("mock time source unavailable"));
        }

        let offset = self.offset_ms.load(Ordering::SeqCst);
        let delay = self.one_way_delay_ms.load(Ordering::SeqCst);
        let t2 = t1 + delay + offset;
        Ok(TimeExchange { t2, t3: t2 })
    }
}
