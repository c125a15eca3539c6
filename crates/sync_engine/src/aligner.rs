//! The `Aligner` contract and per-strategy statistics.

use serde::Serialize;

use contracts::{AlignmentResult, StreamId, StreamSample, SyncMetrics, SyncStrategy};

/// One alignment strategy.
///
/// Implementations own all of their per-stream state. `align` must not panic
/// for a validated sample; the engine validates before dispatching.
pub trait Aligner: Send {
    fn strategy(&self) -> SyncStrategy;

    /// Map one sample onto the common timeline.
    fn align(&mut self, sample: &StreamSample) -> AlignmentResult;

    /// Quality snapshot; defined before the first `align` call.
    fn quality(&self) -> SyncMetrics;

    fn stats(&self) -> StrategyStats;

    /// Cancel background tasks and drop all per-stream state. Idempotent.
    fn cleanup(&mut self);
}

/// Strategy specific counters
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum StrategyStats {
    Hardware(HardwareStats),
    Software(SoftwareStats),
    Buffer(BufferStats),
    Event(EventStats),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HardwareStats {
    pub streams: usize,
    pub total_alignments: u64,
    /// Alignments that had a device timestamp
    pub hardware_timestamps: u64,
    pub reference_time: Option<i64>,
    pub max_drift: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SoftwareStats {
    pub total_alignments: u64,
    pub successful_syncs: u64,
    pub failed_syncs: u64,
    pub offset: f64,
    pub drift: f64,
    pub sync_quality: f64,
    pub last_sync: i64,
    pub history_len: usize,
    pub resync_active: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BufferStats {
    pub streams: usize,
    pub reference_stream: Option<StreamId>,
    pub total_alignments: u64,
    pub buffered_samples: usize,
    /// Trimmed plus flushed
    pub dropped_samples: u64,
    pub flushed_samples: u64,
    pub out_of_order_samples: u64,
    pub flush_active: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventStats {
    pub streams: usize,
    pub total_events: u64,
    pub active_events: usize,
    pub correlations_found: u64,
    pub patterns_detected: u64,
    pub evicted_events: u64,
}
