//! AlignmentResult - aligner output
//!
//! Per-sample alignment outcome plus the closed set of strategies that produce it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{StreamId, SyncError};

/// Alignment strategy
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    /// Device timestamps with drift regression (highest precision)
    #[serde(alias = "hardware_timestamp")]
    Hardware,
    /// NTP-style clock offset estimation against a time source
    #[serde(alias = "software_timestamp", alias = "ntp")]
    Software,
    /// Per-stream buffering for variable-latency streams
    #[default]
    #[serde(alias = "buffer_based")]
    Buffer,
    /// Cross-stream event correlation and pattern matching
    #[serde(alias = "event_driven")]
    Event,
}

impl SyncStrategy {
    pub const ALL: [SyncStrategy; 4] = [
        SyncStrategy::Hardware,
        SyncStrategy::Software,
        SyncStrategy::Buffer,
        SyncStrategy::Event,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStrategy::Hardware => "hardware",
            SyncStrategy::Software => "software",
            SyncStrategy::Buffer => "buffer",
            SyncStrategy::Event => "event",
        }
    }
}

impl fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStrategy {
    type Err = SyncError;

    /// Accepts the short names plus the long `*_timestamp` / `*_based` / `*_driven` forms.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "hardware" | "hardware_timestamp" => Ok(SyncStrategy::Hardware),
            "software" | "software_timestamp" | "ntp" => Ok(SyncStrategy::Software),
            "buffer" | "buffer_based" => Ok(SyncStrategy::Buffer),
            "event" | "event_driven" => Ok(SyncStrategy::Event),
            _ => Err(SyncError::unknown_strategy(s)),
        }
    }
}

/// Result of aligning one sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentResult {
    /// Stream the sample came from
    pub stream_id: StreamId,

    /// Raw input timestamp (ms)
    pub original_timestamp: i64,

    /// Timestamp on the common timeline (ms)
    pub aligned_timestamp: i64,

    /// Confidence in the alignment (0-1)
    pub confidence: f64,

    /// Offset from the strategy's reference (ms)
    pub offset: i64,

    /// Drift estimate, if the strategy models one
    pub drift: Option<f64>,

    /// Producing strategy
    pub strategy: SyncStrategy,

    /// Observed latency (ms), if the strategy measures one
    pub latency_ms: Option<f64>,

    /// Samples dropped while processing this one
    pub dropped_samples: u64,

    /// Alignment accuracy estimate (0-1)
    pub accuracy: f64,

    /// Strategy specific extras
    pub details: StrategyDetails,
}

/// Per-strategy extra fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum StrategyDetails {
    Hardware {
        reference_time: i64,
        used_hardware_timestamp: bool,
        history_len: usize,
    },
    Software {
        clock_offset: f64,
        sync_age_ms: i64,
        sync_quality: f64,
    },
    Buffer {
        buffer_size: usize,
        optimal_size: usize,
        is_reference: bool,
    },
    Event {
        correlation_score: f64,
        pattern_score: f64,
        matched_stream: Option<StreamId>,
    },
}

/// Outcome of one sample inside a `synchronize()` batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SampleOutcome {
    Aligned(AlignmentResult),
    Rejected { stream_id: StreamId, reason: String },
}

impl SampleOutcome {
    pub fn aligned(&self) -> Option<&AlignmentResult> {
        match self {
            SampleOutcome::Aligned(result) => Some(result),
            SampleOutcome::Rejected { .. } => None,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, SampleOutcome::Rejected { .. })
    }
}
