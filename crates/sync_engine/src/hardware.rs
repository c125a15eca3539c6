//! Hardware timestamp aligner.
//!
//! Offsets are measured against a single reference time (the first timestamp
//! ever seen). Per-stream drift is the least-squares slope of recent offsets,
//! scaled to the history length, and is subtracted from the device timestamp.

use std::collections::{HashMap, VecDeque};

use contracts::{
    AlignmentResult, HardwareConfig, StrategyDetails, StreamId, StreamSample, SyncMetrics,
    SyncStrategy,
};
use tracing::{debug, trace};

use crate::aligner::{Aligner, HardwareStats, StrategyStats};
use crate::clock::SharedClock;
use crate::math::{least_squares, variance_around};

const MIN_CONFIDENCE: f64 = 0.5;
const VARIANCE_SCALE: f64 = 1000.0;
const DRIFT_QUALITY_SCALE: f64 = 10_000.0;

#[derive(Debug, Clone, Copy)]
struct DriftEstimate {
    drift: f64,
    confidence: f64,
}

#[derive(Debug)]
pub struct HardwareAligner {
    config: HardwareConfig,
    clock: SharedClock,
    reference_time: Option<i64>,
    offset_history: HashMap<StreamId, VecDeque<f64>>,
    max_drift: f64,
    total_alignments: u64,
    hardware_timestamps: u64,
    confidence_sum: f64,
}

impl HardwareAligner {
    pub fn new(config: HardwareConfig, clock: SharedClock) -> Self {
        Self {
            config,
            clock,
            reference_time: None,
            offset_history: HashMap::new(),
            max_drift: 0.0,
            total_alignments: 0,
            hardware_timestamps: 0,
            confidence_sum: 0.0,
        }
    }

    pub fn reference_time(&self) -> Option<i64> {
        self.reference_time
    }

    /// Drift and confidence from the most recent regression window.
    ///
    /// Needs strictly more than `drift_calculation_window` offsets.
    fn estimate_drift(&self, history: &VecDeque<f64>) -> Option<DriftEstimate> {
        let window = self.config.drift_calculation_window.max(2);
        if history.len() <= window {
            return None;
        }

        let recent: Vec<f64> = history.iter().skip(history.len() - window).copied().collect();
        let fit = least_squares(recent.iter().enumerate().map(|(i, &y)| (i as f64, y)))?;

        let drift = fit.slope * history.len() as f64;
        let predicted: Vec<f64> = (0..recent.len()).map(|i| fit.predict(i as f64)).collect();
        let residuals: Vec<f64> = recent
            .iter()
            .zip(&predicted)
            .map(|(observed, predicted)| observed - predicted)
            .collect();
        let variance = variance_around(&residuals, 0.0);
        let confidence =
            (self.config.confidence_threshold - variance / VARIANCE_SCALE).max(MIN_CONFIDENCE);

        Some(DriftEstimate { drift, confidence })
    }
}

impl Aligner for HardwareAligner {
    fn strategy(&self) -> SyncStrategy {
        SyncStrategy::Hardware
    }

    fn align(&mut self, sample: &StreamSample) -> AlignmentResult {
        let hw_timestamp = sample.best_timestamp();
        let used_hardware_timestamp = sample.hardware_timestamp.is_some();

        let reference_time = match self.reference_time {
            Some(reference) => reference,
            None => {
                debug!(
                    stream_id = %sample.stream_id,
                    reference_time = hw_timestamp,
                    "hardware reference time established"
                );
                self.reference_time = Some(hw_timestamp);
                hw_timestamp
            }
        };

        let offset = hw_timestamp.saturating_sub(reference_time) as f64;
        let max_history = self.config.max_offset_history.max(2);
        let history = self
            .offset_history
            .entry(sample.stream_id.clone())
            .or_insert_with(|| VecDeque::with_capacity(max_history));
        history.push_back(offset);
        while history.len() > max_history {
            history.pop_front();
        }
        let history_len = history.len();

        let estimate = self
            .offset_history
            .get(&sample.stream_id)
            .and_then(|history| self.estimate_drift(history));
        let (drift, confidence) = match estimate {
            Some(estimate) => (estimate.drift, estimate.confidence),
            None => (0.0, self.config.confidence_threshold),
        };
        let confidence = confidence.clamp(0.0, 1.0);

        self.max_drift = self.max_drift.max(drift.abs());
        self.total_alignments += 1;
        if used_hardware_timestamp {
            self.hardware_timestamps += 1;
        }
        self.confidence_sum += confidence;

        trace!(
            stream_id = %sample.stream_id,
            offset,
            drift,
            confidence,
            "hardware alignment"
        );

        AlignmentResult {
            stream_id: sample.stream_id.clone(),
            original_timestamp: sample.timestamp,
            aligned_timestamp: hw_timestamp.saturating_sub(drift.round() as i64),
            confidence,
            offset: (offset - drift).round() as i64,
            drift: Some(drift),
            strategy: SyncStrategy::Hardware,
            latency_ms: None,
            dropped_samples: 0,
            accuracy: confidence,
            details: StrategyDetails::Hardware {
                reference_time,
                used_hardware_timestamp,
                history_len,
            },
        }
    }

    fn quality(&self) -> SyncMetrics {
        let alignment_accuracy = if self.total_alignments == 0 {
            1.0
        } else {
            self.confidence_sum / self.total_alignments as f64
        };

        SyncMetrics {
            quality: (1.0 - self.max_drift / DRIFT_QUALITY_SCALE).max(0.0),
            alignment_accuracy,
            total_alignments: self.total_alignments,
            last_update: self.clock.now_ms(),
            ..Default::default()
        }
    }

    fn stats(&self) -> StrategyStats {
        StrategyStats::Hardware(HardwareStats {
            streams: self.offset_history.len(),
            total_alignments: self.total_alignments,
            hardware_timestamps: self.hardware_timestamps,
            reference_time: self.reference_time,
            max_drift: self.max_drift,
        })
    }

    fn cleanup(&mut self) {
        self.reference_time = None;
        self.offset_history.clear();
        self.max_drift = 0.0;
        self.total_alignments = 0;
        self.hardware_timestamps = 0;
        self.confidence_sum = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use contracts::SamplePayload;
    use std::sync::Arc;

    use crate::clock::ManualClock;

    fn aligner() -> HardwareAligner {
        HardwareAligner::new(HardwareConfig::default(), Arc::new(ManualClock::new(0)))
    }

    fn sample(stream_id: &str, timestamp: i64, hardware: Option<i64>) -> StreamSample {
        let sample = StreamSample::new(stream_id, timestamp, SamplePayload::Raw(Bytes::new()));
        match hardware {
            Some(hw) => sample.with_hardware_timestamp(hw),
            None => sample,
        }
    }

    #[test]
    fn test_first_sample_sets_reference() {
        let mut aligner = aligner();
        let result = aligner.align(&sample("cam", 1_000, Some(5_000)));

        assert_eq!(aligner.reference_time(), Some(5_000));
        assert_eq!(result.offset, 0);
        assert_eq!(result.aligned_timestamp, 5_000);
        assert!((result.confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_falls_back_to_software_timestamp() {
        let mut aligner = aligner();
        aligner.align(&sample("cam", 1_000, None));
        let result = aligner.align(&sample("mic", 1_040, None));

        assert_eq!(result.offset, 40);
        assert!(matches!(
            result.details,
            StrategyDetails::Hardware {
                used_hardware_timestamp: false,
                ..
            }
        ));
    }

    #[test]
    fn test_constant_offset_has_no_drift() {
        let mut aligner = aligner();
        aligner.align(&sample("ref", 0, Some(10_000)));

        for i in 0..10 {
            let result = aligner.align(&sample("cam", 1_000 + i, Some(10_250)));
            assert_eq!(result.drift, Some(0.0));
            assert_eq!(result.aligned_timestamp, 10_250);
            assert_eq!(result.offset, 250);
        }

        // Past the regression window the slope is still zero.
        for _ in 0..5 {
            let result = aligner.align(&sample("cam", 2_000, Some(10_250)));
            assert!(result.drift.unwrap().abs() < 1e-9);
            assert_eq!(result.aligned_timestamp, 10_250);
        }
    }

    #[test]
    fn test_linear_drift_is_estimated_and_removed() {
        let mut aligner = aligner();
        aligner.align(&sample("ref", 0, Some(0)));

        // Offset grows by 2ms per sample.
        let mut last = None;
        for i in 0..30 {
            let hw = 1_000 * i + 2 * i;
            last = Some(aligner.align(&sample("cam", 1_000 * i, Some(hw))));
        }
        let result = last.unwrap();
        let drift = result.drift.unwrap();

        // The fitted slope is exactly 1002ms per sample, scaled by 30 entries.
        assert!((drift - 1_002.0 * 30.0).abs() < 1e-3);
        // A perfect line leaves no residual variance.
        assert!((result.confidence - 0.95).abs() < 1e-9);
        assert!(aligner.quality().quality < 1.0);
    }

    #[test]
    fn test_noisy_offsets_reduce_confidence() {
        let mut aligner = aligner();
        aligner.align(&sample("ref", 0, Some(0)));

        let mut last = None;
        for i in 0..20 {
            let noise = if i % 2 == 0 { 60 } else { -60 };
            last = Some(aligner.align(&sample("cam", i, Some(500 + noise))));
        }
        let confidence = last.unwrap().confidence;
        assert!(confidence < 0.95);
        assert!(confidence >= 0.5);
    }

    #[test]
    fn test_history_is_capped() {
        let mut aligner = HardwareAligner::new(
            HardwareConfig {
                max_offset_history: 20,
                ..Default::default()
            },
            Arc::new(ManualClock::new(0)),
        );
        for i in 0..50 {
            aligner.align(&sample("cam", i, Some(i)));
        }
        assert_eq!(aligner.offset_history.get("cam").unwrap().len(), 20);
    }

    #[test]
    fn test_cleanup_resets_reference() {
        let mut aligner = aligner();
        aligner.align(&sample("cam", 0, Some(100)));
        aligner.cleanup();
        aligner.cleanup();

        assert_eq!(aligner.reference_time(), None);
        assert_eq!(aligner.quality().total_alignments, 0);
        aligner.align(&sample("cam", 0, Some(900)));
        assert_eq!(aligner.reference_time(), Some(900));
    }

    #[test]
    fn test_extreme_backwards_timestamps_saturate() {
        let mut aligner = aligner();
        let results: Vec<AlignmentResult> = (0..15i64)
            .map(|i| {
                let hw = i64::try_from(9_000_000_000_000_000_000i128 - i128::from(i) * 850_000_000_000_000_000).unwrap();
                aligner.align(&sample("cam", i, Some(hw)))
            })
            .collect();

        // The eleventh sample is the first with a drift estimate.
        assert_eq!(results[9].drift, Some(0.0));
        assert!(results[10].drift.unwrap() < 0.0);
        assert_eq!(results[10].aligned_timestamp, i64::MAX);
        assert!(results[14].aligned_timestamp > results[14].original_timestamp);
        assert_eq!(aligner.quality().total_alignments, 15);
    }
}
