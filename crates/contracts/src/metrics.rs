//! SyncMetrics - quality snapshot value type
//!
//! Pure value: every derived figure (`compute_overall_quality`, grade, report)
//! is computed from the fields, nothing is cached.

use serde::{Deserialize, Serialize};
use std::fmt;

const JITTER_PENALTY_CAP: f64 = 0.3;
const DROP_PENALTY_CAP: f64 = 0.4;
const LATENCY_PENALTY_CAP: f64 = 0.2;

/// Alignment quality snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMetrics {
    /// Base quality (0-1) before penalties
    pub quality: f64,

    /// Mean latency (ms)
    pub latency: f64,

    /// Latency standard deviation (ms)
    pub jitter: f64,

    /// Dropped samples
    pub dropped_samples: u64,

    /// Mean alignment accuracy (0-1)
    pub alignment_accuracy: f64,

    /// Buffer fill ratio (0-1), buffer strategy only
    pub buffer_utilization: f64,

    /// Share of events that found a cross-stream correlation (0-1)
    pub correlation_rate: f64,

    /// Share of events that completed a repeating pattern (0-1)
    pub pattern_rate: f64,

    /// Samples aligned so far
    pub total_alignments: u64,

    /// Snapshot time (ms)
    pub last_update: i64,

    /// Last successful clock sync (ms), software strategy only
    pub last_sync: Option<i64>,
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self {
            quality: 1.0,
            latency: 0.0,
            jitter: 0.0,
            dropped_samples: 0,
            alignment_accuracy: 1.0,
            buffer_utilization: 0.0,
            correlation_rate: 0.0,
            pattern_rate: 0.0,
            total_alignments: 0,
            last_update: 0,
            last_sync: None,
        }
    }
}

impl SyncMetrics {
    /// Quality after jitter, drop and latency penalties, floored at 0.
    pub fn compute_overall_quality(&self) -> f64 {
        let penalties = self.penalties();
        (self.quality - penalties.jitter - penalties.dropped - penalties.latency).clamp(0.0, 1.0)
    }

    pub fn quality_grade(&self) -> QualityGrade {
        QualityGrade::from_score(self.compute_overall_quality())
    }

    pub fn penalties(&self) -> QualityPenalties {
        QualityPenalties {
            jitter: (self.jitter.max(0.0) / 100.0).min(JITTER_PENALTY_CAP),
            dropped: (self.dropped_samples as f64 / 1000.0).min(DROP_PENALTY_CAP),
            latency: (self.latency.max(0.0) / 1000.0).min(LATENCY_PENALTY_CAP),
        }
    }

    pub fn quality_report(&self) -> QualityReport {
        let penalties = self.penalties();
        let mut recommendations = Vec::new();

        if penalties.jitter >= 0.1 {
            recommendations
                .push("high latency jitter: enable adaptive buffering or grow buffer_size".into());
        }
        if penalties.dropped >= 0.1 {
            recommendations.push(
                "many dropped samples: raise max_buffer_latency or reduce input rate".into(),
            );
        }
        if penalties.latency >= 0.1 {
            recommendations
                .push("high latency: prefer hardware timestamps when the device has them".into());
        }
        if self.quality < 0.6 {
            recommendations.push("low base confidence: consider switching strategy".into());
        }

        QualityReport {
            overall: self.compute_overall_quality(),
            grade: self.quality_grade(),
            penalties,
            metrics: self.clone(),
            recommendations,
        }
    }
}

/// Penalty breakdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityPenalties {
    pub jitter: f64,
    pub dropped: f64,
    pub latency: f64,
}

/// Human-oriented quality summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub overall: f64,
    pub grade: QualityGrade,
    pub penalties: QualityPenalties,
    pub metrics: SyncMetrics,
    pub recommendations: Vec<String>,
}

/// Letter grade of `compute_overall_quality()`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QualityGrade {
    A,
    B,
    C,
    D,
    F,
}

impl QualityGrade {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            QualityGrade::A
        } else if score >= 0.8 {
            QualityGrade::B
        } else if score >= 0.7 {
            QualityGrade::C
        } else if score >= 0.6 {
            QualityGrade::D
        } else {
            QualityGrade::F
        }
    }

    /// A grade the consumer can run on without degrading service (A-C).
    pub fn is_acceptable(&self) -> bool {
        *self <= QualityGrade::C
    }
}

impl fmt::Display for QualityGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            QualityGrade::A => "A",
            QualityGrade::B => "B",
            QualityGrade::C => "C",
            QualityGrade::D => "D",
            QualityGrade::F => "F",
        };
        f.write_str(letter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(quality: f64, jitter: f64, dropped: u64, latency: f64) -> SyncMetrics {
        SyncMetrics {
            quality,
            jitter,
            dropped_samples: dropped,
            latency,
            ..Default::default()
        }
    }

    #[test]
    fn test_grade_boundaries() {
        assert_eq!(metrics(0.95, 0.0, 0, 0.0).quality_grade(), QualityGrade::A);
        assert_eq!(metrics(0.85, 0.0, 0, 0.0).quality_grade(), QualityGrade::B);
        assert_eq!(metrics(0.75, 0.0, 0, 0.0).quality_grade(), QualityGrade::C);
        assert_eq!(metrics(0.65, 0.0, 0, 0.0).quality_grade(), QualityGrade::D);
        assert_eq!(metrics(0.5, 0.0, 0, 0.0).quality_grade(), QualityGrade::F);

        assert_eq!(QualityGrade::from_score(0.9), QualityGrade::A);
        assert_eq!(QualityGrade::from_score(0.8), QualityGrade::B);
        assert_eq!(QualityGrade::from_score(0.7), QualityGrade::C);
        assert_eq!(QualityGrade::from_score(0.6), QualityGrade::D);
    }

    #[test]
    fn test_overall_quality_non_increasing_in_penalties() {
        let steps = [0.0, 5.0, 20.0, 50.0, 150.0, 500.0, 5000.0];
        for base in [0.2, 0.6, 1.0] {
            for pair in steps.windows(2) {
                let (lo, hi) = (pair[0], pair[1]);
                assert!(
                    metrics(base, hi, 10, 10.0).compute_overall_quality()
                        <= metrics(base, lo, 10, 10.0).compute_overall_quality()
                );
                assert!(
                    metrics(base, 10.0, hi as u64, 10.0).compute_overall_quality()
                        <= metrics(base, 10.0, lo as u64, 10.0).compute_overall_quality()
                );
                assert!(
                    metrics(base, 10.0, 10, hi).compute_overall_quality()
                        <= metrics(base, 10.0, 10, lo).compute_overall_quality()
                );
            }
        }
    }

    #[test]
    fn test_overall_quality_floor_and_caps() {
        let worst = metrics(0.5, 1e6, 1_000_000, 1e6);
        assert_eq!(worst.compute_overall_quality(), 0.0);

        let capped = metrics(1.0, 1e6, 0, 0.0);
        assert!((capped.compute_overall_quality() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_report_recommendations() {
        let report = metrics(0.9, 15.0, 0, 0.0).quality_report();
        assert_eq!(report.grade, QualityGrade::C);
        assert_eq!(report.recommendations.len(), 1);
        assert!(report.recommendations[0].contains("jitter"));
        assert!(metrics(1.0, 0.0, 0, 0.0).quality_report().recommendations.is_empty());
    }
}
