//! Quality monitoring outputs: alerts, degradation events, trend, histogram.

use serde::{Deserialize, Serialize};

/// Alert / degradation severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// Alert category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// A single snapshot fell below the alert threshold
    LowQuality,
    /// Recent snapshots are markedly worse than the ones before
    QualityDegradation,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::LowQuality => "low_quality",
            AlertKind::QualityDegradation => "quality_degradation",
        }
    }
}

/// Quality alert log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAlert {
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    /// Observed value that triggered the alert
    pub value: f64,
    /// Threshold it was compared against
    pub threshold: f64,
    pub timestamp: i64,
}

/// Degradation log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityDegradationEvent {
    pub timestamp: i64,
    /// Mean overall quality of the earlier window
    pub previous_quality: f64,
    /// Mean overall quality of the most recent window
    pub recent_quality: f64,
    /// `previous_quality - recent_quality`
    pub degradation: f64,
    pub severity: Severity,
}

/// Trend direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    InsufficientData,
    Stable,
    Improving,
    Degrading,
}

/// Least-squares trend over recent quality snapshots
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityTrend {
    pub direction: TrendDirection,
    /// Overall-quality change per snapshot
    pub slope: f64,
    /// `min(1, n / 20)`
    pub confidence: f64,
    /// Snapshots used
    pub samples: usize,
}

impl QualityTrend {
    pub fn insufficient(samples: usize) -> Self {
        Self {
            direction: TrendDirection::InsufficientData,
            slope: 0.0,
            confidence: 0.0,
            samples,
        }
    }
}

/// One equal-width histogram bucket `[lower, upper)`; the last bucket is closed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramBucket {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}
