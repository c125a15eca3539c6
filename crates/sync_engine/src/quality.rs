//! Quality calculator: batch summaries, rolling history, alerts and trend.

use std::collections::VecDeque;

use contracts::{
    AlertKind, AlignmentResult, HistogramBucket, QualityAlert, QualityConfig,
    QualityDegradationEvent, QualityTrend, Severity, StrategyDetails, SyncMetrics,
    TrendDirection,
};
use tracing::{debug, warn};

use crate::clock::SharedClock;
use crate::math::{least_squares, mean, population_std_dev};

const MAX_LOG_ENTRIES: usize = 50;
const LOG_PRUNE: usize = 10;
const DEGRADATION_SPAN: usize = 5;
const MIN_TREND_SAMPLES: usize = 10;
const TREND_WINDOW: usize = 20;
const STABLE_SLOPE: f64 = 0.001;
const FALLBACK_WEIGHT: f64 = 0.5;
const CRITICAL_QUALITY: f64 = 0.4;
const HIGH_DEGRADATION: f64 = 0.2;

/// Result of feeding one batch into the calculator
#[derive(Debug, Clone, PartialEq)]
pub struct QualityUpdate {
    pub metrics: SyncMetrics,
    pub alerts: Vec<QualityAlert>,
    pub degradation: Option<QualityDegradationEvent>,
}

#[derive(Debug)]
pub struct QualityCalculator {
    config: QualityConfig,
    clock: SharedClock,
    history: VecDeque<SyncMetrics>,
    alerts: VecDeque<QualityAlert>,
    degradations: VecDeque<QualityDegradationEvent>,
    total_alerts: u64,
}

impl QualityCalculator {
    pub fn new(config: QualityConfig, clock: SharedClock) -> Self {
        let window = config.quality_window;
        Self {
            config,
            clock,
            history: VecDeque::with_capacity(window),
            alerts: VecDeque::new(),
            degradations: VecDeque::new(),
            total_alerts: 0,
        }
    }

    /// Summarize one batch of alignment results. Does not touch the history.
    pub fn summarize(results: &[AlignmentResult], now: i64) -> SyncMetrics {
        if results.is_empty() {
            return SyncMetrics {
                last_update: now,
                ..Default::default()
            };
        }

        let (weighted, weights) = results.iter().fold((0.0, 0.0), |(sum, total), result| {
            let weight = if result.confidence.is_finite() && result.confidence > 0.0 {
                result.confidence
            } else {
                FALLBACK_WEIGHT
            };
            (sum + weight * weight, total + weight)
        });

        let latencies: Vec<f64> = results.iter().filter_map(|r| r.latency_ms).collect();
        let accuracies: Vec<f64> = results.iter().map(|r| r.accuracy).collect();

        let mut utilization = Vec::new();
        let (mut events, mut matched, mut patterned) = (0usize, 0usize, 0usize);
        let mut freshest_sync_age: Option<i64> = None;
        for result in results {
            match &result.details {
                StrategyDetails::Buffer {
                    buffer_size,
                    optimal_size,
                    ..
                } => utilization.push(*buffer_size as f64 / (*optimal_size).max(1) as f64),
                StrategyDetails::Event {
                    pattern_score,
                    matched_stream,
                    ..
                } => {
                    events += 1;
                    matched += usize::from(matched_stream.is_some());
                    patterned += usize::from(*pattern_score > 0.0);
                }
                StrategyDetails::Software { sync_age_ms, .. } => {
                    freshest_sync_age =
                        Some(freshest_sync_age.map_or(*sync_age_ms, |age| age.min(*sync_age_ms)));
                }
                StrategyDetails::Hardware { .. } => {}
            }
        }
        let rate = |count: usize| {
            if events == 0 {
                0.0
            } else {
                count as f64 / events as f64
            }
        };

        SyncMetrics {
            quality: (weighted / weights).clamp(0.0, 1.0),
            latency: mean(&latencies),
            jitter: population_std_dev(&latencies),
            dropped_samples: results.iter().map(|r| r.dropped_samples).sum(),
            alignment_accuracy: mean(&accuracies),
            buffer_utilization: mean(&utilization),
            correlation_rate: rate(matched),
            pattern_rate: rate(patterned),
            total_alignments: results.len() as u64,
            last_update: now,
            last_sync: freshest_sync_age.map(|age| now - age),
        }
    }

    /// Summarize a batch, append it to the history and raise alerts.
    ///
    /// An empty batch is summarized as such but leaves history and alerts alone.
    pub fn update_quality(&mut self, results: &[AlignmentResult]) -> QualityUpdate {
        let now = self.clock.now_ms();
        if results.is_empty() {
            return QualityUpdate {
                metrics: Self::summarize(&[], now),
                alerts: Vec::new(),
                degradation: None,
            };
        }

        let metrics = Self::summarize(results, now);
        self.history.push_back(metrics.clone());
        while self.history.len() > self.config.quality_window.max(1) {
            self.history.pop_front();
        }

        let mut alerts = Vec::new();
        let degradation = self.check_degradation(now);
        if let Some(event) = &degradation {
            alerts.push(QualityAlert {
                kind: AlertKind::QualityDegradation,
                severity: event.severity,
                message: format!(
                    "quality dropped by {:.3} (from {:.3} to {:.3})",
                    event.degradation, event.previous_quality, event.recent_quality
                ),
                value: event.degradation,
                threshold: self.config.degradation_threshold,
                timestamp: now,
            });
        }

        let overall = metrics.compute_overall_quality();
        if overall < self.config.alert_threshold {
            let severity = if overall < CRITICAL_QUALITY {
                Severity::Critical
            } else {
                Severity::Warning
            };
            warn!(
                overall,
                threshold = self.config.alert_threshold,
                severity = severity.as_str(),
                "low synchronization quality"
            );
            alerts.push(QualityAlert {
                kind: AlertKind::LowQuality,
                severity,
                message: format!(
                    "overall quality {overall:.3} below threshold {:.3}",
                    self.config.alert_threshold
                ),
                value: overall,
                threshold: self.config.alert_threshold,
                timestamp: now,
            });
        }

        for alert in &alerts {
            push_bounded(&mut self.alerts, alert.clone());
        }
        self.total_alerts += alerts.len() as u64;

        QualityUpdate {
            metrics,
            alerts,
            degradation,
        }
    }

    fn check_degradation(&mut self, now: i64) -> Option<QualityDegradationEvent> {
        let n = self.history.len();
        if n < DEGRADATION_SPAN * 2 {
            return None;
        }

        let overall: Vec<f64> = self
            .history
            .iter()
            .skip(n - DEGRADATION_SPAN * 2)
            .map(SyncMetrics::compute_overall_quality)
            .collect();
        let previous_quality = mean(&overall[..DEGRADATION_SPAN]);
        let recent_quality = mean(&overall[DEGRADATION_SPAN..]);
        let degradation = previous_quality - recent_quality;
        if degradation <= self.config.degradation_threshold {
            return None;
        }

        let severity = if degradation > HIGH_DEGRADATION {
            Severity::High
        } else {
            Severity::Medium
        };
        warn!(
            previous_quality,
            recent_quality,
            degradation,
            severity = severity.as_str(),
            "synchronization quality degradation"
        );

        let event = QualityDegradationEvent {
            timestamp: now,
            previous_quality,
            recent_quality,
            degradation,
            severity,
        };
        push_bounded(&mut self.degradations, event.clone());
        Some(event)
    }

    /// Latest snapshot, or the default before any batch.
    pub fn current_metrics(&self) -> SyncMetrics {
        self.history.back().cloned().unwrap_or_else(|| SyncMetrics {
            last_update: self.clock.now_ms(),
            ..Default::default()
        })
    }

    pub fn history(&self) -> impl Iterator<Item = &SyncMetrics> + '_ {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn alerts(&self) -> impl Iterator<Item = &QualityAlert> + '_ {
        self.alerts.iter()
    }

    pub fn degradation_events(&self) -> impl Iterator<Item = &QualityDegradationEvent> + '_ {
        self.degradations.iter()
    }

    /// Alerts raised since construction or the last cleanup, including pruned ones.
    pub fn total_alerts(&self) -> u64 {
        self.total_alerts
    }

    /// Direction of overall quality over the most recent snapshots.
    pub fn quality_trend(&self) -> QualityTrend {
        let n = self.history.len();
        if n < MIN_TREND_SAMPLES {
            return QualityTrend::insufficient(n);
        }

        let window = n.min(TREND_WINDOW);
        let slope = least_squares(
            self.history
                .iter()
                .skip(n - window)
                .enumerate()
                .map(|(i, m)| (i as f64, m.compute_overall_quality())),
        )
        .map(|fit| fit.slope)
        .unwrap_or(0.0);

        let direction = if slope.abs() < STABLE_SLOPE {
            TrendDirection::Stable
        } else if slope > 0.0 {
            TrendDirection::Improving
        } else {
            TrendDirection::Degrading
        };

        QualityTrend {
            direction,
            slope,
            confidence: (window as f64 / TREND_WINDOW as f64).min(1.0),
            samples: window,
        }
    }

    /// Histogram of overall quality over the observed min..max range.
    pub fn quality_histogram(&self, buckets: usize) -> Vec<HistogramBucket> {
        let values: Vec<f64> = self
            .history
            .iter()
            .map(SyncMetrics::compute_overall_quality)
            .collect();
        if values.is_empty() || buckets == 0 {
            return Vec::new();
        }

        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if (max - min).abs() < f64::EPSILON {
            return vec![HistogramBucket {
                lower: min,
                upper: max,
                count: values.len(),
            }];
        }

        let width = (max - min) / buckets as f64;
        let mut histogram: Vec<HistogramBucket> = (0..buckets)
            .map(|i| HistogramBucket {
                lower: min + width * i as f64,
                upper: min + width * (i + 1) as f64,
                count: 0,
            })
            .collect();
        for value in values {
            let index = (((value - min) / width).floor() as usize).min(buckets - 1);
            histogram[index].count += 1;
        }
        histogram
    }

    pub fn cleanup(&mut self) {
        self.history.clear();
        self.alerts.clear();
        self.degradations.clear();
        self.total_alerts = 0;
        debug!("quality calculator reset");
    }
}

fn push_bounded<T>(log: &mut VecDeque<T>, entry: T) {
    log.push_back(entry);
    if log.len() > MAX_LOG_ENTRIES {
        log.drain(..LOG_PRUNE);
    }
}
