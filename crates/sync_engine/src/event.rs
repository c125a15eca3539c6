//! Event-driven aligner.
//!
//! Every sample becomes an event with a feature vector. A new event is
//! correlated with recent events of the other streams; the best match above
//! `min_correlation_score` pins the aligned timestamp to the peer event.
//! Repeating subsequences within one stream raise confidence.

use std::collections::{HashMap, VecDeque};

use contracts::{
    AlignmentResult, EventConfig, StrategyDetails, StreamId, StreamSample, SyncMetrics,
    SyncStrategy,
};
use tracing::{debug, trace};

use crate::aligner::{Aligner, EventStats, StrategyStats};
use crate::clock::SharedClock;
use crate::features::EventFeatures;

/// Recent events per peer stream considered for correlation
const CORRELATION_CANDIDATES: usize = 10;
/// Events scanned for repeating patterns
const PATTERN_SCAN: usize = 20;
const MIN_PATTERN_LEN: usize = 3;
const MAX_EVENTS_PER_STREAM: usize = 200;
const FEATURE_WEIGHT: f64 = 0.7;
const TIME_WEIGHT: f64 = 0.3;

#[derive(Debug, Clone)]
struct StoredEvent {
    timestamp: i64,
    features: EventFeatures,
}

#[derive(Debug, Clone)]
struct Correlation {
    score: f64,
    timestamp: i64,
    stream_id: StreamId,
}

#[derive(Debug)]
pub struct EventAligner {
    config: EventConfig,
    clock: SharedClock,
    events: HashMap<StreamId, VecDeque<StoredEvent>>,
    total_events: u64,
    correlations_found: u64,
    patterns_detected: u64,
    evicted_events: u64,
    confidence_sum: f64,
}

impl EventAligner {
    pub fn new(config: EventConfig, clock: SharedClock) -> Self {
        Self {
            config,
            clock,
            events: HashMap::new(),
            total_events: 0,
            correlations_found: 0,
            patterns_detected: 0,
            evicted_events: 0,
            confidence_sum: 0.0,
        }
    }

    /// Drop events older than `max_event_age_ms` before `timestamp`.
    fn prune(&mut self, timestamp: i64) {
        let cutoff = timestamp - self.config.max_event_age_ms as i64;
        let mut evicted = 0u64;
        for events in self.events.values_mut() {
            let before = events.len();
            events.retain(|event| event.timestamp >= cutoff);
            evicted += (before - events.len()) as u64;
        }
        self.events.retain(|_, events| !events.is_empty());
        self.evicted_events += evicted;
    }

    /// Best scoring event of another stream within the correlation window.
    fn best_correlation(
        &self,
        stream_id: &StreamId,
        timestamp: i64,
        features: &EventFeatures,
    ) -> Option<Correlation> {
        let window = self.config.correlation_window_ms.max(1) as f64;
        let mut best: Option<Correlation> = None;

        for (peer_id, events) in &self.events {
            if peer_id == stream_id {
                continue;
            }
            let skip = events.len().saturating_sub(CORRELATION_CANDIDATES);
            for event in events.iter().skip(skip) {
                let dt = (timestamp - event.timestamp).abs() as f64;
                if dt > window {
                    continue;
                }
                let time_similarity = 1.0 - dt / window;
                let score = FEATURE_WEIGHT * features.similarity(&event.features)
                    + TIME_WEIGHT * time_similarity;
                if best.as_ref().map_or(true, |b| score > b.score) {
                    best = Some(Correlation {
                        score,
                        timestamp: event.timestamp,
                        stream_id: peer_id.clone(),
                    });
                }
            }
        }
        best
    }

    /// Highest similarity between the stream's latest subsequence and an
    /// earlier, non-overlapping subsequence of the same length.
    fn pattern_score(&self, stream_id: &StreamId) -> f64 {
        let Some(events) = self.events.get(stream_id) else {
            return 0.0;
        };
        let skip = events.len().saturating_sub(PATTERN_SCAN);
        let recent: Vec<&StoredEvent> = events.iter().skip(skip).collect();
        let n = recent.len();

        let mut best = 0.0f64;
        for len in MIN_PATTERN_LEN..=n / 2 {
            let latest = &recent[n - len..];
            for start in 0..=(n - 2 * len) {
                let candidate = &recent[start..start + len];
                let similarity = candidate
                    .iter()
                    .zip(latest)
                    .map(|(a, b)| a.features.similarity(&b.features))
                    .sum::<f64>()
                    / len as f64;
                best = best.max(similarity);
            }
        }
        best
    }
}

impl Aligner for EventAligner {
    fn strategy(&self) -> SyncStrategy {
        SyncStrategy::Event
    }

    fn align(&mut self, sample: &StreamSample) -> AlignmentResult {
        let features = EventFeatures::extract(sample);
        self.prune(sample.timestamp);

        let correlation = self.best_correlation(&sample.stream_id, sample.timestamp, &features);
        let correlation_score = correlation.as_ref().map_or(0.0, |c| c.score);
        let matched = correlation.filter(|c| c.score > self.config.min_correlation_score);

        let events = self.events.entry(sample.stream_id.clone()).or_default();
        events.push_back(StoredEvent {
            timestamp: sample.timestamp,
            features,
        });
        if events.len() > MAX_EVENTS_PER_STREAM {
            events.pop_front();
            self.evicted_events += 1;
        }
        self.total_events += 1;

        let raw_pattern = self.pattern_score(&sample.stream_id);
        let pattern_score = if raw_pattern > self.config.pattern_match_threshold {
            self.patterns_detected += 1;
            raw_pattern
        } else {
            0.0
        };

        let (aligned_timestamp, correlation_confidence) = match &matched {
            Some(m) => {
                self.correlations_found += 1;
                debug!(
                    stream_id = %sample.stream_id,
                    peer = %m.stream_id,
                    score = m.score,
                    delta_ms = sample.timestamp - m.timestamp,
                    "event correlation found"
                );
                (m.timestamp, m.score)
            }
            None => (sample.timestamp, 0.0),
        };

        let confidence = (FEATURE_WEIGHT * correlation_confidence + TIME_WEIGHT * pattern_score)
            .max(self.config.confidence_threshold)
            .min(1.0);
        self.confidence_sum += confidence;

        trace!(
            stream_id = %sample.stream_id,
            correlation_score,
            pattern_score,
            confidence,
            "event alignment"
        );

        AlignmentResult {
            stream_id: sample.stream_id.clone(),
            original_timestamp: sample.timestamp,
            aligned_timestamp,
            confidence,
            offset: sample.timestamp - aligned_timestamp,
            drift: None,
            strategy: SyncStrategy::Event,
            latency_ms: None,
            dropped_samples: 0,
            accuracy: confidence,
            details: StrategyDetails::Event {
                correlation_score,
                pattern_score,
                matched_stream: matched.map(|m| m.stream_id),
            },
        }
    }

    fn quality(&self) -> SyncMetrics {
        let now = self.clock.now_ms();
        if self.total_events == 0 {
            return SyncMetrics {
                last_update: now,
                ..Default::default()
            };
        }
        let total = self.total_events as f64;
        let accuracy = self.confidence_sum / total;

        SyncMetrics {
            quality: accuracy,
            alignment_accuracy: accuracy,
            correlation_rate: self.correlations_found as f64 / total,
            pattern_rate: self.patterns_detected as f64 / total,
            total_alignments: self.total_events,
            last_update: now,
            ..Default::default()
        }
    }

    fn stats(&self) -> StrategyStats {
        StrategyStats::Event(EventStats {
            streams: self.events.len(),
            total_events: self.total_events,
            active_events: self.events.values().map(VecDeque::len).sum(),
            correlations_found: self.correlations_found,
            patterns_detected: self.patterns_detected,
            evicted_events: self.evicted_events,
        })
    }

    fn cleanup(&mut self) {
        self.events.clear();
        self.total_events = 0;
        self.correlations_found = 0;
        self.patterns_detected = 0;
        self.evicted_events = 0;
        self.confidence_sum = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{EventMarker, SamplePayload};
    use std::sync::Arc;

    use crate::clock::ManualClock;

    fn aligner() -> EventAligner {
        EventAligner::new(EventConfig::default(), Arc::new(ManualClock::new(0)))
    }

    fn event(stream_id: &str, timestamp: i64, event_type: &str, magnitude: f64) -> StreamSample {
        StreamSample::new(
            stream_id,
            timestamp,
            SamplePayload::Event(EventMarker {
                event_type: event_type.to_owned(),
                magnitude,
                duration_ms: 50.0,
                frequency: 1.0,
            }),
        )
    }

    fn stats(aligner: &EventAligner) -> EventStats {
        match aligner.stats() {
            StrategyStats::Event(stats) => stats,
            other => panic!("unexpected stats {other:?}"),
        }
    }

    #[test]
    fn test_identical_events_correlate() {
        let mut aligner = aligner();
        aligner.align(&event("camera", 1_000, "flash", 5.0));
        let result = aligner.align(&event("mic", 1_050, "flash", 5.0));

        let StrategyDetails::Event {
            correlation_score,
            matched_stream,
            ..
        } = &result.details
        else {
            panic!("event details expected");
        };
        // 0.7 * 1.0 + 0.3 * (1 - 50/1000)
        assert!((correlation_score - 0.985).abs() < 1e-9);
        assert!(*correlation_score > EventConfig::default().min_correlation_score);
        assert_eq!(matched_stream.as_ref().unwrap(), "camera");
        assert_eq!(result.aligned_timestamp, 1_000);
        assert_eq!(result.offset, 50);
        assert!((result.confidence - 0.7 * 0.985).abs() < 1e-9);
    }

    #[test]
    fn test_events_outside_window_do_not_correlate() {
        let mut aligner = aligner();
        aligner.align(&event("camera", 1_000, "flash", 5.0));
        let result = aligner.align(&event("mic", 2_500, "flash", 5.0));

        assert_eq!(result.aligned_timestamp, 2_500);
        assert_eq!(result.offset, 0);
        assert!((result.confidence - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_same_stream_never_matches_itself() {
        let mut aligner = aligner();
        aligner.align(&event("camera", 1_000, "flash", 5.0));
        let result = aligner.align(&event("camera", 1_010, "flash", 5.0));
        assert_eq!(result.aligned_timestamp, 1_010);
    }

    #[test]
    fn test_repeating_pattern_detected() {
        let mut aligner = aligner();
        let cycle = [("step", 1.0), ("turn", 8.0), ("stop", 20.0)];
        let mut last = None;
        for i in 0..6 {
            let (kind, magnitude) = cycle[i % 3];
            last = Some(aligner.align(&event("imu", 100 * i as i64, kind, magnitude)));
        }

        let StrategyDetails::Event { pattern_score, .. } = last.unwrap().details else {
            panic!("event details expected");
        };
        assert!((pattern_score - 1.0).abs() < 1e-9);
        assert_eq!(stats(&aligner).patterns_detected, 1);
    }

    #[test]
    fn test_old_events_are_pruned() {
        let mut aligner = aligner();
        aligner.align(&event("camera", 0, "flash", 5.0));
        aligner.align(&event("mic", 100, "flash", 5.0));
        aligner.align(&event("camera", 10_000, "flash", 5.0));

        let stats = stats(&aligner);
        assert_eq!(stats.evicted_events, 2);
        assert_eq!(stats.active_events, 1);
        assert_eq!(stats.streams, 1);
    }

    #[test]
    fn test_per_stream_cap() {
        let mut aligner = aligner();
        for i in 0..(MAX_EVENTS_PER_STREAM as i64 + 5) {
            aligner.align(&event("imu", i, "tick", 1.0));
        }
        let stats = stats(&aligner);
        assert_eq!(stats.active_events, MAX_EVENTS_PER_STREAM);
        assert_eq!(stats.evicted_events, 5);
    }

    #[test]
    fn test_quality_rates_and_cleanup() {
        let mut aligner = aligner();
        aligner.align(&event("camera", 1_000, "flash", 5.0));
        aligner.align(&event("mic", 1_020, "flash", 5.0));

        let quality = aligner.quality();
        assert_eq!(quality.total_alignments, 2);
        assert!((quality.correlation_rate - 0.5).abs() < 1e-9);

        aligner.cleanup();
        aligner.cleanup();
        assert_eq!(stats(&aligner), EventStats::default());
        assert_eq!(aligner.quality().total_alignments, 0);
    }
}
