//! Feature vectors for event correlation.

use std::collections::BTreeMap;

use contracts::{SamplePayload, StreamSample};

/// Numeric features plus an event type label
#[derive(Debug, Clone, PartialEq)]
pub struct EventFeatures {
    pub event_type: String,
    pub values: BTreeMap<&'static str, f64>,
}

impl EventFeatures {
    /// Extract features from a sample payload.
    ///
    /// `magnitude`, `duration` and `frequency` are always present (zero when the
    /// payload has no such notion); payload specific extras are added on top.
    pub fn extract(sample: &StreamSample) -> Self {
        let (event_type, magnitude, duration, frequency, extras): (String, f64, f64, f64, Vec<_>) =
            match &sample.payload {
                SamplePayload::Event(marker) => (
                    marker.event_type.clone(),
                    marker.magnitude,
                    marker.duration_ms,
                    marker.frequency,
                    Vec::new(),
                ),
                SamplePayload::Video(frame) => (
                    sample.payload.kind().as_str().to_owned(),
                    frame.motion,
                    0.0,
                    0.0,
                    vec![("motion", frame.motion), ("brightness", frame.brightness)],
                ),
                SamplePayload::Audio(chunk) => (
                    sample.payload.kind().as_str().to_owned(),
                    chunk.energy,
                    chunk.duration_ms,
                    chunk.dominant_frequency,
                    vec![("energy", chunk.energy)],
                ),
                SamplePayload::Gaze(point) => (
                    if point.fixation { "fixation" } else { "saccade" }.to_owned(),
                    point.velocity,
                    0.0,
                    0.0,
                    vec![("velocity", point.velocity)],
                ),
                SamplePayload::Telemetry(reading) => (
                    reading.channel.clone(),
                    reading.value,
                    0.0,
                    0.0,
                    vec![("value", reading.value)],
                ),
                SamplePayload::Raw(bytes) => (
                    sample.payload.kind().as_str().to_owned(),
                    0.0,
                    0.0,
                    0.0,
                    vec![("size", bytes.len() as f64)],
                ),
            };

        let mut values = BTreeMap::new();
        values.insert("magnitude", magnitude);
        values.insert("duration", duration);
        values.insert("frequency", frequency);
        values.extend(extras);

        Self { event_type, values }
    }

    /// Mean of the per-key similarities, the event type counting as one key.
    ///
    /// Keys present on only one side score zero.
    pub fn similarity(&self, other: &EventFeatures) -> f64 {
        let mut total = if self.event_type == other.event_type {
            1.0
        } else {
            0.0
        };
        let mut keys = 1usize;

        for (key, &a) in &self.values {
            keys += 1;
            if let Some(&b) = other.values.get(key) {
                total += value_similarity(a, b);
            }
        }
        keys += other
            .values
            .keys()
            .filter(|key| !self.values.contains_key(*key))
            .count();

        total / keys as f64
    }
}

/// `1 - |a - b| / max(|a|, |b|)`, or 1 when both are zero.
pub fn value_similarity(a: f64, b: f64) -> f64 {
    let scale = a.abs().max(b.abs());
    if scale == 0.0 {
        1.0
    } else {
        (1.0 - (a - b).abs() / scale).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{AudioChunk, EventMarker, GazePoint};

    fn marker(event_type: &str, magnitude: f64) -> StreamSample {
        StreamSample::new(
            "events",
            0,
            SamplePayload::Event(EventMarker {
                event_type: event_type.to_owned(),
                magnitude,
                duration_ms: 100.0,
                frequency: 2.0,
            }),
        )
    }

    #[test]
    fn test_value_similarity() {
        assert_eq!(value_similarity(0.0, 0.0), 1.0);
        assert_eq!(value_similarity(10.0, 5.0), 0.5);
        assert_eq!(value_similarity(-1.0, 1.0), 0.0);
    }

    #[test]
    fn test_identical_features_are_fully_similar() {
        let a = EventFeatures::extract(&marker("blink", 3.0));
        let b = EventFeatures::extract(&marker("blink", 3.0));
        assert!((a.similarity(&b) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_type_mismatch_lowers_similarity() {
        let a = EventFeatures::extract(&marker("blink", 3.0));
        let b = EventFeatures::extract(&marker("clap", 3.0));
        // 4 keys: type differs, magnitude/duration/frequency match
        assert!((a.similarity(&b) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_payload_extras() {
        let audio = StreamSample::new(
            "mic",
            0,
            SamplePayload::Audio(AudioChunk {
                sample_rate: 48_000,
                energy: 0.4,
                dominant_frequency: 440.0,
                duration_ms: 20.0,
                data: Default::default(),
            }),
        );
        let features = EventFeatures::extract(&audio);
        assert_eq!(features.event_type, "audio");
        assert_eq!(features.values["energy"], 0.4);
        assert_eq!(features.values["frequency"], 440.0);

        let gaze = StreamSample::new(
            "eye",
            0,
            SamplePayload::Gaze(GazePoint {
                x: 0.5,
                y: 0.5,
                velocity: 30.0,
                fixation: false,
            }),
        );
        let gaze = EventFeatures::extract(&gaze);
        assert_eq!(gaze.event_type, "saccade");
        // Disjoint extras count against similarity.
        assert!(features.similarity(&gaze) < 0.5);
    }
}
