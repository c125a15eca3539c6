//! Synthetic stream sources.
//!
//! 每条流有独立的时钟偏移 (skew)、漂移 (drift, ppm) 和抖动 (jitter)。
//! 每个整秒注入一次刺激事件，在所有流的负载中同时可见，供事件对齐使用。

use bytes::Bytes;
use contracts::{
    AudioChunk, GazePoint, SamplePayload, StreamId, StreamSample, SyncError, TelemetryReading,
    VideoFrame,
};
use rand::rngs::StdRng;
use rand::Rng;
use serde::Serialize;
use sync_engine::{Clock, SystemClock, TimeExchange, TimeSyncProvider};

use crate::cli::SimStream;

const STIMULUS_PERIOD_MS: f64 = 1_000.0;

/// Clock characteristics of one synthetic stream
#[derive(Debug, Clone, Serialize)]
pub struct StreamProfile {
    pub id: StreamId,
    #[serde(skip)]
    pub kind: SimStream,
    pub period_ms: f64,
    /// Constant offset of the stream clock (ms)
    pub skew_ms: f64,
    /// Clock rate error (parts per million)
    pub drift_ppm: f64,
    /// Uniform timestamp noise amplitude (ms)
    pub jitter_ms: f64,
    /// Whether samples carry a device timestamp
    pub hardware_clock: bool,
}

impl StreamProfile {
    pub fn for_kind(kind: SimStream, rng: &mut StdRng) -> Self {
        let (id, hz, base_jitter, hardware_clock) = match kind {
            SimStream::Video => ("video", 30.0, 2.0, true),
            SimStream::Audio => ("audio", 50.0, 1.0, false),
            SimStream::Gaze => ("gaze", 120.0, 0.5, true),
            SimStream::Telemetry => ("telemetry", 10.0, 5.0, false),
        };

        Self {
            id: StreamId::from(id),
            kind,
            period_ms: 1_000.0 / hz,
            skew_ms: rng.random_range(-40.0..40.0),
            drift_ppm: rng.random_range(-200.0..200.0),
            jitter_ms: base_jitter * rng.random_range(0.5..1.5),
            hardware_clock,
        }
    }
}

/// Periodic sample generator for one stream
#[derive(Debug)]
pub struct SyntheticStream {
    profile: StreamProfile,
    next_due_ms: f64,
    last_stimulus: Option<u64>,
    emitted: u64,
}

impl SyntheticStream {
    pub fn new(profile: StreamProfile) -> Self {
        Self {
            profile,
            next_due_ms: 0.0,
            last_stimulus: None,
            emitted: 0,
        }
    }

    pub fn profile(&self) -> &StreamProfile {
        &self.profile
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Emit every sample due at or before `elapsed_ms` after `origin_ms`.
    pub fn poll(&mut self, origin_ms: i64, elapsed_ms: f64, rng: &mut StdRng) -> Vec<StreamSample> {
        let mut samples = Vec::new();

        while self.next_due_ms <= elapsed_ms {
            let due = self.next_due_ms;
            self.next_due_ms += self.profile.period_ms;

            let second = (due / STIMULUS_PERIOD_MS).floor() as u64;
            let stimulus = self.last_stimulus != Some(second);
            self.last_stimulus = Some(second);

            let drift = self.profile.drift_ppm * due / 1_000_000.0;
            let jitter = if self.profile.jitter_ms > 0.0 {
                rng.random_range(-self.profile.jitter_ms..self.profile.jitter_ms)
            } else {
                0.0
            };
            let timestamp =
                (origin_ms as f64 + due + self.profile.skew_ms + drift + jitter).round() as i64;

            let payload = self.payload(stimulus, rng);
            let mut sample = StreamSample::new(self.profile.id.clone(), timestamp, payload);
            if self.profile.hardware_clock {
                sample = sample.with_hardware_timestamp((origin_ms as f64 + due + drift).round() as i64);
            }

            samples.push(sample);
            self.emitted += 1;
        }

        samples
    }

    fn payload(&self, stimulus: bool, rng: &mut StdRng) -> SamplePayload {
        match self.profile.kind {
            SimStream::Video => SamplePayload::Video(VideoFrame {
                width: 640,
                height: 480,
                motion: if stimulus {
                    0.9
                } else {
                    rng.random_range(0.05..0.2)
                },
                brightness: if stimulus { 0.95 } else { 0.5 },
                data: Bytes::new(),
            }),
            SimStream::Audio => SamplePayload::Audio(AudioChunk {
                sample_rate: 48_000,
                energy: if stimulus {
                    0.8
                } else {
                    rng.random_range(0.05..0.15)
                },
                dominant_frequency: if stimulus { 440.0 } else { 120.0 },
                duration_ms: self.profile.period_ms,
                data: Bytes::new(),
            }),
            SimStream::Gaze => SamplePayload::Gaze(GazePoint {
                x: (0.5_f64 + rng.random_range(-0.05..0.05)).clamp(0.0, 1.0),
                y: (0.5_f64 + rng.random_range(-0.05..0.05)).clamp(0.0, 1.0),
                velocity: if stimulus {
                    300.0
                } else {
                    rng.random_range(5.0..20.0)
                },
                fixation: !stimulus,
            }),
            SimStream::Telemetry => SamplePayload::Telemetry(TelemetryReading {
                channel: "heart_rate".to_string(),
                value: if stimulus {
                    95.0
                } else {
                    70.0 + rng.random_range(-2.0..2.0)
                },
            }),
        }
    }
}

/// Time server whose clock runs `offset_ms` ahead of the local system clock.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedTimeServer {
    offset_ms: i64,
}

impl SimulatedTimeServer {
    pub fn new(offset_ms: i64) -> Self {
        Self { offset_ms }
    }
}

impl TimeSyncProvider for SimulatedTimeServer {
    fn exchange(&self, _t1: i64) -> Result<TimeExchange, SyncError> {
        let now = SystemClock.now_ms() + self.offset_ms;
        Ok(TimeExchange { t2: now, t3: now })
    }
}
