//! StreamSample - coordinator input
//!
//! One timestamped sample of a real-time stream.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{StreamId, SyncError};

/// Raw stream sample
///
/// Produced by upstream capture and immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSample {
    /// Stream ID
    pub stream_id: StreamId,

    /// Capture timestamp in the producer's clock (ms)
    pub timestamp: i64,

    /// Device timestamp (ms), when the capture hardware provides one
    #[serde(default)]
    pub hardware_timestamp: Option<i64>,

    /// Domain payload
    pub payload: SamplePayload,
}

impl StreamSample {
    pub fn new(stream_id: impl Into<StreamId>, timestamp: i64, payload: SamplePayload) -> Self {
        Self {
            stream_id: stream_id.into(),
            timestamp,
            hardware_timestamp: None,
            payload,
        }
    }

    pub fn with_hardware_timestamp(mut self, hardware_timestamp: i64) -> Self {
        self.hardware_timestamp = Some(hardware_timestamp);
        self
    }

    /// Hardware timestamp when present, the software timestamp otherwise.
    #[inline]
    pub fn best_timestamp(&self) -> i64 {
        self.hardware_timestamp.unwrap_or(self.timestamp)
    }

    /// Ingestion-boundary validation.
    ///
    /// # Errors
    /// `SyncError::InvalidSample` for a blank stream id or negative timestamps.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.stream_id.is_blank() {
            return Err(SyncError::invalid_sample(
                self.stream_id.as_str(),
                "stream_id must not be empty",
            ));
        }
        if self.timestamp < 0 {
            return Err(SyncError::invalid_sample(
                self.stream_id.as_str(),
                format!("timestamp must be >= 0, got {}", self.timestamp),
            ));
        }
        if let Some(hw) = self.hardware_timestamp {
            if hw < 0 {
                return Err(SyncError::invalid_sample(
                    self.stream_id.as_str(),
                    format!("hardware_timestamp must be >= 0, got {hw}"),
                ));
            }
        }
        Ok(())
    }
}

/// Kind of stream a payload belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Video,
    Audio,
    Gaze,
    Telemetry,
    Event,
    Other,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Video => "video",
            StreamKind::Audio => "audio",
            StreamKind::Gaze => "gaze",
            StreamKind::Telemetry => "telemetry",
            StreamKind::Event => "event",
            StreamKind::Other => "other",
        }
    }
}

/// Stream payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SamplePayload {
    /// Video frame
    Video(VideoFrame),

    /// Audio chunk
    Audio(AudioChunk),

    /// Eye-tracker gaze point
    Gaze(GazePoint),

    /// Scalar telemetry reading
    Telemetry(TelemetryReading),

    /// Discrete event marker (button press, stimulus onset, ...)
    Event(EventMarker),

    /// Opaque bytes (fallback)
    Raw(Bytes),
}

impl SamplePayload {
    pub fn kind(&self) -> StreamKind {
        match self {
            SamplePayload::Video(_) => StreamKind::Video,
            SamplePayload::Audio(_) => StreamKind::Audio,
            SamplePayload::Gaze(_) => StreamKind::Gaze,
            SamplePayload::Telemetry(_) => StreamKind::Telemetry,
            SamplePayload::Event(_) => StreamKind::Event,
            SamplePayload::Raw(_) => StreamKind::Other,
        }
    }
}

/// Video frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,

    /// Inter-frame motion estimate (0-1)
    #[serde(default)]
    pub motion: f64,

    /// Mean luminance (0-1)
    #[serde(default)]
    pub brightness: f64,

    #[serde(default)]
    pub data: Bytes,
}

/// Audio chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioChunk {
    pub sample_rate: u32,

    /// RMS energy of the chunk (0-1)
    pub energy: f64,

    /// Dominant frequency (Hz)
    #[serde(default)]
    pub dominant_frequency: f64,

    /// Chunk duration (ms)
    pub duration_ms: f64,

    #[serde(default)]
    pub data: Bytes,
}

/// Gaze point (normalized screen coordinates)
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GazePoint {
    pub x: f64,
    pub y: f64,

    /// Angular velocity (deg/s)
    #[serde(default)]
    pub velocity: f64,

    /// Whether the tracker reports a fixation
    #[serde(default)]
    pub fixation: bool,
}

/// Telemetry reading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryReading {
    pub channel: String,
    pub value: f64,
}

/// Event marker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMarker {
    pub event_type: String,
    pub magnitude: f64,
    #[serde(default)]
    pub duration_ms: f64,
    #[serde(default)]
    pub frequency: f64,
}
