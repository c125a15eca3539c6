//! Engine configuration contracts shared across crates.
//!
//! Every field has a default so partial TOML/JSON documents are valid.
//! Durations are integer milliseconds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use crate::{SyncError, SyncStrategy};

/// Synchronization engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SyncEngineConfig {
    /// Strategy used when a call does not name one
    pub default_strategy: SyncStrategy,

    /// Route every batch through the quality calculator
    pub enable_quality_monitoring: bool,

    #[validate(nested)]
    pub hardware: HardwareConfig,

    #[validate(nested)]
    pub software: SoftwareConfig,

    #[validate(nested)]
    pub buffer: BufferConfig,

    #[validate(nested)]
    pub event: EventConfig,

    #[validate(nested)]
    pub quality: QualityConfig,
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self {
            default_strategy: SyncStrategy::default(),
            enable_quality_monitoring: true,
            hardware: HardwareConfig::default(),
            software: SoftwareConfig::default(),
            buffer: BufferConfig::default(),
            event: EventConfig::default(),
            quality: QualityConfig::default(),
        }
    }
}

impl SyncEngineConfig {
    /// Configuration tuned for one of the coordinator cadence presets.
    pub fn from_preset(preset: SyncPreset) -> Self {
        let mut config = Self::default();
        match preset {
            SyncPreset::Research => {
                config.default_strategy = SyncStrategy::Hardware;
                config.buffer.buffer_size = 60;
                config.buffer.max_buffer_latency_ms = 250;
                config.event.correlation_window_ms = 500;
            }
            SyncPreset::Balanced => {}
            SyncPreset::Robust => {
                config.default_strategy = SyncStrategy::Buffer;
                config.buffer.buffer_size = 200;
                config.buffer.max_buffer_latency_ms = 2_000;
                config.event.correlation_window_ms = 2_000;
                config.quality.alert_threshold = 0.5;
            }
        }
        config
    }
}

/// Hardware timestamp aligner configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct HardwareConfig {
    #[validate(range(min = 0.0, max = 1.0))]
    pub confidence_threshold: f64,

    /// Offset history kept per stream
    #[validate(range(min = 2))]
    pub max_offset_history: usize,

    /// Regression window for drift estimation
    #[validate(range(min = 2))]
    pub drift_calculation_window: usize,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.95,
            max_offset_history: 100,
            drift_calculation_window: 10,
        }
    }
}

/// Software (NTP-style) aligner configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SoftwareConfig {
    #[validate(range(min = 0.0, max = 1.0))]
    pub confidence_threshold: f64,

    /// Resync period
    #[validate(range(min = 1))]
    pub ntp_sync_interval_ms: u64,

    /// Measured offsets beyond this are treated as failed syncs
    #[validate(range(min = 1))]
    pub max_clock_skew_ms: u64,

    /// Weight of the previous offset estimate in the exponential smoothing
    #[validate(range(min = 0.0, max = 1.0))]
    pub smoothing_factor: f64,

    /// Upper bound for one time-source exchange
    #[validate(range(min = 1))]
    pub exchange_timeout_ms: u64,
}

impl Default for SoftwareConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.9,
            ntp_sync_interval_ms: 30_000,
            max_clock_skew_ms: 1_000,
            smoothing_factor: 0.8,
            exchange_timeout_ms: 5_000,
        }
    }
}

/// Buffer-based aligner configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct BufferConfig {
    #[validate(range(min = 0.0, max = 1.0))]
    pub confidence_threshold: f64,

    /// Base per-stream buffer size
    #[validate(range(min = 5))]
    pub buffer_size: usize,

    /// Samples resident longer than this are flushed
    #[validate(range(min = 2))]
    pub max_buffer_latency_ms: u64,

    /// Grow buffers with latency variance (up to 2x `buffer_size`)
    pub adaptive_buffering: bool,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.85,
            buffer_size: 100,
            max_buffer_latency_ms: 1_000,
            adaptive_buffering: true,
        }
    }
}

/// Event-driven aligner configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct EventConfig {
    #[validate(range(min = 0.0, max = 1.0))]
    pub confidence_threshold: f64,

    /// Max time delta for two cross-stream events to be compared
    #[validate(range(min = 1))]
    pub correlation_window_ms: u64,

    #[validate(range(min = 0.0, max = 1.0))]
    pub min_correlation_score: f64,

    /// Events older than this (relative to the incoming sample) are pruned
    #[validate(range(min = 1))]
    pub max_event_age_ms: u64,

    #[validate(range(min = 0.0, max = 1.0))]
    pub pattern_match_threshold: f64,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.6,
            correlation_window_ms: 1_000,
            min_correlation_score: 0.6,
            max_event_age_ms: 5_000,
            pattern_match_threshold: 0.7,
        }
    }
}

/// Quality calculator configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct QualityConfig {
    /// Rolling snapshot history length
    #[validate(range(min = 10))]
    pub quality_window: usize,

    #[validate(range(min = 0.0, max = 1.0))]
    pub degradation_threshold: f64,

    #[validate(range(min = 0.0, max = 1.0))]
    pub alert_threshold: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            quality_window: 100,
            degradation_threshold: 0.1,
            alert_threshold: 0.6,
        }
    }
}

/// Coordinator cadence presets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPreset {
    /// 16 ms cadence, hardware timestamps
    Research,
    /// 33 ms cadence, buffer strategy
    #[default]
    Balanced,
    /// 100 ms cadence, large buffers and windows
    Robust,
}

impl SyncPreset {
    /// Interval at which the coordinator calls `synchronize()`
    pub fn cadence_ms(&self) -> u64 {
        match self {
            SyncPreset::Research => 16,
            SyncPreset::Balanced => 33,
            SyncPreset::Robust => 100,
        }
    }
}

impl fmt::Display for SyncPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPreset::Research => "research",
            SyncPreset::Balanced => "balanced",
            SyncPreset::Robust => "robust",
        };
        f.write_str(name)
    }
}

impl FromStr for SyncPreset {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "research" => Ok(SyncPreset::Research),
            "balanced" => Ok(SyncPreset::Balanced),
            "robust" => Ok(SyncPreset::Robust),
            other => Err(SyncError::config_validation(
                "preset",
                format!("unknown preset '{other}'"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(SyncEngineConfig::default().validate().is_ok());
        for preset in [SyncPreset::Research, SyncPreset::Balanced, SyncPreset::Robust] {
            assert!(SyncEngineConfig::from_preset(preset).validate().is_ok());
        }
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        let mut config = SyncEngineConfig::default();
        config.event.min_correlation_score = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SyncEngineConfig =
            serde_json::from_str(r#"{ "buffer": { "buffer_size": 42 } }"#).unwrap();
        assert_eq!(config.buffer.buffer_size, 42);
        assert_eq!(config.buffer.max_buffer_latency_ms, 1_000);
        assert_eq!(config.software.ntp_sync_interval_ms, 30_000);
        assert!(config.enable_quality_monitoring);
    }

    #[test]
    fn test_preset_cadence() {
        assert_eq!(SyncPreset::Research.cadence_ms(), 16);
        assert_eq!(SyncPreset::Robust.cadence_ms(), 100);
        assert_eq!("robust".parse::<SyncPreset>().unwrap(), SyncPreset::Robust);
        assert!("turbo".parse::<SyncPreset>().is_err());
    }
}
