//! Layered error definitions
//!
//! Categorized by source: config / validation / time sync / io.
//! Buffer and history overflow are deliberately absent: they are handled by
//! bounded eviction plus a drop counter and never surface as errors.

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum SyncError {
    // ===== Configuration Errors =====
    /// Strategy name that does not map to any known aligner
    #[error("unknown sync strategy '{name}' (expected one of: hardware, software, buffer, event)")]
    UnknownStrategy { name: String },

    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Validation Errors =====
    /// Sample rejected at the ingestion boundary
    #[error("invalid sample from stream '{stream_id}': {reason}")]
    InvalidSample { stream_id: String, reason: String },

    // ===== Time Sync Errors =====
    /// Time source exchange failed
    #[error("time sync exchange failed: {message}")]
    TimeSync { message: String },

    /// Time source did not answer within the exchange timeout
    #[error("time sync exchange timed out after {timeout_ms}ms")]
    TimeSyncTimeout { timeout_ms: u64 },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    pub fn unknown_strategy(name: impl Into<String>) -> Self {
        Self::UnknownStrategy { name: name.into() }
    }

    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn invalid_sample(stream_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSample {
            stream_id: stream_id.into(),
            reason: reason.into(),
        }
    }

    pub fn time_sync(message: impl Into<String>) -> Self {
        Self::TimeSync {
            message: message.into(),
        }
    }

    /// Whether the error belongs to the time-sync family (degrades sync quality
    /// instead of failing the caller).
    pub fn is_sync_failure(&self) -> bool {
        matches!(self, Self::TimeSync { .. } | Self::TimeSyncTimeout { .. })
    }
}
