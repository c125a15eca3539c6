//! # Sync Engine
//!
//! 多流时间同步引擎。
//!
//! 负责：
//! - 四种对齐策略（硬件时间戳 / NTP 软件时钟 / 缓冲 / 事件关联）
//! - 策略按需构建与运行时切换
//! - 批次质量评估、告警与趋势
//!
//! ## 使用示例
//!
//! ```
//! use bytes::Bytes;
//! use contracts::{SamplePayload, StreamSample, SyncEngineConfig, SyncStrategy};
//! use sync_engine::{SyncOptions, SynchronizationEngine};
//!
//! let mut engine = SynchronizationEngine::new(SyncEngineConfig::default());
//!
//! let batch = vec![
//!     StreamSample::new("video", 1_000, SamplePayload::Raw(Bytes::new())),
//!     StreamSample::new("audio", 1_004, SamplePayload::Raw(Bytes::new())),
//! ];
//! let output = engine.synchronize(&batch, SyncOptions::with_strategy(SyncStrategy::Hardware));
//!
//! assert_eq!(output.strategy, SyncStrategy::Hardware);
//! assert_eq!(output.aligned_streams.len(), 2);
//! println!("grade: {}", output.overall_quality.quality_grade());
//!
//! engine.cleanup();
//! ```

mod aligner;
mod buffer;
mod clock;
mod engine;
mod event;
mod features;
mod hardware;
mod math;
mod quality;
mod software;
mod task;
mod time_source;

pub use aligner::{
    Aligner, BufferStats, EventStats, HardwareStats, SoftwareStats, StrategyStats,
};
pub use buffer::{BufferAligner, StreamBuffer};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use engine::{
    AlignedSample, EngineQuality, EngineStats, SyncOptions, SyncOutput, SynchronizationEngine,
};
pub use event::EventAligner;
pub use features::EventFeatures;
pub use hardware::HardwareAligner;
pub use quality::{QualityCalculator, QualityUpdate};
pub use software::{SoftwareAligner, SyncRecord};
pub use task::{FirstTick, ScheduledTask};
pub use time_source::{
    LoopbackTimeProvider, MockTimeSyncProvider, SharedTimeProvider, TimeExchange,
    TimeSyncProvider,
};

// Re-export contracts types
pub use contracts::{
    AlignmentResult, SampleOutcome, StreamId, StreamSample, SyncEngineConfig, SyncError,
    SyncMetrics, SyncStrategy,
};
