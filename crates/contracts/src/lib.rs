//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the workspace.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Time Model
//! - All timestamps are integer milliseconds (`i64`) in the producer's clock domain
//! - `hardware_timestamp` is optional and, when present, is preferred by the
//!   hardware aligner

mod alignment;
mod config;
mod error;
mod metrics;
mod quality;
mod sample;
mod stream_id;

pub use alignment::*;
pub use config::*;
pub use error::*;
pub use metrics::*;
pub use quality::*;
pub use sample::*;
pub use stream_id::StreamId;
