//! Buffer-based aligner.
//!
//! Each stream gets a bounded buffer; the aligned timestamp is the median of
//! the stream's most recent buffered timestamps, measured against the newest
//! timestamp of the reference stream (the first stream ever seen).
//!
//! Buffers use index-based separation:
//! - HeapRb stores lightweight metadata (timestamps + slab key)
//! - Slab stores the actual StreamSample
//!
//! Trimming and flushing only move metadata, never payloads.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use contracts::{
    AlignmentResult, BufferConfig, StrategyDetails, StreamId, StreamSample, SyncMetrics,
    SyncStrategy,
};
use ringbuf::{traits::*, HeapRb};
use slab::Slab;
use tracing::{debug, trace};

use crate::aligner::{Aligner, BufferStats, StrategyStats};
use crate::clock::SharedClock;
use crate::math::{mean, median, population_std_dev, variance_around};
use crate::task::{FirstTick, ScheduledTask};

const MAX_LATENCY_HISTORY: usize = 50;
const LATENCY_HISTORY_PRUNE: usize = 10;
const MEDIAN_WINDOW: usize = 5;
const MIN_CONFIDENCE: f64 = 0.3;
const VARIANCE_SCALE: f64 = 10_000.0;

/// Lightweight metadata stored in the ring buffer
#[derive(Debug, Clone, Copy)]
struct SampleMeta {
    /// Sample timestamp (ms)
    timestamp: i64,
    /// Local time the sample entered the buffer (ms)
    arrived_at: i64,
    /// Key into the slab storage
    slab_key: usize,
}

/// Bounded per-stream sample buffer in arrival order
pub struct StreamBuffer {
    index: HeapRb<SampleMeta>,
    storage: Slab<StreamSample>,
    capacity: usize,
    dropped_count: u64,
    out_of_order_count: u64,
    last_timestamp: Option<i64>,
}

impl fmt::Debug for StreamBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamBuffer")
            .field("len", &self.index.occupied_len())
            .field("capacity", &self.capacity)
            .field("dropped", &self.dropped_count)
            .finish()
    }
}

impl StreamBuffer {
    #[inline]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            index: HeapRb::new(capacity),
            storage: Slab::with_capacity(capacity),
            capacity,
            dropped_count: 0,
            out_of_order_count: 0,
            last_timestamp: None,
        }
    }

    /// Append a sample. A full buffer overwrites its oldest entry.
    #[inline]
    pub fn push(&mut self, sample: StreamSample, arrived_at: i64) {
        let timestamp = sample.timestamp;

        if let Some(last) = self.last_timestamp {
            if timestamp < last {
                self.out_of_order_count += 1;
            }
        }
        self.last_timestamp = Some(timestamp);

        if self.index.is_full() {
            self.pop_oldest();
            self.dropped_count += 1;
        }

        let slab_key = self.storage.insert(sample);
        let _ = self.index.try_push(SampleMeta {
            timestamp,
            arrived_at,
            slab_key,
        });
    }

    fn pop_oldest(&mut self) -> Option<StreamSample> {
        let meta = self.index.try_pop()?;
        Some(self.storage.remove(meta.slab_key))
    }

    /// Drop the oldest entries until at most `size` remain.
    pub fn trim_to(&mut self, size: usize) -> usize {
        let mut trimmed = 0;
        while self.index.occupied_len() > size && self.pop_oldest().is_some() {
            trimmed += 1;
        }
        self.dropped_count += trimmed as u64;
        trimmed
    }

    /// Evict samples that entered the buffer before `cutoff`.
    pub fn evict_arrived_before(&mut self, cutoff: i64) -> usize {
        let mut evicted = 0;
        let remaining: Vec<SampleMeta> = self
            .index
            .pop_iter()
            .filter(|meta| {
                if meta.arrived_at >= cutoff {
                    true
                } else {
                    self.storage.remove(meta.slab_key);
                    evicted += 1;
                    false
                }
            })
            .collect();

        for meta in remaining {
            let _ = self.index.try_push(meta);
        }

        self.dropped_count += evicted as u64;
        evicted
    }

    /// Timestamps of the `n` most recently buffered samples, oldest first.
    pub fn recent_timestamps(&self, n: usize) -> Vec<i64> {
        let skip = self.len().saturating_sub(n);
        self.index.iter().skip(skip).map(|meta| meta.timestamp).collect()
    }

    pub fn newest_timestamp(&self) -> Option<i64> {
        self.index.iter().last().map(|meta| meta.timestamp)
    }

    /// Buffered samples in arrival order
    pub fn samples(&self) -> impl Iterator<Item = &StreamSample> + '_ {
        self.index
            .iter()
            .filter_map(|meta| self.storage.get(meta.slab_key))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.index.occupied_len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[inline]
    pub fn dropped_count(&self) -> u64 {
        self.dropped_count
    }

    #[inline]
    pub fn out_of_order_count(&self) -> u64 {
        self.out_of_order_count
    }
}

#[derive(Debug)]
struct StreamState {
    buffer: StreamBuffer,
    latency_history: VecDeque<f64>,
    avg_latency: f64,
    optimal_size: usize,
    is_reference: bool,
    last_flush: i64,
}

impl StreamState {
    fn new(config: &BufferConfig, is_reference: bool, now: i64) -> Self {
        Self {
            buffer: StreamBuffer::new(config.buffer_size * 2 + 1),
            latency_history: VecDeque::with_capacity(MAX_LATENCY_HISTORY),
            avg_latency: 0.0,
            optimal_size: config.buffer_size,
            is_reference,
            last_flush: now,
        }
    }

    fn record_latency(&mut self, latency: f64) {
        self.latency_history.push_back(latency);
        if self.latency_history.len() > MAX_LATENCY_HISTORY {
            self.latency_history.drain(..LATENCY_HISTORY_PRUNE);
        }
        self.avg_latency =
            self.latency_history.iter().sum::<f64>() / self.latency_history.len() as f64;
    }

    fn optimal_size(&self, config: &BufferConfig) -> usize {
        if !config.adaptive_buffering {
            return config.buffer_size;
        }
        let latencies: Vec<f64> = self.latency_history.iter().copied().collect();
        let variance = variance_around(&latencies, mean(&latencies));
        let adaptive =
            (config.buffer_size as f64 * (1.0 + variance.sqrt() / 100.0)).ceil() as usize;
        adaptive.min(config.buffer_size * 2)
    }
}

#[derive(Debug, Default)]
struct BufferState {
    streams: HashMap<StreamId, StreamState>,
    reference_stream: Option<StreamId>,
    flushed_samples: u64,
}

impl BufferState {
    fn flush_expired(&mut self, now: i64, max_latency_ms: u64) -> usize {
        let cutoff = now - max_latency_ms as i64;
        let mut flushed = 0;
        for (stream_id, stream) in self.streams.iter_mut() {
            let evicted = stream.buffer.evict_arrived_before(cutoff);
            stream.last_flush = now;
            if evicted > 0 {
                debug!(stream_id = %stream_id, evicted, "flushed expired samples");
            }
            flushed += evicted;
        }
        self.flushed_samples += flushed as u64;
        flushed
    }
}

#[derive(Debug)]
struct BufferShared {
    config: BufferConfig,
    clock: SharedClock,
    state: Mutex<BufferState>,
}

impl BufferShared {
    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
pub struct BufferAligner {
    shared: Arc<BufferShared>,
    flush_task: Option<ScheduledTask>,
    total_alignments: u64,
    confidence_sum: f64,
}

impl BufferAligner {
    /// Create the aligner and start the periodic flush on the current runtime.
    pub fn new(config: BufferConfig, clock: SharedClock) -> Self {
        let period = Duration::from_millis((config.max_buffer_latency_ms / 2).max(1));
        let shared = Arc::new(BufferShared {
            config,
            clock,
            state: Mutex::new(BufferState::default()),
        });

        let task_shared = Arc::clone(&shared);
        let flush_task = ScheduledTask::spawn_periodic(
            "buffer_flush",
            period,
            FirstTick::AfterPeriod,
            move || {
                let shared = Arc::clone(&task_shared);
                async move {
                    let now = shared.clock.now_ms();
                    shared
                        .lock()
                        .flush_expired(now, shared.config.max_buffer_latency_ms);
                }
            },
        );

        Self {
            shared,
            flush_task,
            total_alignments: 0,
            confidence_sum: 0.0,
        }
    }

    /// Flush samples resident longer than `max_buffer_latency_ms`.
    pub fn flush_expired(&self) -> usize {
        let now = self.shared.clock.now_ms();
        self.shared
            .lock()
            .flush_expired(now, self.shared.config.max_buffer_latency_ms)
    }

    pub fn reference_stream(&self) -> Option<StreamId> {
        self.shared.lock().reference_stream.clone()
    }

    pub fn buffered_len(&self, stream_id: &str) -> usize {
        self.shared
            .lock()
            .streams
            .get(stream_id)
            .map(|stream| stream.buffer.len())
            .unwrap_or(0)
    }

    /// Clone of the samples buffered for one stream, in arrival order.
    pub fn buffered_samples(&self, stream_id: &str) -> Vec<StreamSample> {
        self.shared
            .lock()
            .streams
            .get(stream_id)
            .map(|stream| stream.buffer.samples().cloned().collect())
            .unwrap_or_default()
    }
}

impl Aligner for BufferAligner {
    fn strategy(&self) -> SyncStrategy {
        SyncStrategy::Buffer
    }

    fn align(&mut self, sample: &StreamSample) -> AlignmentResult {
        let config = &self.shared.config;
        let now = self.shared.clock.now_ms();
        let mut guard = self.shared.lock();
        let state = &mut *guard;

        let reference_unset = state.reference_stream.is_none();
        let stream = state
            .streams
            .entry(sample.stream_id.clone())
            .or_insert_with(|| {
                debug!(
                    stream_id = %sample.stream_id,
                    is_reference = reference_unset,
                    "buffer registered"
                );
                StreamState::new(config, reference_unset, now)
            });
        if reference_unset {
            state.reference_stream = Some(sample.stream_id.clone());
        }

        let latency = (now - sample.timestamp).max(0) as f64;
        stream.record_latency(latency);
        stream.buffer.push(sample.clone(), now);

        let optimal_size = stream.optimal_size(config);
        stream.optimal_size = optimal_size;
        let trimmed = stream.buffer.trim_to(optimal_size);

        let recent: Vec<f64> = stream
            .buffer
            .recent_timestamps(MEDIAN_WINDOW)
            .into_iter()
            .map(|t| t as f64)
            .collect();
        let center = median(&recent).unwrap_or(sample.timestamp as f64);
        let variance = variance_around(&recent, center);
        let confidence = (config.confidence_threshold - variance / VARIANCE_SCALE)
            .max(MIN_CONFIDENCE)
            .min(1.0);
        let aligned_timestamp = center.round() as i64;
        let buffer_size = stream.buffer.len();
        let is_reference = stream.is_reference;

        let offset = if is_reference {
            0
        } else {
            state
                .reference_stream
                .as_ref()
                .and_then(|reference| state.streams.get(reference))
                .and_then(|reference| reference.buffer.newest_timestamp())
                .map(|newest| aligned_timestamp - newest)
                .unwrap_or(0)
        };
        drop(guard);

        self.total_alignments += 1;
        self.confidence_sum += confidence;

        trace!(
            stream_id = %sample.stream_id,
            aligned_timestamp,
            offset,
            buffer_size,
            trimmed,
            "buffer alignment"
        );

        AlignmentResult {
            stream_id: sample.stream_id.clone(),
            original_timestamp: sample.timestamp,
            aligned_timestamp,
            confidence,
            offset,
            drift: None,
            strategy: SyncStrategy::Buffer,
            latency_ms: Some(latency),
            dropped_samples: trimmed as u64,
            accuracy: confidence,
            details: StrategyDetails::Buffer {
                buffer_size,
                optimal_size,
                is_reference,
            },
        }
    }

    fn quality(&self) -> SyncMetrics {
        let state = self.shared.lock();
        let now = self.shared.clock.now_ms();
        if state.streams.is_empty() {
            return SyncMetrics {
                last_update: now,
                ..Default::default()
            };
        }

        let latencies: Vec<f64> = state
            .streams
            .values()
            .flat_map(|stream| stream.latency_history.iter().copied())
            .collect();
        let utilization: Vec<f64> = state
            .streams
            .values()
            .map(|stream| stream.buffer.len() as f64 / stream.optimal_size.max(1) as f64)
            .collect();
        let avg_latencies: Vec<f64> = state
            .streams
            .values()
            .map(|stream| stream.avg_latency)
            .collect();
        let dropped = state
            .streams
            .values()
            .map(|stream| stream.buffer.dropped_count())
            .sum();
        let accuracy = if self.total_alignments == 0 {
            1.0
        } else {
            self.confidence_sum / self.total_alignments as f64
        };

        SyncMetrics {
            quality: accuracy,
            latency: mean(&avg_latencies),
            jitter: population_std_dev(&latencies),
            dropped_samples: dropped,
            alignment_accuracy: accuracy,
            buffer_utilization: mean(&utilization),
            total_alignments: self.total_alignments,
            last_update: now,
            ..Default::default()
        }
    }

    fn stats(&self) -> StrategyStats {
        let state = self.shared.lock();
        StrategyStats::Buffer(BufferStats {
            streams: state.streams.len(),
            reference_stream: state.reference_stream.clone(),
            total_alignments: self.total_alignments,
            buffered_samples: state.streams.values().map(|s| s.buffer.len()).sum(),
            dropped_samples: state.streams.values().map(|s| s.buffer.dropped_count()).sum(),
            flushed_samples: state.flushed_samples,
            out_of_order_samples: state
                .streams
                .values()
                .map(|s| s.buffer.out_of_order_count())
                .sum(),
            flush_active: self
                .flush_task
                .as_ref()
                .map(ScheduledTask::is_active)
                .unwrap_or(false),
        })
    }

    fn cleanup(&mut self) {
        if let Some(mut task) = self.flush_task.take() {
            task.cancel();
        }
        *self.shared.lock() = BufferState::default();
        self.total_alignments = 0;
        self.confidence_sum = 0.0;
    }
}
