//! Software timestamp aligner (NTP-style).
//!
//! A single clock-offset estimate is shared by every stream. A periodic task
//! refreshes it through a four-timestamp exchange with the injected
//! `TimeSyncProvider`; `align` only reads the latest estimate.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use contracts::{
    AlignmentResult, SoftwareConfig, StrategyDetails, StreamSample, SyncError, SyncMetrics,
    SyncStrategy,
};
use tracing::{debug, instrument, trace, warn};

use crate::aligner::{Aligner, SoftwareStats, StrategyStats};
use crate::clock::SharedClock;
use crate::math::least_squares;
use crate::task::{FirstTick, ScheduledTask};
use crate::time_source::SharedTimeProvider;

const MAX_SYNC_HISTORY: usize = 50;
const SYNC_HISTORY_PRUNE: usize = 10;
const DRIFT_SAMPLES: usize = 5;
const FAILURE_PENALTY: f64 = 0.9;
const MIN_CONFIDENCE: f64 = 0.5;

/// One successful exchange
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncRecord {
    /// Local time the exchange completed (t4)
    pub at: i64,
    /// Smoothed offset after this exchange
    pub offset: f64,
    /// Round-trip delay
    pub delay: f64,
}

#[derive(Debug)]
struct ClockSyncState {
    offset: f64,
    drift: f64,
    last_sync: i64,
    sync_quality: f64,
    history: VecDeque<SyncRecord>,
    successful_syncs: u64,
    failed_syncs: u64,
}

impl ClockSyncState {
    fn new(now: i64) -> Self {
        Self {
            offset: 0.0,
            drift: 0.0,
            last_sync: now,
            sync_quality: 1.0,
            history: VecDeque::with_capacity(MAX_SYNC_HISTORY),
            successful_syncs: 0,
            failed_syncs: 0,
        }
    }

    /// Offset slope in ms per second of sync time over the most recent records.
    fn estimate_drift(&self) -> f64 {
        let skip = self.history.len().saturating_sub(DRIFT_SAMPLES);
        least_squares(
            self.history
                .iter()
                .skip(skip)
                .map(|record| (record.at as f64 / 1000.0, record.offset)),
        )
        .map(|fit| fit.slope)
        .unwrap_or(0.0)
    }
}

/// State shared between `align` and the resync task
#[derive(Debug)]
struct SyncShared {
    config: SoftwareConfig,
    clock: SharedClock,
    provider: SharedTimeProvider,
    state: Mutex<ClockSyncState>,
}

impl SyncShared {
    fn lock(&self) -> MutexGuard<'_, ClockSyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn sync_once(&self) -> Result<f64, SyncError> {
        let t1 = self.clock.now_ms();
        let timeout_ms = self.config.exchange_timeout_ms;
        let provider = Arc::clone(&self.provider);

        let exchange = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            tokio::task::spawn_blocking(move || provider.exchange(t1)),
        )
        .await;

        let exchange = match exchange {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(SyncError::time_sync(format!(
                "exchange task failed: {join_error}"
            ))),
            Err(_) => Err(SyncError::TimeSyncTimeout { timeout_ms }),
        };

        match exchange {
            Ok(exchange) => {
                let t4 = self.clock.now_ms();
                self.record_exchange(t1, exchange.t2, exchange.t3, t4)
            }
            Err(error) => {
                self.record_failure(&error);
                Err(error)
            }
        }
    }

    fn record_exchange(&self, t1: i64, t2: i64, t3: i64, t4: i64) -> Result<f64, SyncError> {
        let Some((measured, delay)) = exchange_offset_delay(t1, t2, t3, t4) else {
            let error = SyncError::time_sync(format!(
                "exchange timestamps out of range (t1={t1}, t2={t2}, t3={t3}, t4={t4})"
            ));
            self.record_failure(&error);
            return Err(error);
        };

        if measured.abs() > self.config.max_clock_skew_ms as f64 {
            let error = SyncError::time_sync(format!(
                "measured offset {measured}ms exceeds max clock skew {}ms",
                self.config.max_clock_skew_ms
            ));
            self.record_failure(&error);
            return Err(error);
        }

        let mut state = self.lock();
        let smoothed = if state.history.is_empty() {
            measured
        } else {
            let alpha = self.config.smoothing_factor;
            alpha * state.offset + (1.0 - alpha) * measured
        };

        state.history.push_back(SyncRecord {
            at: t4,
            offset: smoothed,
            delay,
        });
        if state.history.len() > MAX_SYNC_HISTORY {
            state.history.drain(..SYNC_HISTORY_PRUNE);
        }

        state.offset = smoothed;
        state.drift = state.estimate_drift();
        state.last_sync = t4;
        state.sync_quality = 1.0;
        state.successful_syncs += 1;

        debug!(
            measured_offset = measured,
            offset = smoothed,
            drift = state.drift,
            delay,
            "clock sync completed"
        );
        Ok(smoothed)
    }

    fn record_failure(&self, error: &SyncError) {
        let mut state = self.lock();
        state.sync_quality *= FAILURE_PENALTY;
        state.failed_syncs += 1;
        warn!(
            error = %error,
            sync_quality = state.sync_quality,
            failed_syncs = state.failed_syncs,
            "clock sync failed, keeping previous offset"
        );
        observability::record_sync_failure(error);
    }
}

/// `((t2 - t1) + (t3 - t4)) / 2` and `(t4 - t1) - (t3 - t2)`, or `None` on overflow.
fn exchange_offset_delay(t1: i64, t2: i64, t3: i64, t4: i64) -> Option<(f64, f64)> {
    let offset_sum = t2.checked_sub(t1)?.checked_add(t3.checked_sub(t4)?)?;
    let delay = t4.checked_sub(t1)?.checked_sub(t3.checked_sub(t2)?)?;
    Some((offset_sum as f64 / 2.0, delay as f64))
}

#[derive(Debug)]
pub struct SoftwareAligner {
    shared: Arc<SyncShared>,
    resync: Option<ScheduledTask>,
    total_alignments: u64,
    confidence_sum: f64,
}

impl SoftwareAligner {
    /// Create the aligner and start periodic resync on the current runtime.
    ///
    /// The first exchange fires immediately. Outside a tokio runtime the offset
    /// stays at zero until `sync_now` or `record_exchange` is called.
    pub fn new(config: SoftwareConfig, clock: SharedClock, provider: SharedTimeProvider) -> Self {
        let now = clock.now_ms();
        let interval = Duration::from_millis(config.ntp_sync_interval_ms);
        let shared = Arc::new(SyncShared {
            config,
            clock,
            provider,
            state: Mutex::new(ClockSyncState::new(now)),
        });

        let task_shared = Arc::clone(&shared);
        let resync = ScheduledTask::spawn_periodic(
            "ntp_resync",
            interval,
            FirstTick::Immediate,
            move || {
                let shared = Arc::clone(&task_shared);
                async move {
                    // Failures are logged and penalized inside sync_once.
                    let _ = shared.sync_once().await;
                }
            },
        );

        Self {
            shared,
            resync,
            total_alignments: 0,
            confidence_sum: 0.0,
        }
    }

    /// Run one exchange now.
    ///
    /// # Errors
    /// The exchange error, after it has been applied as a failed sync.
    #[instrument(name = "software_sync_now", skip(self))]
    pub async fn sync_now(&self) -> Result<f64, SyncError> {
        self.shared.sync_once().await
    }

    /// Apply a completed four-timestamp exchange.
    ///
    /// # Errors
    /// `SyncError::TimeSync` when the measured offset exceeds the skew limit.
    pub fn record_exchange(&self, t1: i64, t2: i64, t3: i64, t4: i64) -> Result<f64, SyncError> {
        self.shared.record_exchange(t1, t2, t3, t4)
    }

    pub fn offset(&self) -> f64 {
        self.shared.lock().offset
    }

    pub fn drift(&self) -> f64 {
        self.shared.lock().drift
    }

    pub fn sync_history(&self) -> Vec<SyncRecord> {
        self.shared.lock().history.iter().copied().collect()
    }
}

impl Aligner for SoftwareAligner {
    fn strategy(&self) -> SyncStrategy {
        SyncStrategy::Software
    }

    fn align(&mut self, sample: &StreamSample) -> AlignmentResult {
        let config = &self.shared.config;
        let now = self.shared.clock.now_ms();
        let (offset, drift, last_sync, sync_quality) = {
            let state = self.shared.lock();
            (state.offset, state.drift, state.last_sync, state.sync_quality)
        };

        let sync_age_ms = (now - last_sync).max(0);
        let adjusted =
            sample.timestamp as f64 + offset + drift * (sync_age_ms as f64 / 1000.0);
        let interval = config.ntp_sync_interval_ms.max(1) as f64;
        let confidence = (config.confidence_threshold
            * (-(sync_age_ms as f64) / interval).exp()
            * sync_quality)
            .max(MIN_CONFIDENCE)
            .min(1.0);

        self.total_alignments += 1;
        self.confidence_sum += confidence;

        let aligned_timestamp = adjusted.round() as i64;
        trace!(
            stream_id = %sample.stream_id,
            offset,
            drift,
            sync_age_ms,
            confidence,
            "software alignment"
        );

        AlignmentResult {
            stream_id: sample.stream_id.clone(),
            original_timestamp: sample.timestamp,
            aligned_timestamp,
            confidence,
            offset: aligned_timestamp - sample.timestamp,
            drift: Some(drift),
            strategy: SyncStrategy::Software,
            latency_ms: None,
            dropped_samples: 0,
            accuracy: confidence,
            details: StrategyDetails::Software {
                clock_offset: offset,
                sync_age_ms,
                sync_quality,
            },
        }
    }

    fn quality(&self) -> SyncMetrics {
        let state = self.shared.lock();
        let alignment_accuracy = if self.total_alignments == 0 {
            1.0
        } else {
            self.confidence_sum / self.total_alignments as f64
        };

        SyncMetrics {
            quality: state.sync_quality,
            alignment_accuracy,
            total_alignments: self.total_alignments,
            last_update: self.shared.clock.now_ms(),
            last_sync: Some(state.last_sync),
            ..Default::default()
        }
    }

    fn stats(&self) -> StrategyStats {
        let state = self.shared.lock();
        StrategyStats::Software(SoftwareStats {
            total_alignments: self.total_alignments,
            successful_syncs: state.successful_syncs,
            failed_syncs: state.failed_syncs,
            offset: state.offset,
            drift: state.drift,
            sync_quality: state.sync_quality,
            last_sync: state.last_sync,
            history_len: state.history.len(),
            resync_active: self
                .resync
                .as_ref()
                .map(ScheduledTask::is_active)
                .unwrap_or(false),
        })
    }

    fn cleanup(&mut self) {
        if let Some(mut task) = self.resync.take() {
            task.cancel();
        }
        let now = self.shared.clock.now_ms();
        *self.shared.lock() = ClockSyncState::new(now);
        self.total_alignments = 0;
        self.confidence_sum = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use contracts::SamplePayload;

    use crate::clock::ManualClock;
    use crate::time_source::{MockTimeSyncProvider, TimeExchange, TimeSyncProvider};

    fn sample(timestamp: i64) -> StreamSample {
        StreamSample::new("gaze", timestamp, SamplePayload::Raw(Bytes::new()))
    }

    fn stats(aligner: &SoftwareAligner) -> SoftwareStats {
        match aligner.stats() {
            StrategyStats::Software(stats) => stats,
            other => panic!("unexpected stats {other:?}"),
        }
    }

    fn offline_aligner(
        config: SoftwareConfig,
    ) -> (SoftwareAligner, Arc<ManualClock>, Arc<MockTimeSyncProvider>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let provider = Arc::new(MockTimeSyncProvider::default());
        let aligner = SoftwareAligner::new(config, clock.clone(), provider.clone());
        (aligner, clock, provider)
    }

    #[test]
    fn test_without_sync_uses_zero_offset() {
        let (mut aligner, _clock, _provider) = offline_aligner(SoftwareConfig::default());
        let result = aligner.align(&sample(500));

        assert_eq!(result.aligned_timestamp, 500);
        assert_eq!(result.offset, 0);
        assert!((result.confidence - 0.9).abs() < 1e-9);
        assert!(!stats(&aligner).resync_active);
    }

    #[test]
    fn test_first_exchange_takes_raw_offset_then_smooths() {
        let (aligner, _clock, _provider) = offline_aligner(SoftwareConfig::default());

        let first = aligner.record_exchange(0, 110, 110, 20).unwrap();
        // ((110 - 0) + (110 - 20)) / 2
        assert!((first - 100.0).abs() < 1e-9);

        let second = aligner.record_exchange(1_000, 1_200, 1_200, 1_000).unwrap();
        // 0.8 * 100 + 0.2 * 200
        assert!((second - 120.0).abs() < 1e-9);
        assert_eq!(aligner.sync_history()[0].delay, 20.0);
    }

    #[test]
    fn test_offset_and_drift_applied_on_align() {
        let (mut aligner, clock, _provider) = offline_aligner(SoftwareConfig {
            smoothing_factor: 0.0,
            ..Default::default()
        });

        // Offset grows by 10ms per second of sync time.
        for i in 0..5 {
            let t = 1_000_000 + i * 1_000;
            let offset = 50 + i * 10;
            aligner.record_exchange(t, t + offset, t + offset, t).unwrap();
        }
        assert!((aligner.drift() - 10.0).abs() < 1e-6);
        assert!((aligner.offset() - 90.0).abs() < 1e-9);

        clock.set(1_004_000 + 2_000);
        let result = aligner.align(&sample(700));
        // 700 + 90 + 10 * 2s
        assert_eq!(result.aligned_timestamp, 810);
        assert_eq!(result.offset, 110);
    }

    #[test]
    fn test_excessive_skew_counts_as_failure() {
        let (aligner, _clock, _provider) = offline_aligner(SoftwareConfig::default());
        aligner.record_exchange(0, 50, 50, 0).unwrap();

        let err = aligner.record_exchange(0, 5_000, 5_000, 0).unwrap_err();
        assert!(err.is_sync_failure());
        assert!((aligner.offset() - 50.0).abs() < 1e-9);

        let stats = stats(&aligner);
        assert_eq!(stats.failed_syncs, 1);
        assert!((stats.sync_quality - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_decays_with_sync_age() {
        let (mut aligner, clock, _provider) = offline_aligner(SoftwareConfig::default());
        let fresh = aligner.align(&sample(0)).confidence;
        clock.advance(30_000);
        let stale = aligner.align(&sample(0)).confidence;

        assert!(stale < fresh);
        assert!(stale >= MIN_CONFIDENCE);
    }

    #[test]
    fn test_history_pruned_in_batches() {
        let (aligner, _clock, _provider) = offline_aligner(SoftwareConfig::default());
        for i in 0..(MAX_SYNC_HISTORY as i64 + 1) {
            aligner.record_exchange(i, i, i, i).unwrap();
        }
        assert_eq!(aligner.sync_history().len(), MAX_SYNC_HISTORY + 1 - SYNC_HISTORY_PRUNE);
    }

    #[tokio::test]
    async fn test_sync_now_failure_degrades_quality_and_keeps_offset() {
        let (aligner, _clock, provider) = offline_aligner(SoftwareConfig {
            ntp_sync_interval_ms: 3_600_000,
            ..Default::default()
        });
        // Let the immediate resync tick run.
        tokio::time::sleep(Duration::from_millis(20)).await;

        provider.set_offset(40);
        aligner.sync_now().await.unwrap();
        let offset = aligner.offset();

        provider.fail_next(2);
        assert!(aligner.sync_now().await.is_err());
        assert!(aligner.sync_now().await.is_err());

        assert_eq!(aligner.offset(), offset);
        let stats = stats(&aligner);
        assert!((stats.sync_quality - 0.81).abs() < 1e-9);
        assert!(stats.resync_active);

        aligner.sync_now().await.unwrap();
        assert_eq!(stats_quality(&aligner), 1.0);
    }

    fn stats_quality(aligner: &SoftwareAligner) -> f64 {
        stats(aligner).sync_quality
    }

    #[derive(Debug)]
    struct SlowProvider;

    impl TimeSyncProvider for SlowProvider {
        fn exchange(&self, t1: i64) -> Result<TimeExchange, SyncError> {
            std::thread::sleep(Duration::from_millis(200));
            Ok(TimeExchange { t2: t1, t3: t1 })
        }
    }

    #[tokio::test]
    async fn test_exchange_timeout() {
        let aligner = SoftwareAligner::new(
            SoftwareConfig {
                exchange_timeout_ms: 20,
                ntp_sync_interval_ms: 3_600_000,
                ..Default::default()
            },
            Arc::new(ManualClock::new(0)),
            Arc::new(SlowProvider),
        );

        let err = aligner.sync_now().await.unwrap_err();
        assert!(matches!(err, SyncError::TimeSyncTimeout { timeout_ms: 20 }));
    }

    #[tokio::test]
    async fn test_cleanup_stops_resync() {
        let clock = Arc::new(ManualClock::new(0));
        let provider = Arc::new(MockTimeSyncProvider::with_offset(5));
        let mut aligner = SoftwareAligner::new(
            SoftwareConfig {
                ntp_sync_interval_ms: 10,
                ..Default::default()
            },
            clock,
            provider.clone(),
        );
        tokio::time::sleep(Duration::from_millis(35)).await;
        assert!(provider.calls() >= 1);

        aligner.cleanup();
        aligner.cleanup();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let calls = provider.calls();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(provider.calls(), calls);
        assert_eq!(stats(&aligner).successful_syncs, 0);
        assert!(!stats(&aligner).resync_active);
    }

    #[derive(Debug)]
    struct GarbageProvider;

    impl TimeSyncProvider for GarbageProvider {
        fn exchange(&self, _t1: i64) -> Result<TimeExchange, SyncError> {
            Ok(TimeExchange {
                t2: i64::MAX,
                t3: i64::MAX,
            })
        }
    }

    #[test]
    fn test_overflowing_exchange_counts_as_failure() {
        let (aligner, _clock, _provider) = offline_aligner(SoftwareConfig::default());
        aligner.record_exchange(0, 40, 40, 0).unwrap();

        let err = aligner
            .record_exchange(i64::MIN, i64::MAX, i64::MAX, 0)
            .unwrap_err();
        assert!(matches!(err, SyncError::TimeSync { .. }));

        let stats = stats(&aligner);
        assert_eq!(stats.failed_syncs, 1);
        assert!((stats.sync_quality - 0.9).abs() < 1e-9);
        assert!((aligner.offset() - 40.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_garbage_time_source_keeps_resync_running() {
        let mut aligner = SoftwareAligner::new(
            SoftwareConfig {
                ntp_sync_interval_ms: 10,
                ..Default::default()
            },
            Arc::new(ManualClock::new(0)),
            Arc::new(GarbageProvider),
        );
        tokio::time::sleep(Duration::from_millis(60)).await;

        let stats = stats(&aligner);
        assert!(stats.failed_syncs >= 2);
        assert_eq!(stats.successful_syncs, 0);
        assert!(stats.sync_quality < 0.9);
        assert!(stats.resync_active);
        aligner.cleanup();
    }
}
