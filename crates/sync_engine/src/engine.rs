//! Synchronization engine: strategy routing, lazy aligner registry and
//! quality monitoring.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;

use contracts::{
    AlignmentResult, QualityAlert, QualityTrend, SampleOutcome, StreamId, StreamSample,
    SyncEngineConfig, SyncError, SyncMetrics, SyncStrategy,
};
use serde::Serialize;
use tracing::{debug, instrument, trace};

use crate::aligner::{Aligner, StrategyStats};
use crate::buffer::BufferAligner;
use crate::clock::{SharedClock, SystemClock};
use crate::event::EventAligner;
use crate::hardware::HardwareAligner;
use crate::quality::QualityCalculator;
use crate::software::SoftwareAligner;
use crate::time_source::{LoopbackTimeProvider, SharedTimeProvider};

/// Per-call options for `synchronize`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Strategy for this batch only; the active strategy when `None`
    pub strategy: Option<SyncStrategy>,
}

impl SyncOptions {
    pub fn with_strategy(strategy: SyncStrategy) -> Self {
        Self {
            strategy: Some(strategy),
        }
    }
}

/// A sample paired with its aligned timestamp
#[derive(Debug, Clone, Serialize)]
pub struct AlignedSample {
    pub sample: StreamSample,
    pub aligned_timestamp: i64,
    pub confidence: f64,
}

/// Result of one `synchronize` call
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutput {
    /// Accepted samples grouped by stream, in input order
    pub aligned_streams: BTreeMap<StreamId, Vec<AlignedSample>>,
    /// One outcome per input sample, in input order
    pub sync_results: Vec<SampleOutcome>,
    pub overall_quality: SyncMetrics,
    pub strategy: SyncStrategy,
    /// Engine clock time when the batch completed (ms)
    pub timestamp: i64,
    /// Alerts raised by this batch
    pub alerts: Vec<QualityAlert>,
}

impl SyncOutput {
    pub fn rejected_count(&self) -> usize {
        self.sync_results.iter().filter(|o| o.is_rejected()).count()
    }
}

/// Quality view across every instantiated aligner
#[derive(Debug, Clone, Serialize)]
pub struct EngineQuality {
    pub active_strategy: SyncStrategy,
    pub per_strategy: BTreeMap<SyncStrategy, SyncMetrics>,
    /// Latest calculator snapshot
    pub overall: SyncMetrics,
    pub trend: QualityTrend,
    pub alert_count: u64,
}

/// Engine counters
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub active_strategy: SyncStrategy,
    pub batches: u64,
    pub samples: u64,
    pub rejected_samples: u64,
    pub per_strategy: BTreeMap<SyncStrategy, StrategyStats>,
}

/// Multi-strategy stream synchronization engine
///
/// Owns one aligner per strategy (built on first use) and the quality
/// calculator. Aligners keep their state across strategy switches until
/// `cleanup`.
pub struct SynchronizationEngine {
    config: SyncEngineConfig,
    clock: SharedClock,
    time_provider: SharedTimeProvider,
    active_strategy: SyncStrategy,
    aligners: BTreeMap<SyncStrategy, Box<dyn Aligner>>,
    calculator: QualityCalculator,
    batches: u64,
    samples: u64,
    rejected_samples: u64,
}

impl std::fmt::Debug for SynchronizationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynchronizationEngine")
            .field("active_strategy", &self.active_strategy)
            .field("aligners", &self.aligners.keys().collect::<Vec<_>>())
            .field("batches", &self.batches)
            .finish()
    }
}

impl SynchronizationEngine {
    /// Engine on the system clock with a loopback time source.
    pub fn new(config: SyncEngineConfig) -> Self {
        let clock: SharedClock = Arc::new(SystemClock);
        let time_provider: SharedTimeProvider =
            Arc::new(LoopbackTimeProvider::new(Arc::clone(&clock)));
        let calculator = QualityCalculator::new(config.quality.clone(), Arc::clone(&clock));

        Self {
            active_strategy: config.default_strategy,
            config,
            clock,
            time_provider,
            aligners: BTreeMap::new(),
            calculator,
            batches: 0,
            samples: 0,
            rejected_samples: 0,
        }
    }

    /// Replace the clock used by the engine and every aligner built afterwards.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.calculator = QualityCalculator::new(self.config.quality.clone(), Arc::clone(&clock));
        self.clock = clock;
        self
    }

    /// Replace the time source used by the software aligner.
    pub fn with_time_provider(mut self, provider: SharedTimeProvider) -> Self {
        self.time_provider = provider;
        self
    }

    pub fn config(&self) -> &SyncEngineConfig {
        &self.config
    }

    pub fn active_strategy(&self) -> SyncStrategy {
        self.active_strategy
    }

    /// Align a batch of samples.
    ///
    /// Malformed samples are reported as `SampleOutcome::Rejected`; the rest of
    /// the batch is still aligned.
    #[instrument(
        name = "sync_engine_synchronize",
        skip(self, samples, options),
        fields(batch = samples.len())
    )]
    pub fn synchronize(&mut self, samples: &[StreamSample], options: SyncOptions) -> SyncOutput {
        let strategy = options.strategy.unwrap_or(self.active_strategy);
        let aligner = self.aligner_mut(strategy);

        let mut aligned_streams: BTreeMap<StreamId, Vec<AlignedSample>> = BTreeMap::new();
        let mut sync_results = Vec::with_capacity(samples.len());
        let mut results: Vec<AlignmentResult> = Vec::with_capacity(samples.len());

        for sample in samples {
            if let Err(error) = sample.validate() {
                trace!(stream_id = %sample.stream_id, %error, "sample rejected");
                sync_results.push(SampleOutcome::Rejected {
                    stream_id: sample.stream_id.clone(),
                    reason: error.to_string(),
                });
                continue;
            }

            let result = aligner.align(sample);
            aligned_streams
                .entry(sample.stream_id.clone())
                .or_default()
                .push(AlignedSample {
                    sample: sample.clone(),
                    aligned_timestamp: result.aligned_timestamp,
                    confidence: result.confidence,
                });
            results.push(result.clone());
            sync_results.push(SampleOutcome::Aligned(result));
        }

        let timestamp = self.clock.now_ms();
        let (overall_quality, alerts) = if self.config.enable_quality_monitoring {
            let update = self.calculator.update_quality(&results);
            for alert in &update.alerts {
                observability::record_alert(alert);
            }
            (update.metrics, update.alerts)
        } else {
            (QualityCalculator::summarize(&results, timestamp), Vec::new())
        };

        let rejected = samples.len() - results.len();
        self.batches += 1;
        self.samples += samples.len() as u64;
        self.rejected_samples += rejected as u64;
        observability::record_batch_metrics(strategy, &overall_quality, results.len(), rejected);

        debug!(
            strategy = %strategy,
            accepted = results.len(),
            rejected,
            overall = overall_quality.compute_overall_quality(),
            "batch synchronized"
        );

        SyncOutput {
            aligned_streams,
            sync_results,
            overall_quality,
            strategy,
            timestamp,
            alerts,
        }
    }

    /// `synchronize` with a strategy given by name.
    ///
    /// # Errors
    /// `SyncError::UnknownStrategy` when the name does not parse.
    pub fn synchronize_with(
        &mut self,
        strategy: &str,
        samples: &[StreamSample],
    ) -> Result<SyncOutput, SyncError> {
        let strategy: SyncStrategy = strategy.parse()?;
        Ok(self.synchronize(samples, SyncOptions::with_strategy(strategy)))
    }

    /// Route later batches to `strategy`. Existing aligner state is kept.
    pub fn switch_strategy(&mut self, strategy: SyncStrategy) {
        if strategy != self.active_strategy {
            debug!(from = %self.active_strategy, to = %strategy, "switching sync strategy");
        }
        self.active_strategy = strategy;
    }

    /// # Errors
    /// `SyncError::UnknownStrategy` when the name does not parse; the active
    /// strategy is left unchanged.
    pub fn switch_strategy_by_name(&mut self, name: &str) -> Result<SyncStrategy, SyncError> {
        let strategy: SyncStrategy = name.parse()?;
        self.switch_strategy(strategy);
        Ok(strategy)
    }

    /// Strategies whose aligner has been built
    pub fn instantiated_strategies(&self) -> Vec<SyncStrategy> {
        self.aligners.keys().copied().collect()
    }

    pub fn quality_calculator(&self) -> &QualityCalculator {
        &self.calculator
    }

    pub fn quality_metrics(&self) -> EngineQuality {
        EngineQuality {
            active_strategy: self.active_strategy,
            per_strategy: self
                .aligners
                .iter()
                .map(|(strategy, aligner)| (*strategy, aligner.quality()))
                .collect(),
            overall: self.calculator.current_metrics(),
            trend: self.calculator.quality_trend(),
            alert_count: self.calculator.total_alerts(),
        }
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            active_strategy: self.active_strategy,
            batches: self.batches,
            samples: self.samples,
            rejected_samples: self.rejected_samples,
            per_strategy: self
                .aligners
                .iter()
                .map(|(strategy, aligner)| (*strategy, aligner.stats()))
                .collect(),
        }
    }

    /// Cancel background tasks and drop every aligner and the quality history.
    ///
    /// Idempotent. Aligners are rebuilt on the next `synchronize`.
    #[instrument(name = "sync_engine_cleanup", skip(self))]
    pub fn cleanup(&mut self) {
        for aligner in self.aligners.values_mut() {
            aligner.cleanup();
        }
        self.aligners.clear();
        self.calculator.cleanup();
        debug!("engine cleaned up");
    }

    fn aligner_mut(&mut self, strategy: SyncStrategy) -> &mut dyn Aligner {
        match self.aligners.entry(strategy) {
            Entry::Occupied(entry) => entry.into_mut().as_mut(),
            Entry::Vacant(entry) => {
                debug!(strategy = %strategy, "constructing aligner");
                let aligner = build_aligner(
                    strategy,
                    &self.config,
                    &self.clock,
                    &self.time_provider,
                );
                entry.insert(aligner).as_mut()
            }
        }
    }
}

fn build_aligner(
    strategy: SyncStrategy,
    config: &SyncEngineConfig,
    clock: &SharedClock,
    time_provider: &SharedTimeProvider,
) -> Box<dyn Aligner> {
    match strategy {
        SyncStrategy::Hardware => Box::new(HardwareAligner::new(
            config.hardware.clone(),
            Arc::clone(clock),
        )),
        SyncStrategy::Software => Box::new(SoftwareAligner::new(
            config.software.clone(),
            Arc::clone(clock),
            Arc::clone(time_provider),
        )),
        SyncStrategy::Buffer => Box::new(BufferAligner::new(
            config.buffer.clone(),
            Arc::clone(clock),
        )),
        SyncStrategy::Event => Box::new(EventAligner::new(
            config.event.clone(),
            Arc::clone(clock),
        )),
    }
}
