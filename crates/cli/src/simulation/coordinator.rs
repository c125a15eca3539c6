//! Simulation coordinator - drives the engine from synthetic sources.
//!
//! 按预设节奏 (cadence) 在 tokio interval 上收集各流到期样本并调用
//! `synchronize()`，可在指定时刻切换策略。

use std::sync::Arc;
use std::time::{Duration, Instant};

use contracts::{SyncEngineConfig, SyncStrategy};
use observability::SyncMetricsAggregator;
use rand::rngs::StdRng;
use rand::SeedableRng;
use sync_engine::{Clock, SyncOptions, SynchronizationEngine, SystemClock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::{SimulatedTimeServer, SimulationStats, StreamProfile, SyntheticStream};
use crate::cli::SimStream;
use crate::error::CliError;

const HISTOGRAM_BUCKETS: usize = 10;

/// Strategy switch scheduled during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategySwitch {
    pub at: Duration,
    pub to: SyncStrategy,
}

/// Simulation configuration
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub engine: SyncEngineConfig,

    /// Interval between `synchronize()` calls
    pub cadence: Duration,

    /// Run length
    pub duration: Duration,

    /// Strategy to start with (the configured default when None)
    pub initial_strategy: Option<SyncStrategy>,

    pub streams: Vec<SimStream>,

    pub switch: Option<StrategySwitch>,

    pub seed: u64,

    /// Offset of the simulated time server (ms)
    pub server_offset_ms: i64,
}

/// Synthetic multi-stream coordinator
pub struct Simulation {
    config: SimulationConfig,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }

    /// Run the simulation to completion
    pub async fn run(self) -> Result<SimulationStats, CliError> {
        let config = self.config;
        if config.streams.is_empty() {
            return Err(CliError::simulation("no streams selected"));
        }
        if config.cadence.is_zero() {
            return Err(CliError::simulation("cadence must be positive"));
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut sources: Vec<SyntheticStream> = config
            .streams
            .iter()
            .map(|kind| SyntheticStream::new(StreamProfile::for_kind(*kind, &mut rng)))
            .collect();

        let mut engine = SynchronizationEngine::new(config.engine.clone()).with_time_provider(
            Arc::new(SimulatedTimeServer::new(config.server_offset_ms)),
        );
        if let Some(strategy) = config.initial_strategy {
            engine.switch_strategy(strategy);
        }

        info!(
            strategy = %engine.active_strategy(),
            streams = sources.len(),
            cadence_ms = config.cadence.as_millis() as u64,
            duration_ms = config.duration.as_millis() as u64,
            seed = config.seed,
            "Simulation starting"
        );

        let mut aggregator = SyncMetricsAggregator::new();
        let mut pending_switch = config.switch;
        let mut switched_at_ms = None;
        let mut batches = 0u64;

        let origin_ms = SystemClock.now_ms();
        let start = Instant::now();
        let mut ticker = tokio::time::interval(config.cadence);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let elapsed = start.elapsed();

            if let Some(switch) = pending_switch {
                if elapsed >= switch.at {
                    engine.switch_strategy(switch.to);
                    switched_at_ms = Some(elapsed.as_millis() as u64);
                    pending_switch = None;
                    info!(strategy = %switch.to, elapsed_ms = elapsed.as_millis() as u64, "Strategy switched");
                }
            }

            let elapsed_ms = elapsed.as_secs_f64() * 1_000.0;
            let batch: Vec<_> = sources
                .iter_mut()
                .flat_map(|source| source.poll(origin_ms, elapsed_ms, &mut rng))
                .collect();

            if !batch.is_empty() {
                let output = engine.synchronize(&batch, SyncOptions::default());
                let rejected = output.rejected_count();
                aggregator.update(
                    output.strategy,
                    &output.overall_quality,
                    batch.len() - rejected,
                    rejected,
                );
                for alert in &output.alerts {
                    aggregator.record_alert(alert);
                }
                batches += 1;

                debug!(
                    batch = batches,
                    samples = batch.len(),
                    rejected,
                    quality = output.overall_quality.compute_overall_quality(),
                    "Batch synchronized"
                );
            }

            if elapsed >= config.duration {
                break;
            }
        }

        let quality = engine.quality_metrics();
        let stats = SimulationStats {
            duration: start.elapsed(),
            duration_ms: start.elapsed().as_millis() as u64,
            batches,
            samples_generated: sources.iter().map(SyntheticStream::emitted).sum(),
            streams: sources.iter().map(|s| s.profile().clone()).collect(),
            switched_at_ms,
            report: quality.overall.quality_report(),
            histogram: engine.quality_calculator().quality_histogram(HISTOGRAM_BUCKETS),
            engine: engine.stats(),
            quality,
            sync_metrics: aggregator,
        };

        engine.cleanup();
        Ok(stats)
    }
}
