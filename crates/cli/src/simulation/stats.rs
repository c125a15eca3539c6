//! Simulation statistics and report output.

use std::time::Duration;

use contracts::{HistogramBucket, QualityReport, TrendDirection};
use observability::SyncMetricsAggregator;
use serde::Serialize;
use sync_engine::{EngineQuality, EngineStats};

use super::StreamProfile;

/// Statistics from a simulation run
#[derive(Debug, Clone, Serialize)]
pub struct SimulationStats {
    /// Wall-clock duration of the run
    #[serde(skip)]
    pub duration: Duration,

    pub duration_ms: u64,

    /// `synchronize()` calls made
    pub batches: u64,

    /// Samples produced by the synthetic sources
    pub samples_generated: u64,

    pub streams: Vec<StreamProfile>,

    /// Elapsed time at which the strategy switch happened
    #[serde(skip_serializing_if = "Option::is_none")]
    pub switched_at_ms: Option<u64>,

    /// Quality across every strategy that ran
    pub quality: EngineQuality,

    pub engine: EngineStats,

    /// Final report for the latest quality snapshot
    pub report: QualityReport,

    pub histogram: Vec<HistogramBucket>,

    /// Per-batch aggregation
    #[serde(skip)]
    pub sync_metrics: SyncMetricsAggregator,
}

impl SimulationStats {
    /// Generated samples per second of wall-clock time
    pub fn throughput(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.samples_generated as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                   Simulation Statistics                      ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Batches: {}", self.batches);
        println!("   ├─ Samples generated: {}", self.samples_generated);
        println!("   ├─ Throughput: {:.1} samples/s", self.throughput());
        match self.switched_at_ms {
            Some(at) => println!("   ├─ Strategy switch at: {} ms", at),
            None => println!("   ├─ Strategy switch: none"),
        }
        println!("   └─ Final strategy: {}", self.quality.active_strategy);

        println!("\n📡 Streams ({})", self.streams.len());
        for (i, stream) in self.streams.iter().enumerate() {
            let prefix = if i + 1 == self.streams.len() { "└─" } else { "├─" };
            println!(
                "   {} {:<10} {:>6.1} Hz  skew {:>+6.1} ms  drift {:>+7.1} ppm  jitter {:.2} ms{}",
                prefix,
                stream.id,
                1_000.0 / stream.period_ms,
                stream.skew_ms,
                stream.drift_ppm,
                stream.jitter_ms,
                if stream.hardware_clock { "  [hw]" } else { "" }
            );
        }

        println!("\n🎯 Quality");
        println!(
            "   ├─ Overall: {:.3} (grade {})",
            self.report.overall, self.report.grade
        );
        println!(
            "   ├─ Trend: {} (slope {:+.4}, confidence {:.2})",
            trend_label(self.quality.trend.direction),
            self.quality.trend.slope,
            self.quality.trend.confidence
        );
        println!("   └─ Alerts: {}", self.quality.alert_count);

        if !self.quality.per_strategy.is_empty() {
            println!("\n🔀 Per Strategy");
            let count = self.quality.per_strategy.len();
            for (i, (strategy, metrics)) in self.quality.per_strategy.iter().enumerate() {
                let prefix = if i + 1 == count { "└─" } else { "├─" };
                println!(
                    "   {} {:<9} quality {:.3}  overall {:.3} ({})  latency {:.1} ms  jitter {:.1} ms  alignments {}",
                    prefix,
                    strategy,
                    metrics.quality,
                    metrics.compute_overall_quality(),
                    metrics.quality_grade(),
                    metrics.latency,
                    metrics.jitter,
                    metrics.total_alignments
                );
            }
        }

        if self.histogram.iter().any(|b| b.count > 0) {
            println!("\n📉 Quality Histogram");
            let max = self.histogram.iter().map(|b| b.count).max().unwrap_or(0).max(1);
            for bucket in &self.histogram {
                let bar = "█".repeat(bucket.count * 30 / max);
                println!(
                    "   [{:.2}, {:.2}) {:>4} {}",
                    bucket.lower, bucket.upper, bucket.count, bar
                );
            }
        }

        if !self.report.recommendations.is_empty() {
            println!("\n💡 Recommendations");
            for rec in &self.report.recommendations {
                println!("   - {}", rec);
            }
        }

        println!("\n{}", self.sync_metrics.summary());
    }
}

fn trend_label(direction: TrendDirection) -> &'static str {
    match direction {
        TrendDirection::InsufficientData => "insufficient data",
        TrendDirection::Stable => "stable",
        TrendDirection::Improving => "improving",
        TrendDirection::Degrading => "degrading",
    }
}
