//! Stream Sync 指标收集模块
//!
//! 基于批次 SyncMetrics 快照收集和统计同步引擎的运行指标。

use std::collections::BTreeMap;

use contracts::{QualityAlert, SyncError, SyncMetrics, SyncStrategy};
use metrics::{counter, gauge, histogram};

/// 记录一个同步批次的指标
///
/// 每次 `synchronize()` 完成后调用。
///
/// # Example
///
/// ```
/// use contracts::{SyncMetrics, SyncStrategy};
/// use observability::metrics::record_batch_metrics;
///
/// record_batch_metrics(SyncStrategy::Buffer, &SyncMetrics::default(), 12, 0);
/// ```
pub fn record_batch_metrics(
    strategy: SyncStrategy,
    metrics: &SyncMetrics,
    accepted: usize,
    rejected: usize,
) {
    // 批次计数器
    counter!("stream_sync_batches_total", "strategy" => strategy.as_str()).increment(1);

    // 样本计数
    counter!("stream_sync_samples_total", "strategy" => strategy.as_str())
        .increment(accepted as u64);
    if rejected > 0 {
        counter!("stream_sync_samples_rejected_total").increment(rejected as u64);
    }

    // 综合质量
    let overall = metrics.compute_overall_quality();
    gauge!("stream_sync_overall_quality", "strategy" => strategy.as_str()).set(overall);
    histogram!("stream_sync_overall_quality_hist").record(overall);

    // 抖动与延迟
    gauge!("stream_sync_jitter_ms").set(metrics.jitter);
    histogram!("stream_sync_latency_ms").record(metrics.latency);

    // 丢弃样本
    if metrics.dropped_samples > 0 {
        counter!("stream_sync_dropped_total").increment(metrics.dropped_samples);
    }

    gauge!("stream_sync_alignment_accuracy").set(metrics.alignment_accuracy);
}

/// 记录质量告警
pub fn record_alert(alert: &QualityAlert) {
    counter!(
        "stream_sync_alerts_total",
        "kind" => alert.kind.as_str(),
        "severity" => alert.severity.as_str()
    )
    .increment(1);
}

/// 记录一次时钟同步失败（交换失败 / 超时 / 偏差过大）
pub fn record_sync_failure(error: &SyncError) {
    let reason = match error {
        SyncError::TimeSyncTimeout { .. } => "timeout",
        _ => "exchange",
    };
    counter!("stream_sync_ntp_failures_total", "reason" => reason).increment(1);
}

/// 同步指标聚合器
///
/// 在内存中聚合批次快照，便于统计和输出摘要。
#[derive(Debug, Clone, Default)]
pub struct SyncMetricsAggregator {
    /// 总批次数
    pub total_batches: u64,

    /// 已对齐样本总数
    pub total_samples: u64,

    /// 被拒绝样本总数
    pub total_rejected: u64,

    /// 丢弃样本总数
    pub total_dropped: u64,

    /// 综合质量统计
    pub quality_stats: RunningStats,

    /// 延迟统计 (毫秒)
    pub latency_stats: RunningStats,

    /// 抖动统计 (毫秒)
    pub jitter_stats: RunningStats,

    /// 各策略批次数
    pub strategy_batches: BTreeMap<SyncStrategy, u64>,

    /// 各等级批次数
    pub grade_counts: BTreeMap<String, u64>,

    /// 各严重级别告警数
    pub alert_counts: BTreeMap<String, u64>,
}

impl SyncMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(
        &mut self,
        strategy: SyncStrategy,
        metrics: &SyncMetrics,
        accepted: usize,
        rejected: usize,
    ) {
        self.total_batches += 1;
        self.total_samples += accepted as u64;
        self.total_rejected += rejected as u64;
        self.total_dropped += metrics.dropped_samples;

        *self.strategy_batches.entry(strategy).or_insert(0) += 1;
        *self
            .grade_counts
            .entry(metrics.quality_grade().to_string())
            .or_insert(0) += 1;

        // 空批次不计入质量统计
        if accepted > 0 {
            self.quality_stats.push(metrics.compute_overall_quality());
            self.latency_stats.push(metrics.latency);
            self.jitter_stats.push(metrics.jitter);
        }
    }

    /// 记录告警
    pub fn record_alert(&mut self, alert: &QualityAlert) {
        *self
            .alert_counts
            .entry(alert.severity.as_str().to_string())
            .or_insert(0) += 1;
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        let offered = self.total_samples + self.total_rejected;
        MetricsSummary {
            total_batches: self.total_batches,
            total_samples: self.total_samples,
            total_rejected: self.total_rejected,
            total_dropped: self.total_dropped,
            reject_rate: if offered > 0 {
                self.total_rejected as f64 / offered as f64 * 100.0
            } else {
                0.0
            },
            drop_rate: if self.total_samples > 0 {
                self.total_dropped as f64 / self.total_samples as f64 * 100.0
            } else {
                0.0
            },
            overall_quality: StatsSummary::from(&self.quality_stats),
            latency_ms: StatsSummary::from(&self.latency_stats),
            jitter_ms: StatsSummary::from(&self.jitter_stats),
            strategy_batches: self.strategy_batches.clone(),
            grade_counts: self.grade_counts.clone(),
            alert_counts: self.alert_counts.clone(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_batches: u64,
    pub total_samples: u64,
    pub total_rejected: u64,
    pub total_dropped: u64,
    pub reject_rate: f64,
    pub drop_rate: f64,
    pub overall_quality: StatsSummary,
    pub latency_ms: StatsSummary,
    pub jitter_ms: StatsSummary,
    pub strategy_batches: BTreeMap<SyncStrategy, u64>,
    pub grade_counts: BTreeMap<String, u64>,
    pub alert_counts: BTreeMap<String, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Stream Sync Summary ===")?;
        writeln!(f, "Batches: {}", self.total_batches)?;
        writeln!(f, "Aligned samples: {}", self.total_samples)?;
        writeln!(
            f,
            "Rejected samples: {} ({:.2}%)",
            self.total_rejected, self.reject_rate
        )?;
        writeln!(
            f,
            "Dropped samples: {} ({:.2}%)",
            self.total_dropped, self.drop_rate
        )?;
        writeln!(f, "Overall quality: {}", self.overall_quality)?;
        writeln!(f, "Latency (ms): {}", self.latency_ms)?;
        writeln!(f, "Jitter (ms): {}", self.jitter_ms)?;

        if !self.strategy_batches.is_empty() {
            writeln!(f, "Batches per strategy:")?;
            for (strategy, count) in &self.strategy_batches {
                writeln!(f, "  {}: {}", strategy, count)?;
            }
        }
        if !self.grade_counts.is_empty() {
            writeln!(f, "Grades:")?;
            for (grade, count) in &self.grade_counts {
                writeln!(f, "  {}: {}", grade, count)?;
            }
        }
        if !self.alert_counts.is_empty() {
            writeln!(f, "Alerts:")?;
            for (severity, count) in &self.alert_counts {
                writeln!(f, "  {}: {}", severity, count)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
