//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 配置 -> 引擎 -> 聚合 的端到端测试

#[cfg(test)]
mod contract_tests {
    use contracts::{SampleOutcome, StreamId, SyncStrategy};

    #[test]
    fn test_rejected_outcome_wire_shape() {
        let outcome = SampleOutcome::Rejected {
            stream_id: StreamId::from(""),
            reason: "stream_id must not be empty".into(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "rejected");
        assert_eq!(json["stream_id"], "");
    }

    #[test]
    fn test_long_strategy_names_in_config() {
        let config = config_loader::ConfigLoader::load_from_str(
            r#"{ "default_strategy": "event_driven" }"#,
            config_loader::ConfigFormat::Json,
        )
        .unwrap();
        assert_eq!(config.default_strategy, SyncStrategy::Event);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bytes::Bytes;
    use contracts::{
        AlertKind, EventMarker, SamplePayload, StrategyDetails, StreamSample, SyncEngineConfig,
        SyncStrategy, VideoFrame,
    };
    use observability::SyncMetricsAggregator;
    use sync_engine::{
        ManualClock, MockTimeSyncProvider, SharedClock, StrategyStats, SyncOptions,
        SynchronizationEngine,
    };

    fn video(timestamp: i64, hardware_timestamp: i64) -> StreamSample {
        StreamSample::new(
            "video",
            timestamp,
            SamplePayload::Video(VideoFrame {
                width: 64,
                height: 48,
                motion: 0.1,
                brightness: 0.5,
                data: Bytes::new(),
            }),
        )
        .with_hardware_timestamp(hardware_timestamp)
    }

    fn marker(stream_id: &str, timestamp: i64, event_type: &str) -> StreamSample {
        StreamSample::new(
            stream_id,
            timestamp,
            SamplePayload::Event(EventMarker {
                event_type: event_type.into(),
                magnitude: 1.0,
                duration_ms: 50.0,
                frequency: 0.0,
            }),
        )
    }

    fn engine_at(start_ms: i64, config: SyncEngineConfig) -> (SynchronizationEngine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start_ms));
        let shared: SharedClock = clock.clone();
        (SynchronizationEngine::new(config).with_clock(shared), clock)
    }

    /// 回归窗口填满前不做漂移修正：对齐结果即设备时间线
    #[test]
    fn test_hardware_pipeline_uses_device_timeline() {
        let (mut engine, clock) = engine_at(1_000, SyncEngineConfig::default());
        let options = SyncOptions::with_strategy(SyncStrategy::Hardware);
        let window = engine.config().hardware.drift_calculation_window as i64;

        for i in 0..window {
            let hw = 1_000 + i * 33;
            clock.set(hw);
            let output = engine.synchronize(&[video(hw + 40, hw)], options);
            let aligned = &output.aligned_streams["video"][0];
            assert_eq!(aligned.aligned_timestamp, hw);
            assert_eq!(output.strategy, SyncStrategy::Hardware);
        }

        // options 不改变活动策略
        assert_eq!(engine.active_strategy(), SyncStrategy::Buffer);
        assert_eq!(engine.instantiated_strategies(), vec![SyncStrategy::Hardware]);
    }

    #[test]
    fn test_mixed_batch_keeps_order_and_rejects_malformed() {
        let (mut engine, _clock) = engine_at(5_000, SyncEngineConfig::default());
        let batch = vec![
            marker("a", 4_900, "tap"),
            marker("", 4_910, "tap"),
            marker("b", -1, "tap"),
            marker("a", 4_950, "tap"),
        ];

        let output = engine.synchronize(&batch, SyncOptions::default());

        assert_eq!(output.sync_results.len(), 4);
        assert_eq!(output.rejected_count(), 2);
        assert!(output.sync_results[1].is_rejected());
        assert!(output.sync_results[2].is_rejected());
        assert_eq!(output.aligned_streams.len(), 1);
        assert_eq!(output.aligned_streams["a"].len(), 2);

        let stats = engine.stats();
        assert_eq!(stats.samples, 4);
        assert_eq!(stats.rejected_samples, 2);
    }

    /// 两个流的同类事件在窗口内：后到的对齐到先到的时间戳
    #[test]
    fn test_event_strategy_correlates_cross_stream_markers() {
        let mut config = SyncEngineConfig::default();
        config.default_strategy = SyncStrategy::Event;
        let (mut engine, _clock) = engine_at(0, config);
        engine.switch_strategy(SyncStrategy::Event);

        let output = engine.synchronize(
            &[marker("button_a", 1_000, "flash"), marker("button_b", 1_030, "flash")],
            SyncOptions::default(),
        );

        let b = output.sync_results[1].aligned().unwrap();
        assert_eq!(b.aligned_timestamp, 1_000);
        assert_eq!(b.offset, 30);
        match &b.details {
            StrategyDetails::Event { matched_stream, correlation_score, .. } => {
                assert_eq!(matched_stream.as_deref(), Some("button_a"));
                assert!(*correlation_score > 0.9);
            }
            other => panic!("unexpected details {other:?}"),
        }

        match &engine.stats().per_strategy[&SyncStrategy::Event] {
            StrategyStats::Event(stats) => assert_eq!(stats.correlations_found, 1),
            other => panic!("unexpected stats {other:?}"),
        }
    }

    #[test]
    fn test_low_quality_alert_reaches_aggregator() {
        let mut config = SyncEngineConfig::default();
        config.quality.alert_threshold = 0.9;
        let (mut engine, _clock) = engine_at(0, config);
        let mut aggregator = SyncMetricsAggregator::new();

        let output = engine.synchronize_with(
            "event",
            &[marker("x", 100, "blink"), marker("y", 4_000, "tone")],
        )
        .unwrap();

        assert_eq!(output.alerts.len(), 1);
        assert_eq!(output.alerts[0].kind, AlertKind::LowQuality);

        aggregator.update(output.strategy, &output.overall_quality, 2, output.rejected_count());
        for alert in &output.alerts {
            aggregator.record_alert(alert);
        }
        let summary = aggregator.summary();
        assert_eq!(summary.total_batches, 1);
        assert_eq!(summary.alert_counts.get("warning"), Some(&1));
        assert_eq!(engine.quality_metrics().alert_count, 1);
    }

    #[test]
    fn test_switch_keeps_state_until_cleanup() {
        let (mut engine, clock) = engine_at(10_000, SyncEngineConfig::default());

        for i in 0..5 {
            clock.advance(10);
            engine.synchronize(&[marker("a", 10_000 + i * 10, "tap")], SyncOptions::default());
        }
        engine.switch_strategy(SyncStrategy::Event);
        engine.synchronize(&[marker("a", 10_100, "tap")], SyncOptions::default());
        engine.switch_strategy(SyncStrategy::Buffer);

        let buffer_alignments = match &engine.stats().per_strategy[&SyncStrategy::Buffer] {
            StrategyStats::Buffer(stats) => stats.total_alignments,
            other => panic!("unexpected stats {other:?}"),
        };
        assert_eq!(buffer_alignments, 5);
        assert_eq!(
            engine.instantiated_strategies(),
            vec![SyncStrategy::Buffer, SyncStrategy::Event]
        );

        engine.cleanup();
        engine.cleanup();
        assert!(engine.instantiated_strategies().is_empty());
        assert_eq!(engine.quality_calculator().history_len(), 0);

        // 清理后可继续使用
        let output = engine.synchronize(&[marker("a", 10_200, "tap")], SyncOptions::default());
        assert_eq!(output.rejected_count(), 0);
    }

    /// 软件策略：首次交换立即触发，偏移直接采用服务器测量值
    #[tokio::test]
    async fn test_software_strategy_applies_server_offset() {
        let clock = Arc::new(ManualClock::new(50_000));
        let shared: SharedClock = clock.clone();
        let provider = Arc::new(MockTimeSyncProvider::with_offset(120));
        let mut engine = SynchronizationEngine::new(SyncEngineConfig::default())
            .with_clock(shared)
            .with_time_provider(provider.clone());
        let options = SyncOptions::with_strategy(SyncStrategy::Software);

        engine.synchronize(&[marker("s", 49_990, "tap")], options);

        let mut aligned = None;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let output = engine.synchronize(&[marker("s", 49_995, "tap")], options);
            let result = output.sync_results[0].aligned().cloned();
            if result.as_ref().is_some_and(|r| r.offset == 120) {
                aligned = result;
                break;
            }
        }

        let result = aligned.expect("software offset never applied");
        assert_eq!(result.aligned_timestamp, 50_115);
        assert!(provider.calls() >= 1);

        engine.cleanup();
    }

    #[test]
    fn test_config_text_to_engine() {
        let config = config_loader::ConfigLoader::load_from_str(
            r#"
default_strategy = "hardware"
enable_quality_monitoring = false

[hardware]
drift_calculation_window = 5
"#,
            config_loader::ConfigFormat::Toml,
        )
        .unwrap();

        let (mut engine, _clock) = engine_at(0, config);
        assert_eq!(engine.active_strategy(), SyncStrategy::Hardware);

        let output = engine.synchronize(&[video(1_010, 1_000)], SyncOptions::default());
        assert_eq!(output.sync_results.len(), 1);
        assert!(output.alerts.is_empty());
        assert_eq!(engine.quality_calculator().history_len(), 0);
    }
}
