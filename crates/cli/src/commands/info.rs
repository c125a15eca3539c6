//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::SyncEngineConfig;
use tracing::info;

use super::load_config;
use crate::cli::InfoArgs;

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    let config = load_config(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let json = config_loader::ConfigLoader::to_json(&config)
            .context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&config);
    }

    Ok(())
}

fn print_config_info(config: &SyncEngineConfig) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                 Stream Sync Configuration                    ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("⚙️  Engine");
    println!("   ├─ Default strategy: {}", config.default_strategy);
    println!(
        "   └─ Quality monitoring: {}",
        if config.enable_quality_monitoring {
            "enabled"
        } else {
            "disabled"
        }
    );

    let hw = &config.hardware;
    println!("\n🕐 Hardware");
    println!("   ├─ Confidence threshold: {}", hw.confidence_threshold);
    println!("   ├─ Offset history: {}", hw.max_offset_history);
    println!("   └─ Drift window: {}", hw.drift_calculation_window);

    let sw = &config.software;
    println!("\n🌐 Software (NTP)");
    println!("   ├─ Confidence threshold: {}", sw.confidence_threshold);
    println!("   ├─ Sync interval: {} ms", sw.ntp_sync_interval_ms);
    println!("   ├─ Max clock skew: {} ms", sw.max_clock_skew_ms);
    println!("   ├─ Smoothing factor: {}", sw.smoothing_factor);
    println!("   └─ Exchange timeout: {} ms", sw.exchange_timeout_ms);

    let buf = &config.buffer;
    println!("\n📦 Buffer");
    println!("   ├─ Confidence threshold: {}", buf.confidence_threshold);
    println!("   ├─ Buffer size: {}", buf.buffer_size);
    println!("   ├─ Max latency: {} ms", buf.max_buffer_latency_ms);
    println!("   └─ Adaptive: {}", buf.adaptive_buffering);

    let ev = &config.event;
    println!("\n⚡ Event");
    println!("   ├─ Confidence threshold: {}", ev.confidence_threshold);
    println!("   ├─ Correlation window: {} ms", ev.correlation_window_ms);
    println!("   ├─ Min correlation score: {}", ev.min_correlation_score);
    println!("   ├─ Max event age: {} ms", ev.max_event_age_ms);
    println!("   └─ Pattern threshold: {}", ev.pattern_match_threshold);

    let q = &config.quality;
    println!("\n📈 Quality");
    println!("   ├─ Window: {}", q.quality_window);
    println!("   ├─ Degradation threshold: {}", q.degradation_threshold);
    println!("   └─ Alert threshold: {}", q.alert_threshold);

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_info_json_on_partial_config() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[buffer]\nbuffer_size = 40").unwrap();

        let args = InfoArgs {
            config: file.path().to_path_buf(),
            json: true,
        };
        assert!(run_info(&args).is_ok());
    }

    #[test]
    fn test_info_missing_file() {
        let args = InfoArgs {
            config: "/nonexistent/sync.toml".into(),
            json: false,
        };
        let err = run_info(&args).unwrap_err();
        assert!(format!("{err:#}").contains("not found"));
    }
}
