//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{SyncEngineConfig, SyncStrategy};
use serde::Serialize;
use tracing::info;

use super::load_config;
use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    default_strategy: SyncStrategy,
    quality_monitoring: bool,
    buffer_size: usize,
    max_buffer_latency_ms: u64,
    ntp_sync_interval_ms: u64,
    correlation_window_ms: u64,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    match load_config(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    default_strategy: config.default_strategy,
                    quality_monitoring: config.enable_quality_monitoring,
                    buffer_size: config.buffer.buffer_size,
                    max_buffer_latency_ms: config.buffer.max_buffer_latency_ms,
                    ntp_sync_interval_ms: config.software.ntp_sync_interval_ms,
                    correlation_window_ms: config.event.correlation_window_ms,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &SyncEngineConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if !config.enable_quality_monitoring {
        warnings.push(
            "enable_quality_monitoring is false - no alerts, trend or degradation tracking"
                .to_string(),
        );
    }

    if config.event.min_correlation_score < 0.3 {
        warnings.push(format!(
            "event.min_correlation_score = {} - weak correlations will be accepted",
            config.event.min_correlation_score
        ));
    }

    if config.software.smoothing_factor >= 0.99 {
        warnings.push(
            "software.smoothing_factor close to 1 - offset estimate will barely move".to_string(),
        );
    }

    if config.quality.alert_threshold == 0.0 {
        warnings.push("quality.alert_threshold is 0 - low quality alerts never fire".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Default strategy: {}", summary.default_strategy);
            println!("  Quality monitoring: {}", summary.quality_monitoring);
            println!(
                "  Buffer: {} samples / {} ms",
                summary.buffer_size, summary.max_buffer_latency_ms
            );
            println!("  NTP sync interval: {} ms", summary.ntp_sync_interval_ms);
            println!("  Correlation window: {} ms", summary.correlation_window_ms);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args_for(path: &std::path::Path) -> ValidateArgs {
        ValidateArgs {
            config: path.to_path_buf(),
            json: true,
        }
    }

    #[test]
    fn test_valid_config_with_warning() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "enable_quality_monitoring = false").unwrap();

        let result = validate_config(&args_for(file.path()));
        assert!(result.valid);
        assert_eq!(result.warnings.map(|w| w.len()), Some(1));
        assert_eq!(
            result.summary.map(|s| s.default_strategy),
            Some(SyncStrategy::Buffer)
        );
    }

    #[test]
    fn test_invalid_config_reports_field() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        writeln!(file, r#"{{ "quality": {{ "alert_threshold": 2.0 }} }}"#).unwrap();

        let result = validate_config(&args_for(file.path()));
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("quality.alert_threshold"));
        assert!(run_validate(&args_for(file.path())).is_err());
    }

    #[test]
    fn test_default_config_has_no_warnings() {
        assert!(collect_warnings(&SyncEngineConfig::default()).is_empty());
    }
}
