//! `simulate` command implementation.

use anyhow::{Context, Result};
use contracts::SyncEngineConfig;
use std::time::Duration;
use tracing::{info, warn};

use super::load_config;
use crate::cli::SimulateArgs;
use crate::simulation::{Simulation, SimulationConfig, StrategySwitch};

/// Execute the `simulate` command
pub async fn run_simulate(args: &SimulateArgs) -> Result<()> {
    let simulation_config = build_simulation_config(args)?;

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
        info!("Metrics endpoint available on port {}", args.metrics_port);
    }

    let simulation = Simulation::new(simulation_config);
    let shutdown_signal = setup_shutdown_signal();

    info!(preset = %args.preset, "Starting simulation...");

    tokio::select! {
        result = simulation.run() => {
            let stats = result.context("Simulation failed")?;
            info!(
                batches = stats.batches,
                samples = stats.samples_generated,
                duration_secs = stats.duration.as_secs_f64(),
                grade = %stats.report.grade,
                "Simulation completed"
            );

            if args.json {
                let json = serde_json::to_string_pretty(&stats)
                    .context("Failed to serialize simulation stats")?;
                println!("{}", json);
            } else {
                stats.print_summary();
            }
        }
        _ = shutdown_signal => {
            warn!("Received shutdown signal, stopping simulation...");
        }
    }

    Ok(())
}

/// Resolve engine config (file or preset) and CLI overrides.
fn build_simulation_config(args: &SimulateArgs) -> Result<SimulationConfig> {
    let engine: SyncEngineConfig = match &args.config {
        Some(path) => {
            info!(config = %path.display(), "Loading configuration");
            load_config(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        None => SyncEngineConfig::from_preset(args.preset),
    };

    let switch = match (args.switch_at_ms, args.switch_to) {
        (Some(at), Some(to)) => Some(StrategySwitch {
            at: Duration::from_millis(at),
            to,
        }),
        _ => None,
    };

    Ok(SimulationConfig {
        engine,
        cadence: Duration::from_millis(args.preset.cadence_ms()),
        duration: Duration::from_millis(args.duration_ms),
        initial_strategy: args.strategy,
        streams: args.streams.clone(),
        switch,
        seed: args.seed,
        server_offset_ms: args.server_offset_ms,
    })
}

/// Wait for Ctrl+C or SIGTERM
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use contracts::{SyncPreset, SyncStrategy};
    use std::io::Write;

    fn parse(argv: &[&str]) -> SimulateArgs {
        let mut full = vec!["stream-sync", "simulate"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Commands::Simulate(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_preset_drives_cadence_and_engine() {
        let config = build_simulation_config(&parse(&["--preset", "robust"])).unwrap();
        assert_eq!(config.cadence, Duration::from_millis(100));
        assert_eq!(
            config.engine.buffer.buffer_size,
            SyncEngineConfig::from_preset(SyncPreset::Robust).buffer.buffer_size
        );
        assert!(config.switch.is_none());
    }

    #[test]
    fn test_config_file_overrides_preset_engine() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "default_strategy = \"software\"").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let config = build_simulation_config(&parse(&["-c", &path, "--preset", "research"])).unwrap();
        assert_eq!(config.engine.default_strategy, SyncStrategy::Software);
        assert_eq!(config.cadence, Duration::from_millis(16));
    }

    #[test]
    fn test_switch_is_built() {
        let config = build_simulation_config(&parse(&[
            "--switch-at-ms",
            "250",
            "--switch-to",
            "hardware",
        ]))
        .unwrap();
        assert_eq!(
            config.switch,
            Some(StrategySwitch {
                at: Duration::from_millis(250),
                to: SyncStrategy::Hardware,
            })
        );
    }

    #[test]
    fn test_missing_config_file_fails() {
        assert!(build_simulation_config(&parse(&["-c", "/nonexistent/sync.toml"])).is_err());
    }
}
