//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use contracts::{SyncPreset, SyncStrategy};
use observability::LogFormat;
use std::path::PathBuf;

/// Stream Sync - multi-stream timestamp synchronization
#[derive(Parser, Debug)]
#[command(
    name = "stream-sync",
    author,
    version,
    about = "Multi-stream timestamp synchronization engine",
    long_about = "Aligns timestamped samples from independent streams (video, audio, gaze, \n\
                  telemetry) onto a common timeline using hardware, software (NTP-style), \n\
                  buffer-based or event-driven strategies."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "STREAM_SYNC_VERBOSE")]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        default_value = "pretty",
        global = true,
        env = "STREAM_SYNC_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Default filter level when `RUST_LOG` is unset
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "warn";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Drive the engine with synthetic streams and print a quality summary
    Simulate(SimulateArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display the effective configuration
    Info(InfoArgs),
}

/// Arguments for the `simulate` command
#[derive(Parser, Debug, Clone)]
pub struct SimulateArgs {
    /// Engine configuration file (TOML or JSON); preset defaults when omitted
    #[arg(short, long, env = "STREAM_SYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Coordinator preset (cadence and engine defaults)
    #[arg(long, default_value = "balanced", env = "STREAM_SYNC_PRESET")]
    pub preset: SyncPreset,

    /// Strategy to start with (overrides the configured default)
    #[arg(long)]
    pub strategy: Option<SyncStrategy>,

    /// Simulated run length in milliseconds
    #[arg(long, default_value = "3000", env = "STREAM_SYNC_DURATION_MS")]
    pub duration_ms: u64,

    /// Streams to generate
    #[arg(
        long,
        value_enum,
        value_delimiter = ',',
        default_value = "video,audio,gaze,telemetry"
    )]
    pub streams: Vec<SimStream>,

    /// Switch strategy after this many milliseconds
    #[arg(long, requires = "switch_to")]
    pub switch_at_ms: Option<u64>,

    /// Strategy to switch to at `--switch-at-ms`
    #[arg(long, requires = "switch_at_ms")]
    pub switch_to: Option<SyncStrategy>,

    /// Seed for the synthetic clock skew, drift and jitter
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Offset of the simulated time server against the local clock (ms)
    #[arg(long, default_value = "0", allow_negative_numbers = true)]
    pub server_offset_ms: i64,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "STREAM_SYNC_METRICS_PORT")]
    pub metrics_port: u16,

    /// Output the summary as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "sync.toml", env = "STREAM_SYNC_CONFIG")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "sync.toml", env = "STREAM_SYNC_CONFIG")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Synthetic stream kinds
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimStream {
    /// 30 Hz frames with hardware timestamps
    Video,
    /// 50 Hz chunks
    Audio,
    /// 120 Hz gaze points with hardware timestamps
    Gaze,
    /// 10 Hz scalar readings
    Telemetry,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulate_defaults() {
        let cli = Cli::try_parse_from(["stream-sync", "simulate"]).unwrap();
        let Commands::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(args.preset, SyncPreset::Balanced);
        assert_eq!(args.duration_ms, 3000);
        assert_eq!(args.streams.len(), 4);
        assert!(args.strategy.is_none());
        assert!(args.switch_at_ms.is_none());
    }

    #[test]
    fn test_simulate_overrides() {
        let cli = Cli::try_parse_from([
            "stream-sync",
            "-v",
            "simulate",
            "--preset",
            "research",
            "--strategy",
            "event",
            "--streams",
            "video,audio",
            "--switch-at-ms",
            "500",
            "--switch-to",
            "buffer",
            "--server-offset-ms",
            "-25",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        let Commands::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(args.preset, SyncPreset::Research);
        assert_eq!(args.strategy, Some(SyncStrategy::Event));
        assert_eq!(args.streams, vec![SimStream::Video, SimStream::Audio]);
        assert_eq!(args.switch_at_ms, Some(500));
        assert_eq!(args.switch_to, Some(SyncStrategy::Buffer));
        assert_eq!(args.server_offset_ms, -25);
    }

    #[test]
    fn test_switch_requires_target() {
        assert!(Cli::try_parse_from(["stream-sync", "simulate", "--switch-at-ms", "100"]).is_err());
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        assert!(Cli::try_parse_from(["stream-sync", "simulate", "--strategy", "gps"]).is_err());
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["stream-sync", "-q", "-v", "info"]).is_err());
    }

    #[test]
    fn test_log_options() {
        let cli = Cli::try_parse_from(["stream-sync", "info"]).unwrap();
        assert_eq!(cli.log_format, LogFormat::Pretty);
        assert_eq!(cli.log_level(), "info");

        let cli =
            Cli::try_parse_from(["stream-sync", "-vv", "--log-format", "json", "info"]).unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.log_level(), "trace");

        let cli = Cli::try_parse_from(["stream-sync", "-q", "info"]).unwrap();
        assert_eq!(cli.log_level(), "warn");

        assert!(Cli::try_parse_from(["stream-sync", "--log-format", "xml", "info"]).is_err());
    }
}
