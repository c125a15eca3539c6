//! # Stream Sync CLI
//!
//! `stream-sync` 二进制入口：解析参数，初始化日志，分发子命令。
//!
//! - `simulate`：合成多流数据驱动同步引擎，输出质量摘要
//! - `validate`：校验配置文件
//! - `info`：打印生效配置

mod cli;
mod commands;
mod error;
mod simulation;

use anyhow::Result;
use clap::Parser;
use observability::ObservabilityConfig;
use tracing::{error, info};

use cli::{Cli, Commands};
use commands::{run_info, run_simulate, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Metrics exporter is opt-in per command (`simulate --metrics-port`).
    observability::init_with_config(ObservabilityConfig {
        log_format: cli.log_format,
        metrics_port: None,
        default_log_level: cli.log_level().to_string(),
    })?;

    info!(version = env!("CARGO_PKG_VERSION"), "stream-sync starting");

    let result = match &cli.command {
        Commands::Simulate(args) => run_simulate(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
    };

    if let Err(e) = &result {
        error!(error = %e, "command failed");
    }
    result
}
