use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use argopull_operator::config::{Cli, ConfigManager, OperatorConfig};
use argopull_operator::ArgoPullOperator;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigManager::new(cli.config.as_deref())?
        .finalize(&cli)
        .context("配置无效")?;

    init_tracing(&config)?;
    info!(version = env!("CARGO_PKG_VERSION"), config = ?config, "正在启动 ArgoPull Operator");

    ArgoPullOperator::new(config).await?.run().await
}

/// 初始化日志，`RUST_LOG` 优先于配置中的日志级别
fn init_tracing(config: &OperatorConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("日志级别无效")?;

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if config.log_json {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    }
    .map_err(|e| anyhow!(e))
}
