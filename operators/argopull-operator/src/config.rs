//! 配置管理模块
//!
//! 该模块负责加载 Operator 的配置。配置来源按优先级从低到高依次为：
//! 内置默认值、YAML/JSON 配置文件、`ARGOPULL_` 前缀的环境变量、命令行参数。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::debug;

use argopull_common::Error;

/// 环境变量前缀
pub const ENV_PREFIX: &str = "ARGOPULL";

/// Operator 配置结构
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    /// 并发协调的 worker 数量
    pub concurrency: u16,
    /// 日志级别
    pub log_level: String,
    /// 是否输出 JSON 格式日志
    pub log_json: bool,
    /// 删除 ManifestWork 后再次确认的间隔（秒）
    pub requeue_after_deletion_secs: u64,
    /// 定期重新同步的间隔（秒）
    pub resync_interval_secs: u64,
    /// 只监听指定命名空间中的 Application，未设置时监听全部命名空间
    pub application_namespace: Option<String>,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            log_level: "info".to_string(),
            log_json: false,
            requeue_after_deletion_secs: 5,
            resync_interval_secs: 600,
            application_namespace: None,
        }
    }
}

impl OperatorConfig {
    /// 校验配置
    pub fn validate(&self) -> argopull_common::Result<()> {
        if self.concurrency == 0 {
            return Err(Error::Config("concurrency 必须大于 0".to_string()));
        }
        if self.log_level.trim().is_empty() {
            return Err(Error::Config("log_level 不能为空".to_string()));
        }
        if matches!(&self.application_namespace, Some(ns) if ns.trim().is_empty()) {
            return Err(Error::Config("application_namespace 不能为空字符串".to_string()));
        }
        Ok(())
    }

    pub fn requeue_after_deletion(&self) -> Duration {
        Duration::from_secs(self.requeue_after_deletion_secs)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }
}

/// 命令行参数
#[derive(Debug, Default, Parser)]
#[command(name = "argopull-operator", version, about = "将 Argo CD Application 以拉取模式分发到受管集群")]
pub struct Cli {
    /// 配置文件路径（YAML 或 JSON）
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 日志级别，覆盖配置文件
    #[arg(long)]
    pub log_level: Option<String>,

    /// 并发协调数量，覆盖配置文件
    #[arg(long)]
    pub concurrency: Option<u16>,

    /// 输出 JSON 格式日志
    #[arg(long)]
    pub log_json: bool,
}

impl Cli {
    /// 将命令行参数叠加到配置上
    pub fn apply(&self, config: &mut OperatorConfig) {
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if self.log_json {
            config.log_json = true;
        }
    }
}

/// 配置管理器
pub struct ConfigManager {
    /// 当前配置
    config: OperatorConfig,
}

impl ConfigManager {
    /// 从配置文件与进程环境变量加载配置
    pub fn new(config_path: Option<&Path>) -> Result<Self> {
        Self::with_environment(config_path, None)
    }

    /// 使用给定的环境变量集合加载配置，`None` 表示读取进程环境
    pub fn with_environment(
        config_path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self> {
        let config = Self::load_config(config_path, env).with_context(|| match config_path {
            Some(path) => format!("无法加载配置文件: {:?}", path),
            None => "无法加载配置".to_string(),
        })?;

        Ok(Self { config })
    }

    fn load_config(
        config_path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<OperatorConfig> {
        let mut builder = Config::builder();

        if let Some(path) = config_path {
            // 确定配置文件格式
            let format = match path.extension().and_then(|ext| ext.to_str()) {
                Some("yaml") | Some("yml") => FileFormat::Yaml,
                Some("json") => FileFormat::Json,
                _ => return Err(anyhow!("不支持的配置文件格式，仅支持 YAML 或 JSON")),
            };
            builder = builder.add_source(File::from(path).format(format));
        }

        let config = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true).source(env))
            .build()
            .context("构建配置失败")?;

        let operator_config = config
            .try_deserialize::<OperatorConfig>()
            .context("配置格式错误")?;
        debug!(config = ?operator_config, "配置已加载");

        Ok(operator_config)
    }

    /// 叠加命令行参数并校验，得到最终配置
    pub fn finalize(mut self, cli: &Cli) -> Result<OperatorConfig> {
        cli.apply(&mut self.config);
        self.config.validate()?;
        Ok(self.config)
    }

    /// 获取完整配置
    pub fn get_config(&self) -> &OperatorConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn no_env() -> Option<HashMap<String, String>> {
        Some(HashMap::new())
    }

    #[test]
    fn test_defaults_without_sources() {
        let manager = ConfigManager::with_environment(None, no_env()).unwrap();
        assert_eq!(manager.get_config(), &OperatorConfig::default());
    }

    #[test]
    fn test_yaml_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "concurrency: 3\nresync_interval_secs: 60\napplication_namespace: argocd").unwrap();

        let manager = ConfigManager::with_environment(Some(file.path()), no_env()).unwrap();
        let config = manager.get_config();
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.resync_interval(), Duration::from_secs(60));
        assert_eq!(config.application_namespace.as_deref(), Some("argocd"));
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"concurrency": 3, "log_level": "debug"}}"#).unwrap();

        let env = HashMap::from([
            ("ARGOPULL_CONCURRENCY".to_string(), "12".to_string()),
            ("ARGOPULL_LOG_JSON".to_string(), "true".to_string()),
        ]);
        let manager = ConfigManager::with_environment(Some(file.path()), Some(env)).unwrap();
        let config = manager.get_config();
        assert_eq!(config.concurrency, 12);
        assert!(config.log_json);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_unsupported_extension_is_rejected() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        assert!(ConfigManager::with_environment(Some(file.path()), no_env()).is_err());
    }

    #[test]
    fn test_cli_overrides_and_validation() {
        let manager = ConfigManager::with_environment(None, no_env()).unwrap();
        let cli = Cli::parse_from(["argopull-operator", "--log-level", "debug", "--concurrency", "2"]);
        let config = manager.finalize(&cli).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.concurrency, 2);

        let manager = ConfigManager::with_environment(None, no_env()).unwrap();
        let cli = Cli::parse_from(["argopull-operator", "--concurrency", "0"]);
        assert!(manager.finalize(&cli).is_err());
    }

    #[test]
    fn test_empty_log_level_is_rejected() {
        let config = OperatorConfig {
            log_level: "  ".to_string(),
            ..OperatorConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
