//! ArgoPull Operator - 以拉取模式分发 Argo CD Application
//!
//! 该模块实现了 ArgoPull 的 Kubernetes Operator：监听 Hub 集群上带有拉取标签的
//! Application，将其 spec 包装进目标受管集群命名空间中的 ManifestWork，
//! 并在 Application 删除或退出拉取模式时撤回对应的 ManifestWork。

pub mod config;
pub mod controller;
pub mod event_handler;
pub mod reconcile;
pub mod retry;
pub mod store;

use anyhow::{Context, Result};
use kube::Client;
use tracing::info;

use crate::config::OperatorConfig;

/// Operator 主结构体
pub struct ArgoPullOperator {
    /// Kubernetes 客户端
    client: Client,
    /// Operator 配置
    config: OperatorConfig,
}

impl ArgoPullOperator {
    /// 创建新的 Operator 实例
    pub async fn new(config: OperatorConfig) -> Result<Self> {
        config.validate()?;

        // 创建 Kubernetes 客户端
        let client = Client::try_default()
            .await
            .context("无法创建 Kubernetes 客户端")?;

        Ok(Self { client, config })
    }

    /// 运行 Operator，直到收到退出信号
    pub async fn run(self) -> Result<()> {
        info!("ArgoPull Operator 已启动");
        controller::Controller::new(self.client, self.config)
            .run()
            .await?;
        info!("ArgoPull Operator 已停止");
        Ok(())
    }
}
