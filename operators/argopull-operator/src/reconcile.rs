//! 资源协调模块
//!
//! 该模块实现 Application 到 ManifestWork 的协调状态机。每次调用都从存储中
//! 重新读取 Application 与集群注册表，重新计算期望状态，再与观察到的
//! ManifestWork 做差异比较。协调器本身不保存任何权威状态，同一输入反复执行
//! 总是收敛到同一结果，因此重复或合并的协调请求都是无害的。
//!
//! 集群注册表与工作对象归属来自缓存；移除终结器前会直接向 API Server
//! 确认工作对象已全部删除。
//!
//! 状态：
//! - 未管理：未启用拉取且没有工作对象，不会被写入
//! - 分发中：工作对象存在且载荷与当前 spec 一致，终结器存在
//! - 终止中：删除标记已设置，等待工作对象删除完成
//! - 已消失：终结器已移除，对象被物理删除

use std::sync::Arc;
use std::time::Duration;

use kube::ResourceExt;
use tracing::{debug, info, warn};

use argopull_common::eligibility::{self, Eligibility};
use argopull_common::payload::{self, Payload};
use argopull_common::{Application, Error, ManifestWork, Result};

use crate::store::Store;

/// 协调参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// 删除工作对象后，再次确认删除结果的间隔
    pub requeue_after_deletion: Duration,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            requeue_after_deletion: Duration::from_secs(5),
        }
    }
}

/// 单次协调的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// 已收敛
    Done,
    /// 清理仍在进行，需要在指定时间后再次确认
    RequeueAfter(Duration),
}

/// 协调器
pub struct Reconciler {
    store: Arc<dyn Store>,
    options: ReconcileOptions,
}

impl Reconciler {
    /// 创建新的协调器
    pub fn new(store: Arc<dyn Store>, options: ReconcileOptions) -> Self {
        Self { store, options }
    }

    /// 协调指定的 Application
    ///
    /// 任何存储错误都会原样返回，由调用方按退避策略重新入队，
    /// 下一次执行从头读取最新状态，不会重放过期的写入。
    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<ReconcileOutcome> {
        let Some(app) = self.store.get_application(namespace, name).await? else {
            debug!(namespace = %namespace, name = %name, "Application 不存在，无需处理");
            return Ok(ReconcileOutcome::Done);
        };

        let Some(uid) = app.uid().map(str::to_string) else {
            return Err(Error::MalformedApplication(format!(
                "{namespace}/{name} 缺少 metadata.uid"
            )));
        };

        if app.is_terminating() {
            debug!(namespace = %namespace, name = %name, "Application 正在删除");
            return self.withdraw(app, &uid).await;
        }

        let clusters = self.store.list_clusters().await?;
        match eligibility::evaluate(&app, &clusters) {
            Eligibility::Target(cluster) => match payload::build(&app) {
                Ok(payload) => self.propagate(app, &uid, &cluster, payload).await,
                Err(e) => {
                    warn!(
                        namespace = %namespace,
                        name = %name,
                        error = %e,
                        "无法构建载荷，不进行分发"
                    );
                    self.withdraw(app, &uid).await
                }
            },
            Eligibility::Excluded(reason) => {
                warn!(
                    namespace = %namespace,
                    name = %name,
                    reason = %reason,
                    "目标集群不可用，不进行分发"
                );
                self.withdraw(app, &uid).await
            }
            Eligibility::NotManaged => self.withdraw(app, &uid).await,
        }
    }

    /// 确保工作对象存在于目标集群且载荷最新
    async fn propagate(
        &self,
        mut app: Application,
        uid: &str,
        cluster: &str,
        payload: Payload,
    ) -> Result<ReconcileOutcome> {
        let desired = payload::build_manifest_work(&app, cluster, payload)?;
        let work_name = desired.name_any();

        // 终结器必须先于工作对象落盘
        let added = app.add_finalizer();
        let drained = app.clear_operation();
        if added || drained {
            self.store.update_application(&app).await?;
            info!(
                namespace = ?app.namespace(),
                name = %app.name(),
                finalizer_added = added,
                operation_drained = drained,
                "已更新 Application"
            );
        }

        let mut outcome = ReconcileOutcome::Done;
        match self.store.get_work(cluster, &work_name).await? {
            None => {
                self.store.create_work(&desired).await?;
                info!(cluster = %cluster, work = %work_name, "已创建 ManifestWork");
            }
            Some(existing) if existing.is_terminating() => {
                debug!(cluster = %cluster, work = %work_name, "ManifestWork 正在删除，稍后重建");
                outcome = ReconcileOutcome::RequeueAfter(self.options.requeue_after_deletion);
            }
            Some(existing) if payload::work_is_current(&existing, &desired) => {
                debug!(cluster = %cluster, work = %work_name, "ManifestWork 已是最新");
            }
            Some(existing) => {
                let updated = payload::merge_into_existing(&existing, &desired);
                self.store.replace_work(&updated).await?;
                info!(cluster = %cluster, work = %work_name, "已更新 ManifestWork 载荷");
            }
        }

        // 目标集群变更后遗留在其他命名空间的旧对象
        let stale: Vec<ManifestWork> = self
            .store
            .cached_works(uid)
            .await?
            .into_iter()
            .filter(|work| !(work.namespace().as_deref() == Some(cluster) && work.name_any() == work_name))
            .collect();
        self.delete_works(&stale).await?;

        Ok(outcome)
    }

    /// 撤回分发：删除全部工作对象，Application 删除时确认后移除终结器
    ///
    /// 未删除的 Application 保留终结器，它与 Argo CD 的资源终结器同名。
    async fn withdraw(&self, mut app: Application, uid: &str) -> Result<ReconcileOutcome> {
        let works = self.store.cached_works(uid).await?;

        // 未启用拉取且没有工作对象的 Application 不做任何写入
        if !app.pull_enabled() && works.is_empty() {
            return Ok(ReconcileOutcome::Done);
        }

        let drained = app.clear_operation();
        if !works.is_empty() {
            return self.retract(&app, &works, drained).await;
        }

        let mut released = false;
        if app.is_terminating() && app.has_finalizer() {
            // 缓存可能尚未观察到刚创建的对象
            let remaining = self.store.list_works(uid).await?;
            if !remaining.is_empty() {
                return self.retract(&app, &remaining, drained).await;
            }
            released = app.remove_finalizer();
        }

        if released || drained {
            self.store.update_application(&app).await?;
            info!(
                namespace = ?app.namespace(),
                name = %app.name(),
                finalizer_removed = released,
                operation_drained = drained,
                "已更新 Application"
            );
        }

        Ok(ReconcileOutcome::Done)
    }

    /// 删除工作对象，稍后再确认删除结果
    async fn retract(
        &self,
        app: &Application,
        works: &[ManifestWork],
        drained: bool,
    ) -> Result<ReconcileOutcome> {
        self.delete_works(works).await?;
        if drained {
            self.store.update_application(app).await?;
            info!(name = %app.name(), "已清除 operation 字段");
        }
        Ok(ReconcileOutcome::RequeueAfter(
            self.options.requeue_after_deletion,
        ))
    }

    async fn delete_works(&self, works: &[ManifestWork]) -> Result<()> {
        for work in works.iter().filter(|work| !work.is_terminating()) {
            let namespace = work.namespace().unwrap_or_default();
            let name = work.name_any();
            self.store.delete_work(&namespace, &name).await?;
            info!(cluster = %namespace, work = %name, "已删除 ManifestWork");
        }
        Ok(())
    }
}
