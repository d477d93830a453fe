//! 控制器模块
//!
//! 该模块把协调器接入 kube-rs 的 Controller：监听 Application、ManagedCluster
//! 与 ManifestWork，并按配置的并发度执行协调。调度器保证同一 Application
//! 不会被并发协调，重复的请求在排队期间会被合并。

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use futures::StreamExt;
use kube::{
    api::{Api, DynamicObject},
    client::Client,
    runtime::{
        controller::{self, Action, Controller as KubeController},
        reflector::{self, store::Writer},
        watcher, WatchStreamExt,
    },
    ResourceExt,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use argopull_common::{Application, ClusterRecord, Error, ErrorKind, ManifestWork};

use crate::config::OperatorConfig;
use crate::event_handler::{self, EventSource};
use crate::reconcile::{ReconcileOptions, ReconcileOutcome, Reconciler};
use crate::retry::{compute_backoff, RetryTracker};
use crate::store::{KubeStore, Store};

/// 协调上下文
pub struct Context {
    /// 协调器
    reconciler: Reconciler,
    /// 连续失败次数
    retries: RetryTracker,
    /// 收敛后的重新同步间隔
    resync_interval: Duration,
}

impl Context {
    pub fn new(reconciler: Reconciler, resync_interval: Duration) -> Self {
        Self {
            reconciler,
            retries: RetryTracker::new(),
            resync_interval,
        }
    }
}

/// 控制器结构体
pub struct Controller {
    /// Kubernetes 客户端
    client: Client,
    /// Operator 配置
    config: OperatorConfig,
}

impl Controller {
    /// 创建新的控制器
    pub fn new(client: Client, config: OperatorConfig) -> Self {
        Self { client, config }
    }

    /// 运行控制器，直到收到 SIGTERM 或 SIGINT
    pub async fn run(self) -> Result<()> {
        let app_resource = Application::api_resource();
        let cluster_resource = ClusterRecord::api_resource();

        let applications: Api<DynamicObject> = match &self.config.application_namespace {
            Some(namespace) => Api::namespaced_with(self.client.clone(), namespace, &app_resource),
            None => Api::all_with(self.client.clone(), &app_resource),
        };
        let clusters: Api<DynamicObject> = Api::all_with(self.client.clone(), &cluster_resource);
        let works: Api<ManifestWork> = Api::all(self.client.clone());

        // 集群注册表与 ManifestWork 缓存，协调器只从缓存读取列表
        let cluster_writer = Writer::new(cluster_resource.clone());
        let cluster_cache = cluster_writer.as_reader();
        let (work_cache, work_writer) = reflector::store::<ManifestWork>();
        let reflectors = [
            spawn_reflector("ManagedCluster", {
                let stream = reflector::reflector(
                    cluster_writer,
                    watcher(clusters.clone(), watcher::Config::default()).default_backoff(),
                );
                stream.for_each(log_watch_error("ManagedCluster"))
            }),
            spawn_reflector("ManifestWork", {
                let stream = reflector::reflector(
                    work_writer,
                    watcher(works.clone(), watcher::Config::default()).default_backoff(),
                );
                stream.for_each(log_watch_error("ManifestWork"))
            }),
        ];

        // 缓存为空时所有集群都会被判定为未注册，必须等待首次同步完成
        cluster_cache
            .wait_until_ready()
            .await
            .map_err(|_| anyhow!("ManagedCluster 缓存同步失败"))?;
        work_cache
            .wait_until_ready()
            .await
            .map_err(|_| anyhow!("ManifestWork 缓存同步失败"))?;
        info!(clusters = cluster_cache.state().len(), "缓存已同步");

        let store: Arc<dyn Store> = Arc::new(KubeStore::new(
            self.client.clone(),
            cluster_cache,
            work_cache,
        ));
        let reconciler = Reconciler::new(
            store,
            ReconcileOptions {
                requeue_after_deletion: self.config.requeue_after_deletion(),
            },
        );
        let context = Arc::new(Context::new(reconciler, self.config.resync_interval()));

        let controller = KubeController::new_with(
            applications,
            watcher::Config::default(),
            app_resource.clone(),
        )
        .with_config(controller::Config::default().concurrency(self.config.concurrency));

        // 集群变化时从本地缓存中找出受影响的 Application
        let cache = controller.store();
        let cluster_mapper_resource = app_resource.clone();
        let work_mapper_resource = app_resource;

        info!(
            concurrency = self.config.concurrency,
            namespace = ?self.config.application_namespace,
            "启动 Application 控制器"
        );

        controller
            .watches_with(
                clusters,
                cluster_resource,
                watcher::Config::default(),
                move |_cluster| {
                    event_handler::applications_for_cluster_change(
                        cache.state(),
                        &cluster_mapper_resource,
                    )
                },
            )
            .watches(works, watcher::Config::default(), move |work| {
                event_handler::application_for_work(&work, &work_mapper_resource)
            })
            .shutdown_on_signal()
            .run(reconcile, error_policy, context)
            .for_each(|result| async move {
                match result {
                    Ok((app, _)) => debug!(application = %app, "协调完成"),
                    Err(e) => warn!(error = %e, "协调失败"),
                }
            })
            .await;

        for handle in reflectors {
            handle.abort();
        }
        info!("Application 控制器已停止");
        Ok(())
    }
}

fn spawn_reflector<F>(kind: &'static str, task: F) -> JoinHandle<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    debug!(kind, "启动缓存");
    tokio::spawn(task)
}

fn log_watch_error<T, E: std::fmt::Display>(
    kind: &'static str,
) -> impl FnMut(std::result::Result<T, E>) -> futures::future::Ready<()> {
    move |event| {
        if let Err(e) = event {
            warn!(kind, error = %e, "监听出错，稍后重试");
        }
        futures::future::ready(())
    }
}

async fn reconcile(app: Arc<DynamicObject>, ctx: Arc<Context>) -> argopull_common::Result<Action> {
    let name = app.name_any();
    let namespace = app
        .namespace()
        .ok_or_else(|| Error::InvalidObject(format!("Application {name} 缺少命名空间")))?;

    debug!(source = ?EventSource::Application, namespace = %namespace, name = %name, "开始协调");
    let outcome = ctx.reconciler.reconcile(&namespace, &name).await?;
    ctx.retries.reset(&retry_key(&app));

    Ok(match outcome {
        ReconcileOutcome::Done => {
            debug!(source = ?EventSource::Resync, after = ?ctx.resync_interval, "等待下一次重新同步");
            Action::requeue(ctx.resync_interval)
        }
        ReconcileOutcome::RequeueAfter(delay) => Action::requeue(delay),
    })
}

fn error_policy(app: Arc<DynamicObject>, error: &Error, ctx: Arc<Context>) -> Action {
    let key = retry_key(&app);
    let attempt = ctx.retries.increment(&key);
    let kind = error.kind();
    let delay = compute_backoff(attempt, kind);

    match kind {
        ErrorKind::Conflict => debug!(
            application = %key,
            attempt,
            delay = ?delay,
            "写入冲突，稍后重新读取"
        ),
        _ => warn!(
            application = %key,
            attempt,
            delay = ?delay,
            error = %error,
            "协调出错，稍后重试"
        ),
    }

    Action::requeue(delay)
}

/// 重试计数的键，优先使用 UID，使同名重建的对象重新计数
fn retry_key(app: &DynamicObject) -> String {
    app.uid()
        .unwrap_or_else(|| format!("{}/{}", app.namespace().unwrap_or_default(), app.name_any()))
}
