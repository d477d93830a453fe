//! 存储访问模块
//!
//! 协调器对外部存储的全部读写都经过 [`Store`] trait，生产环境使用
//! [`KubeStore`]，测试中使用 mock 或内存实现。
//! 不存在的对象在这一层被吸收：读取返回 `None`，删除不存在的对象视为成功。
//!
//! 集群注册表与 ManifestWork 归属查询由 reflector 缓存提供，避免每次协调都对
//! API Server 发起全集群 list；Application 与单个 ManifestWork 的读取仍直接访问 API。

use async_trait::async_trait;
use kube::api::{Api, ApiResource, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::runtime::reflector;
use kube::{Client, ResourceExt};
use tracing::{debug, trace};

#[cfg(test)]
use mockall::automock;

use argopull_common::constants::LABEL_KEY_HUB_APPLICATION_UID;
use argopull_common::{Application, ClusterRecord, Error, KnownClusters, ManifestWork, Result};

/// 协调器所需的存储操作
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Store: Send + Sync {
    /// 读取 Application，不存在时返回 None
    async fn get_application(&self, namespace: &str, name: &str) -> Result<Option<Application>>;

    /// 以读取时的 resourceVersion 写回 Application，版本过期时返回冲突
    async fn update_application(&self, app: &Application) -> Result<Application>;

    /// 当前集群注册表快照（缓存）
    async fn list_clusters(&self) -> Result<KnownClusters>;

    /// 按名称读取 ManifestWork，不存在时返回 None
    async fn get_work(&self, namespace: &str, name: &str) -> Result<Option<ManifestWork>>;

    /// 某个 Application 拥有的 ManifestWork（缓存，可能落后于 API Server）
    async fn cached_works(&self, app_uid: &str) -> Result<Vec<ManifestWork>>;

    /// 直接向 API Server 列出某个 Application 拥有的全部 ManifestWork
    async fn list_works(&self, app_uid: &str) -> Result<Vec<ManifestWork>>;

    async fn create_work(&self, work: &ManifestWork) -> Result<()>;

    /// 以读取时的 resourceVersion 替换 ManifestWork
    async fn replace_work(&self, work: &ManifestWork) -> Result<()>;

    /// 删除 ManifestWork，不存在时视为成功
    async fn delete_work(&self, namespace: &str, name: &str) -> Result<()>;
}

/// 基于 kube-rs 的存储实现
#[derive(Clone)]
pub struct KubeStore {
    /// Kubernetes 客户端
    client: Client,
    application_resource: ApiResource,
    /// ManagedCluster 缓存
    clusters: reflector::Store<DynamicObject>,
    /// ManifestWork 缓存
    works: reflector::Store<ManifestWork>,
}

impl KubeStore {
    pub fn new(
        client: Client,
        clusters: reflector::Store<DynamicObject>,
        works: reflector::Store<ManifestWork>,
    ) -> Self {
        Self {
            client,
            application_resource: Application::api_resource(),
            clusters,
            works,
        }
    }

    fn applications(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &self.application_resource)
    }

    fn works(&self, namespace: &str) -> Api<ManifestWork> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl Store for KubeStore {
    async fn get_application(&self, namespace: &str, name: &str) -> Result<Option<Application>> {
        let app = self.applications(namespace).get_opt(name).await?;
        Ok(app.map(Application::from))
    }

    async fn update_application(&self, app: &Application) -> Result<Application> {
        let namespace = app
            .namespace()
            .ok_or_else(|| Error::MalformedApplication(format!("{} 缺少命名空间", app.name())))?;
        let updated = self
            .applications(&namespace)
            .replace(&app.name(), &PostParams::default(), app.as_dynamic())
            .await?;
        debug!(
            namespace = %namespace,
            name = %app.name(),
            resource_version = ?updated.resource_version(),
            "已更新 Application"
        );
        Ok(Application::from(updated))
    }

    async fn list_clusters(&self) -> Result<KnownClusters> {
        let clusters = cluster_snapshot(&self.clusters);
        trace!(count = clusters.len(), "读取集群注册表缓存");
        Ok(clusters)
    }

    async fn get_work(&self, namespace: &str, name: &str) -> Result<Option<ManifestWork>> {
        Ok(self.works(namespace).get_opt(name).await?)
    }

    async fn cached_works(&self, app_uid: &str) -> Result<Vec<ManifestWork>> {
        Ok(owned_works(&self.works, app_uid))
    }

    async fn list_works(&self, app_uid: &str) -> Result<Vec<ManifestWork>> {
        let api: Api<ManifestWork> = Api::all(self.client.clone());
        let selector = format!("{LABEL_KEY_HUB_APPLICATION_UID}={app_uid}");
        let works = api.list(&ListParams::default().labels(&selector)).await?;
        Ok(works.items)
    }

    async fn create_work(&self, work: &ManifestWork) -> Result<()> {
        let namespace = work_namespace(work)?;
        self.works(&namespace)
            .create(&PostParams::default(), work)
            .await?;
        Ok(())
    }

    async fn replace_work(&self, work: &ManifestWork) -> Result<()> {
        let namespace = work_namespace(work)?;
        self.works(&namespace)
            .replace(&work.name_any(), &PostParams::default(), work)
            .await?;
        Ok(())
    }

    async fn delete_work(&self, namespace: &str, name: &str) -> Result<()> {
        match self
            .works(namespace)
            .delete(name, &DeleteParams::background())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(resp)) if resp.code == 404 => {
                debug!(namespace = %namespace, name = %name, "ManifestWork 已不存在");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn cluster_snapshot(cache: &reflector::Store<DynamicObject>) -> KnownClusters {
    cache
        .state()
        .iter()
        .filter_map(|cluster| ClusterRecord::from_meta(&cluster.metadata))
        .collect()
}

fn owned_works(cache: &reflector::Store<ManifestWork>, app_uid: &str) -> Vec<ManifestWork> {
    cache
        .state()
        .iter()
        .filter(|work| {
            work.labels()
                .get(LABEL_KEY_HUB_APPLICATION_UID)
                .is_some_and(|uid| uid == app_uid)
        })
        .map(|work| work.as_ref().clone())
        .collect()
}

fn work_namespace(work: &ManifestWork) -> Result<String> {
    work.namespace()
        .ok_or_else(|| Error::InvalidObject(format!("ManifestWork {} 缺少命名空间", work.name_any())))
}
