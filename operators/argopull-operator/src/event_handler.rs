//! 事件处理模块
//!
//! 把关联资源的变化映射为需要重新协调的 Application：
//! - ManagedCluster 的任何变化都可能改变资格判定，因此重新入队全部受管 Application
//! - ManifestWork 的变化通过回溯注解找到所属 Application
//!
//! 映射函数都是纯函数，控制器的调度器负责去重与合并。

use std::sync::Arc;

use kube::api::{ApiResource, DynamicObject};
use kube::runtime::reflector::ObjectRef;
use kube::ResourceExt;
use tracing::trace;

use argopull_common::constants::{
    ANNOTATION_KEY_HUB_APPLICATION_NAME, ANNOTATION_KEY_HUB_APPLICATION_NAMESPACE,
};
use argopull_common::{Application, ManifestWork};

/// 事件来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    /// Application 自身变化
    Application,
    /// 集群注册表变化
    Cluster,
    /// ManifestWork 变化
    Work,
    /// 定期重新同步
    Resync,
}

/// 集群注册表变化后需要重新协调的 Application
///
/// 只有启用了拉取标签的 Application 才可能受到影响，撤回由其自身或 ManifestWork 的事件触发。
pub fn applications_for_cluster_change(
    cached: Vec<Arc<DynamicObject>>,
    resource: &ApiResource,
) -> Vec<ObjectRef<DynamicObject>> {
    let refs: Vec<ObjectRef<DynamicObject>> = cached
        .into_iter()
        .map(|obj| Application::from(obj.as_ref().clone()))
        .filter(Application::pull_enabled)
        .filter_map(|app| {
            let namespace = app.namespace()?;
            Some(ObjectRef::new_with(&app.name(), resource.clone()).within(&namespace))
        })
        .collect();
    trace!(source = ?EventSource::Cluster, count = refs.len(), "集群变化触发重新协调");
    refs
}

/// ManifestWork 所属的 Application
pub fn application_for_work(
    work: &ManifestWork,
    resource: &ApiResource,
) -> Option<ObjectRef<DynamicObject>> {
    let annotations = work.annotations();
    let namespace = annotations
        .get(ANNOTATION_KEY_HUB_APPLICATION_NAMESPACE)
        .filter(|ns| !ns.is_empty())?;
    let name = annotations
        .get(ANNOTATION_KEY_HUB_APPLICATION_NAME)
        .filter(|name| !name.is_empty())?;
    trace!(source = ?EventSource::Work, work = %work.name_any(), "ManifestWork 变化触发重新协调");
    Some(ObjectRef::new_with(name, resource.clone()).within(namespace))
}
