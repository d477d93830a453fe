//! 集群注册表模型
//!
//! 控制器只读取 ManagedCluster 的存在性与本地集群标记标签，
//! 因此集群记录只保留名称和标签集合。

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{ApiResource, GroupVersionKind};

use crate::constants::{
    CLUSTER_GROUP, CLUSTER_KIND, CLUSTER_PLURAL, CLUSTER_VERSION, LABEL_KEY_LOCAL_CLUSTER,
    LABEL_VALUE_LOCAL_CLUSTER,
};

/// 集群记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterRecord {
    /// 集群名称
    pub name: String,
    /// 集群标签
    pub labels: BTreeMap<String, String>,
}

impl ClusterRecord {
    /// ManagedCluster 的 API 资源描述
    pub fn api_resource() -> ApiResource {
        let gvk = GroupVersionKind::gvk(CLUSTER_GROUP, CLUSTER_VERSION, CLUSTER_KIND);
        ApiResource::from_gvk_with_plural(&gvk, CLUSTER_PLURAL)
    }

    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            labels: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    /// 标记为本地（hub）集群的记录
    pub fn local(name: &str) -> Self {
        Self::new(name).with_label(LABEL_KEY_LOCAL_CLUSTER, LABEL_VALUE_LOCAL_CLUSTER)
    }

    /// 从对象元数据构建，缺少名称时返回 None
    pub fn from_meta(meta: &ObjectMeta) -> Option<Self> {
        let name = meta.name.as_deref().filter(|name| !name.is_empty())?;
        Some(Self {
            name: name.to_string(),
            labels: meta.labels.clone().unwrap_or_default(),
        })
    }

    /// 是否为本地（hub）集群
    pub fn is_local(&self) -> bool {
        self.labels
            .get(LABEL_KEY_LOCAL_CLUSTER)
            .is_some_and(|value| value == LABEL_VALUE_LOCAL_CLUSTER)
    }
}

/// 集群注册表在某一时刻的快照
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownClusters {
    clusters: BTreeMap<String, ClusterRecord>,
}

impl KnownClusters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: ClusterRecord) {
        self.clusters.insert(record.name.clone(), record);
    }

    pub fn get(&self, name: &str) -> Option<&ClusterRecord> {
        self.clusters.get(name)
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }
}

impl FromIterator<ClusterRecord> for KnownClusters {
    fn from_iter<I: IntoIterator<Item = ClusterRecord>>(iter: I) -> Self {
        let mut clusters = Self::new();
        for record in iter {
            clusters.insert(record);
        }
        clusters
    }
}
