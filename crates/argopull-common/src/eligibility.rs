//! 资格判定
//!
//! 根据 Application 当前的标签、注解和集群注册表快照，判定它是否应被分发、
//! 分发到哪个集群。每次协调都必须重新判定：标签和注解随时可能被编辑，
//! 集群注册表也会独立变化。

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::models::application::Application;
use crate::models::cluster::KnownClusters;

/// DNS-1123 label，ManagedCluster 名称同时也是命名空间名称
static CLUSTER_NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]{0,61}[a-z0-9])?$").expect("集群名称正则表达式无效")
});

/// 判定结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    /// 未启用分发
    NotManaged,
    /// 应分发到指定集群
    Target(String),
    /// 启用了分发，但目标集群不可用
    Excluded(Exclusion),
}

/// 排除原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exclusion {
    /// 集群名称不合法
    InvalidClusterName(String),
    /// 集群未注册
    UnknownCluster(String),
    /// 目标是本地（hub）集群
    LocalCluster(String),
}

impl fmt::Display for Exclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exclusion::InvalidClusterName(name) => write!(f, "集群名称不合法: {name}"),
            Exclusion::UnknownCluster(name) => write!(f, "集群未注册: {name}"),
            Exclusion::LocalCluster(name) => write!(f, "不能分发到本地集群: {name}"),
        }
    }
}

/// 判定 Application 的分发资格
pub fn evaluate(app: &Application, clusters: &KnownClusters) -> Eligibility {
    if !app.pull_enabled() {
        return Eligibility::NotManaged;
    }

    let Some(cluster) = app.target_cluster() else {
        debug!(name = %app.name(), "已启用拉取但未指定目标集群");
        return Eligibility::NotManaged;
    };

    if !is_valid_cluster_name(cluster) {
        return Eligibility::Excluded(Exclusion::InvalidClusterName(cluster.to_string()));
    }

    match clusters.get(cluster) {
        None => Eligibility::Excluded(Exclusion::UnknownCluster(cluster.to_string())),
        Some(record) if record.is_local() => {
            Eligibility::Excluded(Exclusion::LocalCluster(cluster.to_string()))
        }
        Some(_) => Eligibility::Target(cluster.to_string()),
    }
}

/// 集群名称是否为合法的 DNS-1123 label
pub fn is_valid_cluster_name(name: &str) -> bool {
    CLUSTER_NAME_PATTERN.is_match(name)
}
