//! 边界标识常量
//!
//! 与 GitOps 引擎、多集群工作分发组件之间约定的标签、注解、终结器与资源类型。

/// Application 资源组
pub const APPLICATION_GROUP: &str = "argoproj.io";
/// Application 资源版本
pub const APPLICATION_VERSION: &str = "v1alpha1";
/// Application 资源类型
pub const APPLICATION_KIND: &str = "Application";
/// Application 资源复数名
pub const APPLICATION_PLURAL: &str = "applications";

/// ManagedCluster 资源组
pub const CLUSTER_GROUP: &str = "cluster.open-cluster-management.io";
/// ManagedCluster 资源版本
pub const CLUSTER_VERSION: &str = "v1";
/// ManagedCluster 资源类型
pub const CLUSTER_KIND: &str = "ManagedCluster";
/// ManagedCluster 资源复数名
pub const CLUSTER_PLURAL: &str = "managedclusters";

/// 启用拉取式分发的标签，值为 "true"/"false"
pub const LABEL_KEY_PULL: &str = "apps.open-cluster-management.io/pull-to-ocm-managed-cluster";

/// 目标集群注解，值为集群名称
pub const ANNOTATION_KEY_MANAGED_CLUSTER: &str = "apps.open-cluster-management.io/ocm-managed-cluster";

/// 远端 Application 命名空间覆盖注解
pub const ANNOTATION_KEY_MANAGED_CLUSTER_APP_NAMESPACE: &str =
    "apps.open-cluster-management.io/ocm-managed-cluster-app-namespace";

/// 控制器维护的终结器，与 Argo CD 的资源终结器同名
pub const FINALIZER_NAME: &str = "resources-finalizer.argocd.argoproj.io";

/// 一次性命令字段
pub const OPERATION_FIELD: &str = "operation";

/// 本地（hub）集群标记标签
pub const LABEL_KEY_LOCAL_CLUSTER: &str = "local-cluster";
/// 本地集群标记值
pub const LABEL_VALUE_LOCAL_CLUSTER: &str = "true";

/// ManifestWork 上记录来源 Application UID 的标签
pub const LABEL_KEY_HUB_APPLICATION_UID: &str = "apps.open-cluster-management.io/hub-application-uid";
/// ManifestWork 上记录来源 Application 命名空间的注解
pub const ANNOTATION_KEY_HUB_APPLICATION_NAMESPACE: &str =
    "apps.open-cluster-management.io/hub-application-namespace";
/// ManifestWork 上记录来源 Application 名称的注解
pub const ANNOTATION_KEY_HUB_APPLICATION_NAME: &str =
    "apps.open-cluster-management.io/hub-application-name";

/// 集群内 API 服务器地址
pub const KUBERNETES_INTERNAL_API_SERVER_ADDR: &str = "https://kubernetes.default.svc";
