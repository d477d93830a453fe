//! ManifestWork 工作对象
//!
//! 由控制器完全拥有，放置在与目标集群同名的命名空间中，
//! 远端集群的代理从这里拉取载荷。远端代理写入的 status 不在此建模。

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// ManifestWork 规范
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "work.open-cluster-management.io",
    version = "v1",
    kind = "ManifestWork",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ManifestWorkSpec {
    /// 待下发的清单集合
    #[serde(default)]
    pub workload: ManifestsTemplate,
}

/// 清单模板
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ManifestsTemplate {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub manifests: Vec<Manifest>,
}

/// 单个清单，内容为任意 Kubernetes 对象
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(transparent)]
pub struct Manifest(pub Value);

impl ManifestWork {
    /// 第一个清单，控制器只写入一个
    pub fn first_manifest(&self) -> Option<&Value> {
        self.spec.workload.manifests.first().map(|manifest| &manifest.0)
    }

    /// 是否已设置删除标记
    pub fn is_terminating(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}
