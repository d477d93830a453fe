//! 载荷构建模块
//!
//! 把 Application 的 spec 包装成远端代理可直接应用的 Application 清单。
//! 载荷只包含可部署的 spec 与身份信息，不包含 operation、标签、注解、终结器或 status。
//! 相同的 spec 总是产生逐字节相同的输出，协调器据此判断是否需要写入，
//! 无需额外记录上一次的状态。

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::constants::{
    ANNOTATION_KEY_HUB_APPLICATION_NAME, ANNOTATION_KEY_HUB_APPLICATION_NAMESPACE,
    APPLICATION_GROUP, APPLICATION_KIND, APPLICATION_VERSION, KUBERNETES_INTERNAL_API_SERVER_ADDR,
    LABEL_KEY_HUB_APPLICATION_UID,
};
use crate::error::{Error, Result};
use crate::models::application::Application;
use crate::models::work::{Manifest, ManifestWork, ManifestWorkSpec, ManifestsTemplate};
use crate::naming::manifest_work_name;

/// 已序列化的载荷
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    bytes: Vec<u8>,
    manifest: Value,
}

impl Payload {
    #[cfg(test)]
    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn manifest(&self) -> &Value {
        &self.manifest
    }

    pub fn into_manifest(self) -> Value {
        self.manifest
    }
}

/// 从 Application 构建载荷
pub fn build(app: &Application) -> Result<Payload> {
    let spec = app
        .spec()
        .ok_or_else(|| Error::MalformedApplication(format!("{} 缺少 spec", app.name())))?;
    let namespace = app
        .remote_namespace()
        .ok_or_else(|| Error::MalformedApplication(format!("{} 缺少命名空间", app.name())))?;
    wrap_spec(&app.name(), &namespace, spec)
}

/// 把 spec 包装为完整的 Application 清单
///
/// 远端代理在自身集群内部署，因此 `destination.server` 固定为集群内地址，
/// `destination.name` 被移除。
pub fn wrap_spec(name: &str, namespace: &str, spec: &Value) -> Result<Payload> {
    let Value::Object(spec) = spec else {
        return Err(Error::MalformedApplication(format!(
            "{name} 的 spec 不是对象"
        )));
    };

    let mut spec = spec.clone();
    if let Some(Value::Object(destination)) = spec.get_mut("destination") {
        destination.remove("name");
        destination.insert(
            "server".to_string(),
            Value::String(KUBERNETES_INTERNAL_API_SERVER_ADDR.to_string()),
        );
    }

    let manifest = canonicalize(&json!({
        "apiVersion": format!("{APPLICATION_GROUP}/{APPLICATION_VERSION}"),
        "kind": APPLICATION_KIND,
        "metadata": {
            "name": name,
            "namespace": namespace,
        },
        "spec": Value::Object(spec),
    }));
    let bytes = serde_json::to_vec(&manifest)?;

    Ok(Payload { bytes, manifest })
}

/// 构建期望的 ManifestWork
pub fn build_manifest_work(app: &Application, cluster: &str, payload: Payload) -> Result<ManifestWork> {
    let uid = app
        .uid()
        .ok_or_else(|| Error::MalformedApplication(format!("{} 缺少 uid", app.name())))?;
    let app_namespace = app.namespace().unwrap_or_default();

    let mut work = ManifestWork::new(
        &manifest_work_name(&app.name(), uid),
        ManifestWorkSpec {
            workload: ManifestsTemplate {
                manifests: vec![Manifest(payload.into_manifest())],
            },
        },
    );
    work.metadata.namespace = Some(cluster.to_string());
    work.metadata.labels = Some(BTreeMap::from([(
        LABEL_KEY_HUB_APPLICATION_UID.to_string(),
        uid.to_string(),
    )]));
    work.metadata.annotations = Some(BTreeMap::from([
        (ANNOTATION_KEY_HUB_APPLICATION_NAMESPACE.to_string(), app_namespace),
        (ANNOTATION_KEY_HUB_APPLICATION_NAME.to_string(), app.name()),
    ]));

    Ok(work)
}

/// 已存在的 ManifestWork 是否已与期望一致
///
/// 比较唯一的清单以及控制器写入的标签和注解，远端写入的其他字段不参与比较。
pub fn work_is_current(existing: &ManifestWork, desired: &ManifestWork) -> bool {
    let manifests_match = existing.spec.workload.manifests.len() == 1
        && match (existing.first_manifest(), desired.first_manifest()) {
            (Some(have), Some(want)) => canonicalize(have) == *want,
            _ => false,
        };

    manifests_match
        && contains_all(&existing.metadata.labels, &desired.metadata.labels)
        && contains_all(&existing.metadata.annotations, &desired.metadata.annotations)
}

/// 将已存在对象更新为期望内容，保留身份与 resourceVersion
pub fn merge_into_existing(existing: &ManifestWork, desired: &ManifestWork) -> ManifestWork {
    let mut updated = existing.clone();
    updated.spec = desired.spec.clone();

    let labels = updated.metadata.labels.get_or_insert_with(BTreeMap::new);
    labels.extend(desired.metadata.labels.clone().unwrap_or_default());

    let annotations = updated.metadata.annotations.get_or_insert_with(BTreeMap::new);
    annotations.extend(desired.metadata.annotations.clone().unwrap_or_default());

    updated
}

fn contains_all(
    have: &Option<BTreeMap<String, String>>,
    want: &Option<BTreeMap<String, String>>,
) -> bool {
    let Some(want) = want else {
        return true;
    };
    let empty = BTreeMap::new();
    let have = have.as_ref().unwrap_or(&empty);
    want.iter().all(|(key, value)| have.get(key) == Some(value))
}

/// 递归按键排序
///
/// 默认的 serde_json Map 已按键有序；依赖图中任一 crate 启用 `preserve_order`
/// 后会变为插入顺序，这里保证两种情况下输出一致。
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
