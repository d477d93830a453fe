//! Application 文档模型
//!
//! Application 由外部拥有且结构开放，这里不定义固定的 Rust 结构体，
//! 而是包装 `DynamicObject`，只为已知路径（标签、注解、spec、operation、终结器）
//! 提供类型化访问器，其余字段原样保留，写回时不会丢失。

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind};
use kube::ResourceExt;
use serde_json::{Map, Value};

use crate::constants::{
    ANNOTATION_KEY_MANAGED_CLUSTER, ANNOTATION_KEY_MANAGED_CLUSTER_APP_NAMESPACE,
    APPLICATION_GROUP, APPLICATION_KIND, APPLICATION_PLURAL, APPLICATION_VERSION, FINALIZER_NAME,
    LABEL_KEY_PULL, OPERATION_FIELD,
};

/// Argo CD Application 文档
#[derive(Debug, Clone)]
pub struct Application {
    inner: DynamicObject,
}

impl Application {
    /// Application 的 API 资源描述
    pub fn api_resource() -> ApiResource {
        let gvk = GroupVersionKind::gvk(APPLICATION_GROUP, APPLICATION_VERSION, APPLICATION_KIND);
        ApiResource::from_gvk_with_plural(&gvk, APPLICATION_PLURAL)
    }

    /// 创建一个空的 Application 文档
    pub fn new(name: &str, namespace: &str) -> Self {
        let mut inner = DynamicObject::new(name, &Self::api_resource()).within(namespace);
        inner.data = Value::Object(Map::new());
        Self { inner }
    }

    pub fn as_dynamic(&self) -> &DynamicObject {
        &self.inner
    }

    pub fn into_dynamic(self) -> DynamicObject {
        self.inner
    }

    pub fn meta(&self) -> &ObjectMeta {
        &self.inner.metadata
    }

    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.inner.metadata
    }

    pub fn name(&self) -> String {
        self.inner.name_any()
    }

    pub fn namespace(&self) -> Option<String> {
        self.inner.namespace()
    }

    pub fn uid(&self) -> Option<&str> {
        self.inner.metadata.uid.as_deref()
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.inner.metadata.resource_version.as_deref()
    }

    /// 是否已设置删除标记
    pub fn is_terminating(&self) -> bool {
        self.inner.metadata.deletion_timestamp.is_some()
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.inner
            .metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(key))
            .map(String::as_str)
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.inner
            .metadata
            .annotations
            .as_ref()
            .and_then(|annotations| annotations.get(key))
            .map(String::as_str)
    }

    pub fn set_label(&mut self, key: &str, value: &str) {
        self.inner.labels_mut().insert(key.to_string(), value.to_string());
    }

    pub fn remove_label(&mut self, key: &str) {
        self.inner.labels_mut().remove(key);
    }

    pub fn set_annotation(&mut self, key: &str, value: &str) {
        self.inner
            .annotations_mut()
            .insert(key.to_string(), value.to_string());
    }

    /// 是否带有值为真的拉取标签
    pub fn pull_enabled(&self) -> bool {
        self.label(LABEL_KEY_PULL)
            .and_then(parse_bool)
            .unwrap_or(false)
    }

    /// 目标集群注解，空值视为未设置，其余取值原样返回
    pub fn target_cluster(&self) -> Option<&str> {
        self.annotation(ANNOTATION_KEY_MANAGED_CLUSTER)
            .filter(|value| !value.is_empty())
    }

    /// 远端 Application 所在命名空间
    pub fn remote_namespace(&self) -> Option<String> {
        self.annotation(ANNOTATION_KEY_MANAGED_CLUSTER_APP_NAMESPACE)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .or_else(|| self.namespace())
    }

    pub fn spec(&self) -> Option<&Value> {
        self.inner.data.get("spec")
    }

    pub fn set_spec(&mut self, spec: Value) {
        self.insert_data("spec", spec);
    }

    /// 一次性命令字段，null 视为不存在
    pub fn operation(&self) -> Option<&Value> {
        self.inner
            .data
            .get(OPERATION_FIELD)
            .filter(|value| !value.is_null())
    }

    pub fn has_operation(&self) -> bool {
        self.operation().is_some()
    }

    pub fn set_operation(&mut self, operation: Value) {
        self.insert_data(OPERATION_FIELD, operation);
    }

    /// 清除命令字段，返回是否发生了修改
    pub fn clear_operation(&mut self) -> bool {
        match self.inner.data.as_object_mut() {
            Some(data) => data.remove(OPERATION_FIELD).is_some(),
            None => false,
        }
    }

    pub fn has_finalizer(&self) -> bool {
        self.inner.finalizers().iter().any(|f| f == FINALIZER_NAME)
    }

    /// 添加控制器终结器，返回是否发生了修改
    pub fn add_finalizer(&mut self) -> bool {
        if self.has_finalizer() {
            return false;
        }
        self.inner.finalizers_mut().push(FINALIZER_NAME.to_string());
        true
    }

    /// 移除控制器终结器，其他终结器保持不变
    pub fn remove_finalizer(&mut self) -> bool {
        let finalizers = self.inner.finalizers_mut();
        let before = finalizers.len();
        finalizers.retain(|f| f != FINALIZER_NAME);
        finalizers.len() != before
    }

    fn insert_data(&mut self, key: &str, value: Value) {
        match &mut self.inner.data {
            Value::Object(data) => {
                data.insert(key.to_string(), value);
            }
            other => {
                let mut data = Map::new();
                data.insert(key.to_string(), value);
                *other = Value::Object(data);
            }
        }
    }
}

impl From<DynamicObject> for Application {
    fn from(mut inner: DynamicObject) -> Self {
        if inner.data.is_null() {
            inner.data = Value::Object(Map::new());
        }
        Self { inner }
    }
}

/// 按 Go `strconv.ParseBool` 的规则解析布尔字符串
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("true", true)]
    #[case("True", true)]
    #[case("1", true)]
    #[case("false", false)]
    #[case("yes", false)]
    #[case("", false)]
    fn test_pull_label_parsing(#[case] value: &str, #[case] expected: bool) {
        let mut app = Application::new("app-1", "default");
        app.set_label(LABEL_KEY_PULL, value);
        assert_eq!(app.pull_enabled(), expected);
    }

    #[test]
    fn test_target_cluster_ignores_empty_annotation() {
        let mut app = Application::new("app-1", "default");
        assert_eq!(app.target_cluster(), None);

        app.set_annotation(ANNOTATION_KEY_MANAGED_CLUSTER, "");
        assert_eq!(app.target_cluster(), None);

        app.set_annotation(ANNOTATION_KEY_MANAGED_CLUSTER, " cluster1");
        assert_eq!(app.target_cluster(), Some(" cluster1"));

        app.set_annotation(ANNOTATION_KEY_MANAGED_CLUSTER, "cluster1");
        assert_eq!(app.target_cluster(), Some("cluster1"));
    }

    #[test]
    fn test_operation_drain() {
        let mut app = Application::new("app-1", "default");
        assert!(!app.clear_operation());

        app.set_operation(json!({"sync": {"syncOptions": ["CreateNamespace=true"]}}));
        assert!(app.has_operation());
        assert!(app.clear_operation());
        assert!(!app.has_operation());
        assert!(app.as_dynamic().data.get(OPERATION_FIELD).is_none());
    }

    #[test]
    fn test_finalizer_only_touches_own_entry() {
        let mut app = Application::new("app-1", "default");
        app.meta_mut().finalizers = Some(vec!["example.com/keep".into()]);

        assert!(app.add_finalizer());
        assert!(!app.add_finalizer());
        assert!(app.has_finalizer());
        assert_eq!(
            app.meta().finalizers.as_deref(),
            Some(&["example.com/keep".to_string(), FINALIZER_NAME.to_string()][..])
        );

        assert!(app.remove_finalizer());
        assert!(!app.remove_finalizer());
        assert_eq!(
            app.meta().finalizers.as_deref(),
            Some(&["example.com/keep".to_string()][..])
        );
    }

    #[test]
    fn test_argo_resources_finalizer_is_recognised() {
        let mut app = Application::new("app-2", "default");
        app.meta_mut().finalizers = Some(vec!["resources-finalizer.argocd.argoproj.io".into()]);

        assert!(app.has_finalizer());
        assert!(!app.add_finalizer());
        assert!(app.remove_finalizer());
        assert_eq!(app.meta().finalizers.as_deref(), Some(&[][..]));
    }

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let raw = json!({
            "apiVersion": "argoproj.io/v1alpha1",
            "kind": "Application",
            "metadata": {"name": "app-1", "namespace": "default", "uid": "abcde-123"},
            "spec": {"project": "default"},
            "status": {"health": {"status": "Healthy"}}
        });
        let obj: DynamicObject = serde_json::from_value(raw).unwrap();
        let mut app = Application::from(obj);
        app.set_label(LABEL_KEY_PULL, "true");

        let back = serde_json::to_value(app.as_dynamic()).unwrap();
        assert_eq!(back["status"]["health"]["status"], "Healthy");
        assert_eq!(back["spec"]["project"], "default");
        assert_eq!(app.uid(), Some("abcde-123"));
    }

    #[test]
    fn test_remote_namespace_override() {
        let mut app = Application::new("app-1", "default");
        assert_eq!(app.remote_namespace().as_deref(), Some("default"));

        app.set_annotation(ANNOTATION_KEY_MANAGED_CLUSTER_APP_NAMESPACE, "argocd");
        assert_eq!(app.remote_namespace().as_deref(), Some("argocd"));
    }
}
