//! 集成测试使用的内存存储
//!
//! 模拟 API Server 的关键语义：resourceVersion 乐观并发、终结器阻止删除、
//! 删除不存在的对象成功。所有由协调器发起的写入都会被计数。
//! ManifestWork 缓存可以被设置为滞后，此时缓存查询看不到任何对象。

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::core::ErrorResponse;
use kube::ResourceExt;

use argopull_common::constants::LABEL_KEY_HUB_APPLICATION_UID;
use argopull_common::{Application, ClusterRecord, Error, KnownClusters, ManifestWork, Result};
use argopull_operator::reconcile::{ReconcileOptions, ReconcileOutcome, Reconciler};
use argopull_operator::store::Store;

type Key = (String, String);

const MAX_ROUNDS: usize = 10;

#[derive(Default)]
struct State {
    applications: BTreeMap<Key, Application>,
    clusters: KnownClusters,
    works: BTreeMap<Key, ManifestWork>,
    version: u64,
    writes: usize,
    pending_conflicts: u32,
    created: Vec<Key>,
    cache_lagging: bool,
}

impl State {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }
}

#[derive(Default)]
pub struct FakeStore {
    state: Mutex<State>,
}

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

fn api_error(code: u16, reason: &str) -> Error {
    Error::from(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: reason.to_string(),
        reason: reason.to_string(),
        code,
    }))
}

impl FakeStore {
    pub fn with_clusters(clusters: KnownClusters) -> Arc<Self> {
        let store = Self::default();
        store.state.lock().unwrap().clusters = clusters;
        Arc::new(store)
    }

    /// 默认集群注册表：两个普通集群与一个本地集群
    pub fn fleet() -> Arc<Self> {
        Self::with_clusters(
            [
                ClusterRecord::new("cluster1"),
                ClusterRecord::new("cluster2"),
                ClusterRecord::local("local-cluster"),
            ]
            .into_iter()
            .collect(),
        )
    }

    /// 模拟用户创建 Application
    pub fn create_application(&self, mut app: Application) -> Application {
        let mut state = self.state.lock().unwrap();
        let version = state.next_version();
        if app.uid().is_none() {
            app.meta_mut().uid = Some(format!("{:0>8}-0000-4000-8000-000000000000", version));
        }
        app.meta_mut().resource_version = Some(version);
        let namespace = app.namespace().unwrap_or_default();
        state
            .applications
            .insert(key(&namespace, &app.name()), app.clone());
        app
    }

    /// 模拟用户编辑 Application
    pub fn edit_application(&self, namespace: &str, name: &str, edit: impl FnOnce(&mut Application)) {
        let mut state = self.state.lock().unwrap();
        let version = state.next_version();
        let app = state
            .applications
            .get_mut(&key(namespace, name))
            .expect("Application 不存在");
        edit(app);
        app.meta_mut().resource_version = Some(version);
    }

    /// 模拟用户删除 Application，存在终结器时只设置删除标记
    pub fn delete_application(&self, namespace: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        let version = state.next_version();
        let k = key(namespace, name);
        let Some(finalized) = state
            .applications
            .get(&k)
            .map(|app| app.meta().finalizers.as_ref().map_or(false, |f| !f.is_empty()))
        else {
            return;
        };
        if !finalized {
            state.applications.remove(&k);
        } else if let Some(app) = state.applications.get_mut(&k) {
            app.meta_mut().deletion_timestamp = Some(Time(chrono::Utc::now()));
            app.meta_mut().resource_version = Some(version);
        }
    }

    pub fn register_cluster(&self, record: ClusterRecord) {
        self.state.lock().unwrap().clusters.insert(record);
    }

    /// 模拟 ManifestWork 缓存尚未同步
    pub fn set_cache_lag(&self, lagging: bool) {
        self.state.lock().unwrap().cache_lagging = lagging;
    }

    fn owned_works(&self, app_uid: &str) -> Vec<ManifestWork> {
        self.works()
            .into_iter()
            .filter(|work| work.labels().get(LABEL_KEY_HUB_APPLICATION_UID).map(String::as_str) == Some(app_uid))
            .collect()
    }

    pub fn inject_conflicts(&self, count: u32) {
        self.state.lock().unwrap().pending_conflicts = count;
    }

    pub fn application(&self, namespace: &str, name: &str) -> Option<Application> {
        self.state
            .lock()
            .unwrap()
            .applications
            .get(&key(namespace, name))
            .cloned()
    }

    pub fn work(&self, namespace: &str, name: &str) -> Option<ManifestWork> {
        self.state
            .lock()
            .unwrap()
            .works
            .get(&key(namespace, name))
            .cloned()
    }

    pub fn works(&self) -> Vec<ManifestWork> {
        self.state.lock().unwrap().works.values().cloned().collect()
    }

    /// 曾经创建过的全部 ManifestWork
    pub fn ever_created(&self) -> Vec<Key> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn writes(&self) -> usize {
        self.state.lock().unwrap().writes
    }
}

#[async_trait]
impl Store for FakeStore {
    async fn get_application(&self, namespace: &str, name: &str) -> Result<Option<Application>> {
        Ok(self.application(namespace, name))
    }

    async fn update_application(&self, app: &Application) -> Result<Application> {
        let mut state = self.state.lock().unwrap();
        if state.pending_conflicts > 0 {
            state.pending_conflicts -= 1;
            return Err(api_error(409, "Conflict"));
        }

        let k = key(&app.namespace().unwrap_or_default(), &app.name());
        let Some(stored) = state.applications.get(&k) else {
            return Err(api_error(404, "NotFound"));
        };
        if stored.resource_version() != app.resource_version() {
            return Err(api_error(409, "Conflict"));
        }

        let deletion_timestamp = stored.meta().deletion_timestamp.clone();
        let mut updated = app.clone();
        updated.meta_mut().deletion_timestamp = deletion_timestamp;
        updated.meta_mut().resource_version = Some(state.next_version());
        state.writes += 1;

        let released = updated.meta().finalizers.as_ref().map_or(true, Vec::is_empty);
        if updated.is_terminating() && released {
            state.applications.remove(&k);
        } else {
            state.applications.insert(k, updated.clone());
        }
        Ok(updated)
    }

    async fn list_clusters(&self) -> Result<KnownClusters> {
        Ok(self.state.lock().unwrap().clusters.clone())
    }

    async fn get_work(&self, namespace: &str, name: &str) -> Result<Option<ManifestWork>> {
        Ok(self.work(namespace, name))
    }

    async fn cached_works(&self, app_uid: &str) -> Result<Vec<ManifestWork>> {
        if self.state.lock().unwrap().cache_lagging {
            return Ok(Vec::new());
        }
        Ok(self.owned_works(app_uid))
    }

    async fn list_works(&self, app_uid: &str) -> Result<Vec<ManifestWork>> {
        Ok(self.owned_works(app_uid))
    }

    async fn create_work(&self, work: &ManifestWork) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let k = key(&work.namespace().unwrap_or_default(), &work.name_any());
        if state.works.contains_key(&k) {
            return Err(api_error(409, "AlreadyExists"));
        }
        let mut created = work.clone();
        created.metadata.resource_version = Some(state.next_version());
        state.works.insert(k.clone(), created);
        state.created.push(k);
        state.writes += 1;
        Ok(())
    }

    async fn replace_work(&self, work: &ManifestWork) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let k = key(&work.namespace().unwrap_or_default(), &work.name_any());
        let Some(stored) = state.works.get(&k) else {
            return Err(api_error(404, "NotFound"));
        };
        if stored.metadata.resource_version != work.metadata.resource_version {
            return Err(api_error(409, "Conflict"));
        }
        let mut replaced = work.clone();
        replaced.metadata.resource_version = Some(state.next_version());
        state.works.insert(k, replaced);
        state.writes += 1;
        Ok(())
    }

    async fn delete_work(&self, namespace: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.works.remove(&key(namespace, name)).is_some() {
            state.writes += 1;
        }
        Ok(())
    }
}

pub fn reconciler(store: Arc<FakeStore>) -> Reconciler {
    Reconciler::new(store, ReconcileOptions::default())
}

/// 反复协调直到收敛，冲突与重新入队都视为需要再来一轮
pub async fn converge(reconciler: &Reconciler, namespace: &str, name: &str) -> usize {
    for round in 1..=MAX_ROUNDS {
        match reconciler.reconcile(namespace, name).await {
            Ok(ReconcileOutcome::Done) => return round,
            Ok(ReconcileOutcome::RequeueAfter(_)) => continue,
            Err(e) if e.is_conflict() => continue,
            Err(e) => panic!("协调失败: {e}"),
        }
    }
    panic!("{namespace}/{name} 在 {MAX_ROUNDS} 轮内未收敛");
}
