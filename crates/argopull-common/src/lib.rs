//! ArgoPull Common - 跨模块共享工具与数据结构
//!
//! 该模块提供 ArgoPull 项目中所有组件共享的数据结构、错误处理和纯函数逻辑。
//! 包括 Application 文档模型、集群记录、ManifestWork 资源类型，
//! 以及命名函数、资格判定和载荷构建。

pub mod constants;
pub mod eligibility;
pub mod error;
pub mod models;
pub mod naming;
pub mod payload;

/// 重新导出常用类型，方便使用
pub use eligibility::{evaluate, Eligibility, Exclusion};
pub use error::{Error, ErrorKind, Result};
pub use models::application::Application;
pub use models::cluster::{ClusterRecord, KnownClusters};
pub use models::work::{Manifest, ManifestWork, ManifestWorkSpec, ManifestsTemplate};
pub use naming::manifest_work_name;
pub use payload::Payload;
