//! 数据模型模块
//!
//! 该模块定义了 ArgoPull 项目中使用的核心数据模型，包括开放结构的 Application 文档、
//! 集群注册表记录和 ManifestWork 工作对象。

pub mod application;
pub mod cluster;
pub mod work;
