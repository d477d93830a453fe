//! 错误处理模块
//!
//! 该模块提供 ArgoPull 项目的统一错误处理机制，包括自定义错误类型
//! 以及供控制器决定重试节奏的错误分类。

use thiserror::Error;

/// ArgoPull 统一错误类型
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API 错误
    #[error("Kubernetes API 错误: {0}")]
    Kube(#[source] kube::Error),

    /// 乐观并发冲突，写入所基于的 resourceVersion 已过期
    #[error("写入冲突: {0}")]
    Conflict(String),

    /// Application 文档格式错误
    #[error("Application 格式错误: {0}")]
    MalformedApplication(String),

    /// 对象缺少必要字段
    #[error("对象无效: {0}")]
    InvalidObject(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 序列化/反序列化错误
    #[error("序列化/反序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// ArgoPull 结果类型别名
pub type Result<T> = std::result::Result<T, Error>;

/// 错误分类，决定重试退避的起点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 并发写入冲突，重新读取后应很快成功
    Conflict,
    /// 存储暂时不可用
    Transient,
    /// 在对象被再次编辑之前不会自行恢复
    Permanent,
}

impl From<kube::Error> for Error {
    fn from(err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(resp) if resp.code == 409 => Error::Conflict(resp.message.clone()),
            _ => Error::Kube(err),
        }
    }
}

impl Error {
    /// 错误分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Kube(kube::Error::Api(resp)) if matches!(resp.code, 400 | 403 | 422) => {
                ErrorKind::Permanent
            }
            Error::Kube(_) => ErrorKind::Transient,
            Error::MalformedApplication(_)
            | Error::InvalidObject(_)
            | Error::Config(_)
            | Error::Serialization(_) => {
                ErrorKind::Permanent
            }
        }
    }

    /// 是否为写入冲突
    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}
