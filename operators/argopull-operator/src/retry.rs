//! 重试退避模块
//!
//! 协调失败后不在协调函数内部重试，而是按 Application UID 记录连续失败次数，
//! 由控制器的 error_policy 计算下一次重新入队的延迟。成功协调后计数清零。

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use argopull_common::ErrorKind;

/// 退避上限
pub const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// 按错误类型计算退避时长
///
/// 冲突从 1 秒起、暂时性错误从 5 秒起指数增长，永久性错误直接使用上限。
pub fn compute_backoff(attempt: u32, kind: ErrorKind) -> Duration {
    let base = match kind {
        ErrorKind::Conflict => Duration::from_secs(1),
        ErrorKind::Transient => Duration::from_secs(5),
        ErrorKind::Permanent => return MAX_BACKOFF,
    };
    let exponent = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exponent).min(MAX_BACKOFF)
}

/// 连续失败次数记录
///
/// error_policy 是同步函数，因此使用 std::sync::Mutex。
#[derive(Debug, Default)]
pub struct RetryTracker {
    attempts: Mutex<HashMap<String, u32>>,
}

impl RetryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次失败，返回当前连续失败次数
    pub fn increment(&self, key: &str) -> u32 {
        let mut attempts = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);
        let counter = attempts.entry(key.to_string()).or_insert(0);
        *counter = counter.saturating_add(1);
        *counter
    }

    pub fn reset(&self, key: &str) {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    pub fn attempts(&self, key: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
            .unwrap_or(0)
    }
}
