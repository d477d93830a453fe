//! 工作对象命名

/// 取用 UID 的前缀长度
pub const UID_PREFIX_LEN: usize = 5;

/// Kubernetes 对象名称长度上限
const MAX_NAME_LEN: usize = 253;

/// 由 Application 名称和 UID 推导 ManifestWork 名称
///
/// 结果为 `<名称>-<UID 前 5 个字符>`。同名对象删除后重建时 UID 不同，
/// 推导出的名称随之不同。名称部分在必要时截断，UID 部分从不截断。
pub fn manifest_work_name(app_name: &str, app_uid: &str) -> String {
    let suffix: String = app_uid.chars().take(UID_PREFIX_LEN).collect();
    let budget = MAX_NAME_LEN - suffix.len() - 1;
    let prefix: String = app_name.chars().take(budget).collect();
    format!("{prefix}-{suffix}")
}
