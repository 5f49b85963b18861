use thiserror::Error;

/// # Summary
/// 存储层错误枚举，处理数据库连接、读写失败、唯一约束冲突等问题。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
#[derive(Error, Debug)]
pub enum StoreError {
    /// 数据库操作失败
    #[error("Database error: {0}")]
    Database(String),
    /// 记录未找到
    #[error("Not found")]
    NotFound,
    /// 唯一约束冲突 (如邮箱已注册)
    #[error("Conflict: {0}")]
    Conflict(String),
    /// 存储数据无法解析为领域类型
    #[error("Corrupted record: {0}")]
    Corrupted(String),
    /// 初始化存储失败
    #[error("Initialization error: {0}")]
    InitError(String),
}
