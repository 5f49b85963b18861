use thiserror::Error;

/// # Summary
/// 统计计算错误。
#[derive(Error, Debug, PartialEq, Eq)]
pub enum StatsError {
    /// 金额汇总超出 `Decimal` 可表示范围
    #[error("Decimal overflow while summing {0}")]
    Overflow(&'static str),
}
