use super::entity::{
    AllocationCommand, AllocationReceipt, Investment, LedgerEntry, TopUpReceipt,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::common::format_usd;

/// # Summary
/// 注资与额度记账过程中可能发生的错误。
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("{0}")]
    InvalidAmount(String),
    #[error("User not found: {0}")]
    UserNotFound(String),
    #[error("Deal not found")]
    DealNotFound(String),
    #[error("Investment not found")]
    InvestmentNotFound(String),
    #[error("Only investor accounts can allocate funds")]
    NotInvestor,
    #[error("Deal is not open for allocations")]
    DealNotOpen,
    #[error("Amount exceeds remaining capacity of {}.", usd(.remaining))]
    CapacityExceeded {
        requested: Decimal,
        remaining: Decimal,
    },
    #[error("Insufficient balance. Required: {}, available: {}", usd(.required), usd(.actual))]
    InsufficientFunds { required: Decimal, actual: Decimal },
    #[error("Investment does not belong to the current user")]
    NotOwner,
    #[error("Investment status does not allow this operation")]
    InvalidInvestmentStatus,
    #[error("Idempotency key was already used for a different allocation")]
    IdempotencyConflict,
    #[error("{0}")]
    InvalidIdempotencyKey(String),
    #[error("内部系统错误: {0}")]
    InternalError(String),
}

fn usd(amount: &Decimal) -> String {
    format_usd(*amount)
}

/// # Summary
/// 账本持久化端口：余额、项目额度、投资记录与流水的原子读写。
///
/// # Invariants
/// - 每个写操作必须在单个事务/临界区内完成"检查 + 修改 + 记流水"，
///   任何失败都不得留下部分写入。
/// - 任意时刻 `utilized_amount <= facility_size` 且用户余额非负。
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// 原子执行一次注资
    ///
    /// # Logic
    /// 1. 若带幂等键且已存在记录：载荷一致时返回原结果 (`replayed = true`)，否则 `IdempotencyConflict`。
    /// 2. 校验投资人存在且为 Investor、项目存在且 `Open`。
    /// 3. 校验金额不超过剩余额度与投资人余额。
    /// 4. 扣减余额、增加已用额度 (满额转 `Funded`)、写入投资记录、流水与幂等键。
    async fn allocate(&self, cmd: &AllocationCommand) -> Result<AllocationReceipt, LedgerError>;

    /// 原子退回一笔 `Completed` 状态的投资
    async fn refund(
        &self,
        investment_id: &str,
        investor_id: &str,
        now: DateTime<Utc>,
    ) -> Result<AllocationReceipt, LedgerError>;

    /// 为用户充值
    async fn top_up(
        &self,
        user_id: &str,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<TopUpReceipt, LedgerError>;

    /// 按创建时间倒序列出投资人的全部投资
    async fn investments_by_investor(&self, investor_id: &str) -> Result<Vec<Investment>, LedgerError>;

    /// 按创建时间倒序列出项目收到的全部投资
    async fn investments_by_deal(&self, deal_id: &str) -> Result<Vec<Investment>, LedgerError>;

    /// 全平台投资记录 (统计用)
    async fn all_investments(&self) -> Result<Vec<Investment>, LedgerError>;

    /// 按时间倒序列出用户的流水
    async fn entries_for_user(&self, user_id: &str) -> Result<Vec<LedgerEntry>, LedgerError>;
}

/// # Summary
/// 注资业务门面。API 层只依赖此端口，
/// 由实现负责金额护栏、幂等键规范化等业务规则后再委托给 `LedgerStore`。
#[async_trait]
pub trait AllocationPort: Send + Sync {
    /// 投资人向项目注资
    ///
    /// # Arguments
    /// * `investor_id` - 发起注资的用户
    /// * `deal_id` - 目标项目
    /// * `amount` - 原始金额，未经校验
    /// * `idempotency_key` - 客户端提供的幂等键
    async fn allocate(
        &self,
        investor_id: &str,
        deal_id: &str,
        amount: Decimal,
        idempotency_key: Option<&str>,
    ) -> Result<AllocationReceipt, LedgerError>;

    /// 投资人撤回一笔投资
    async fn refund(&self, investor_id: &str, investment_id: &str) -> Result<AllocationReceipt, LedgerError>;

    /// 余额充值
    async fn top_up(&self, user_id: &str, amount: Decimal) -> Result<TopUpReceipt, LedgerError>;

    async fn investments_by_investor(&self, investor_id: &str) -> Result<Vec<Investment>, LedgerError>;

    async fn investments_by_deal(&self, deal_id: &str) -> Result<Vec<Investment>, LedgerError>;

    async fn all_investments(&self) -> Result<Vec<Investment>, LedgerError>;

    async fn ledger_entries(&self, user_id: &str) -> Result<Vec<LedgerEntry>, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_capacity_message_matches_client_wording() {
        let err = LedgerError::CapacityExceeded {
            requested: dec!(9000),
            remaining: dec!(7500),
        };
        assert_eq!(err.to_string(), "Amount exceeds remaining capacity of $7,500.00.");
    }
}
