use async_trait::async_trait;
use fintechos_core::common::time::TimeProvider;
use fintechos_core::ledger::entity::{
    AllocationCommand, AllocationReceipt, AmountPurpose, Investment, LedgerEntry, TopUpReceipt,
    normalize_idempotency_key, validate_amount,
};
use fintechos_core::ledger::port::{AllocationPort, LedgerError, LedgerStore};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::warn;

/// # Summary
/// `AllocationService` 是注资业务的入口，实现 `AllocationPort`。
/// 它只做无状态的前置校验，所有依赖当前余额/额度的判断都交给 `LedgerStore` 在原子区内完成。
pub struct AllocationService {
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn TimeProvider>,
    /// 单笔金额护栏
    max_allocation: Decimal,
}

impl AllocationService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        clock: Arc<dyn TimeProvider>,
        max_allocation: Decimal,
    ) -> Self {
        Self {
            store,
            clock,
            max_allocation,
        }
    }

    fn checked_amount(
        &self,
        amount: Decimal,
        purpose: AmountPurpose,
    ) -> Result<Decimal, LedgerError> {
        validate_amount(amount, self.max_allocation, purpose).map_err(|v| {
            warn!("金额校验失败: {} ({})", amount, v);
            LedgerError::InvalidAmount(v.to_string())
        })
    }
}

#[async_trait]
impl AllocationPort for AllocationService {
    /// # Logic
    /// 1. 校验金额：正数、两位小数、不超过护栏。
    /// 2. 规范化幂等键。
    /// 3. 生成投资 ID 与时间戳，交给存储端原子执行。
    async fn allocate(
        &self,
        investor_id: &str,
        deal_id: &str,
        amount: Decimal,
        idempotency_key: Option<&str>,
    ) -> Result<AllocationReceipt, LedgerError> {
        let amount = self.checked_amount(amount, AmountPurpose::Allocation)?;
        let idempotency_key =
            normalize_idempotency_key(idempotency_key).map_err(LedgerError::InvalidIdempotencyKey)?;

        let cmd = AllocationCommand {
            investment_id: uuid::Uuid::new_v4().to_string(),
            investor_id: investor_id.to_string(),
            deal_id: deal_id.to_string(),
            amount,
            idempotency_key,
            now: self.clock.now(),
        };
        self.store.allocate(&cmd).await
    }

    async fn refund(
        &self,
        investor_id: &str,
        investment_id: &str,
    ) -> Result<AllocationReceipt, LedgerError> {
        self.store
            .refund(investment_id, investor_id, self.clock.now())
            .await
    }

    async fn top_up(&self, user_id: &str, amount: Decimal) -> Result<TopUpReceipt, LedgerError> {
        let amount = self.checked_amount(amount, AmountPurpose::TopUp)?;
        self.store.top_up(user_id, amount, self.clock.now()).await
    }

    async fn investments_by_investor(
        &self,
        investor_id: &str,
    ) -> Result<Vec<Investment>, LedgerError> {
        self.store.investments_by_investor(investor_id).await
    }

    async fn investments_by_deal(&self, deal_id: &str) -> Result<Vec<Investment>, LedgerError> {
        self.store.investments_by_deal(deal_id).await
    }

    async fn all_investments(&self) -> Result<Vec<Investment>, LedgerError> {
        self.store.all_investments().await
    }

    async fn ledger_entries(&self, user_id: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.store.entries_for_user(user_id).await
    }
}
