use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use fintechos_core::deal::entity::Deal;
use fintechos_core::ledger::entity::{
    AllocationCommand, AllocationReceipt, Investment, InvestmentStatus, LedgerAction, LedgerEntry,
    TopUpReceipt,
};
use fintechos_core::ledger::port::{LedgerError, LedgerStore};
use fintechos_core::user::entity::User;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// # Summary
/// 纯内存的账本实现，用于单元测试与演示环境。
///
/// # Logic
/// 用户与项目各自放在 `DashMap` 中，每条记录再包一层 `RwLock` 做单体一致性保护。
/// 写操作固定按 "用户 -> 项目 -> 投资列表 -> 流水" 的顺序加锁，避免死锁。
///
/// # Invariants
/// - 同一投资人的注资/退款互斥，同一项目的额度检查与扣减互斥。
pub struct MemoryLedgerStore {
    users: DashMap<String, Arc<RwLock<User>>>,
    deals: DashMap<String, Arc<RwLock<Deal>>>,
    investments: RwLock<Vec<Investment>>,
    entries: RwLock<Vec<LedgerEntry>>,
    next_entry_id: AtomicI64,
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            deals: DashMap::new(),
            investments: RwLock::new(Vec::new()),
            entries: RwLock::new(Vec::new()),
            next_entry_id: AtomicI64::new(1),
        }
    }

    /// 载入或覆盖一个用户
    pub fn insert_user(&self, user: User) {
        self.users
            .insert(user.id.clone(), Arc::new(RwLock::new(user)));
    }

    /// 载入或覆盖一个项目
    pub fn insert_deal(&self, deal: Deal) {
        self.deals
            .insert(deal.id.clone(), Arc::new(RwLock::new(deal)));
    }

    /// 用户当前状态的副本
    pub async fn user(&self, id: &str) -> Option<User> {
        let lock = self.users.get(id).map(|kv| kv.value().clone())?;
        let user = lock.read().await;
        Some(user.clone())
    }

    /// 项目当前状态的副本
    pub async fn deal(&self, id: &str) -> Option<Deal> {
        let lock = self.deals.get(id).map(|kv| kv.value().clone())?;
        let deal = lock.read().await;
        Some(deal.clone())
    }

    // DashMap 的分片锁不能跨 await 持有，先克隆出 Arc
    fn user_lock(&self, id: &str) -> Result<Arc<RwLock<User>>, LedgerError> {
        self.users
            .get(id)
            .map(|kv| kv.value().clone())
            .ok_or_else(|| LedgerError::UserNotFound(id.to_string()))
    }

    fn deal_lock(&self, id: &str) -> Result<Arc<RwLock<Deal>>, LedgerError> {
        self.deals
            .get(id)
            .map(|kv| kv.value().clone())
            .ok_or_else(|| LedgerError::DealNotFound(id.to_string()))
    }

    async fn append_entry(&self, mut entry: LedgerEntry) -> LedgerEntry {
        entry.id = self.next_entry_id.fetch_add(1, Ordering::SeqCst);
        self.entries.write().await.push(entry.clone());
        entry
    }

    fn newest_first(mut items: Vec<Investment>) -> Vec<Investment> {
        items.reverse();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        items
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn allocate(&self, cmd: &AllocationCommand) -> Result<AllocationReceipt, LedgerError> {
        if cmd.amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(
                "Please enter a valid amount to allocate.".into(),
            ));
        }
        let user_lock = self.user_lock(&cmd.investor_id)?;
        let mut investor = user_lock.write().await;

        if let Some(key) = &cmd.idempotency_key {
            let existing = self
                .investments
                .read()
                .await
                .iter()
                .find(|i| {
                    i.investor_id == cmd.investor_id && i.idempotency_key.as_deref() == Some(key)
                })
                .cloned();
            if let Some(investment) = existing {
                if investment.deal_id != cmd.deal_id || investment.amount != cmd.amount {
                    warn!("幂等键冲突: investor={} key={}", cmd.investor_id, key);
                    return Err(LedgerError::IdempotencyConflict);
                }
                let deal = self.deal_lock(&investment.deal_id)?.read().await.clone();
                return Ok(AllocationReceipt {
                    investment,
                    investor: investor.clone(),
                    deal,
                    replayed: true,
                });
            }
        }

        if !investor.is_investor() {
            return Err(LedgerError::NotInvestor);
        }
        let deal_lock = self.deal_lock(&cmd.deal_id)?;
        let mut deal = deal_lock.write().await;
        if !deal.accepts_allocations() {
            return Err(LedgerError::DealNotOpen);
        }
        let remaining = deal.remaining_capacity();
        if cmd.amount > remaining {
            return Err(LedgerError::CapacityExceeded {
                requested: cmd.amount,
                remaining,
            });
        }
        if investor.balance < cmd.amount {
            return Err(LedgerError::InsufficientFunds {
                required: cmd.amount,
                actual: investor.balance,
            });
        }

        investor.balance -= cmd.amount;
        investor.updated_at = cmd.now;
        deal.utilized_amount += cmd.amount;
        deal.status = Deal::status_for(deal.status, deal.facility_size, deal.utilized_amount);
        deal.updated_at = cmd.now;

        let investment = Investment {
            id: cmd.investment_id.clone(),
            investor_id: cmd.investor_id.clone(),
            deal_id: cmd.deal_id.clone(),
            amount: cmd.amount,
            status: InvestmentStatus::Completed,
            idempotency_key: cmd.idempotency_key.clone(),
            created_at: cmd.now,
            updated_at: cmd.now,
        };
        self.investments.write().await.push(investment.clone());
        self.append_entry(LedgerEntry {
            id: 0,
            user_id: investor.id.clone(),
            deal_id: Some(deal.id.clone()),
            investment_id: Some(investment.id.clone()),
            action: LedgerAction::Allocation,
            balance_change: -cmd.amount,
            capacity_change: cmd.amount,
            balance_after: investor.balance,
            created_at: cmd.now,
        })
        .await;

        info!("注资成功: investor={} deal={} amount={}", investor.id, deal.id, cmd.amount);
        Ok(AllocationReceipt {
            investment,
            investor: investor.clone(),
            deal: deal.clone(),
            replayed: false,
        })
    }

    async fn refund(
        &self,
        investment_id: &str,
        investor_id: &str,
        now: DateTime<Utc>,
    ) -> Result<AllocationReceipt, LedgerError> {
        let user_lock = self.user_lock(investor_id)?;
        let mut investor = user_lock.write().await;

        let found = self
            .investments
            .read()
            .await
            .iter()
            .find(|i| i.id == investment_id)
            .cloned()
            .ok_or_else(|| LedgerError::InvestmentNotFound(investment_id.to_string()))?;
        if found.investor_id != investor_id {
            return Err(LedgerError::NotOwner);
        }
        if found.status != InvestmentStatus::Completed {
            return Err(LedgerError::InvalidInvestmentStatus);
        }

        let deal_lock = self.deal_lock(&found.deal_id)?;
        let mut deal = deal_lock.write().await;

        investor.balance += found.amount;
        investor.updated_at = now;
        deal.utilized_amount = (deal.utilized_amount - found.amount).max(Decimal::ZERO);
        deal.status = Deal::status_for(deal.status, deal.facility_size, deal.utilized_amount);
        deal.updated_at = now;

        let mut investment = found;
        investment.status = InvestmentStatus::Refunded;
        investment.updated_at = now;
        {
            let mut all = self.investments.write().await;
            if let Some(slot) = all.iter_mut().find(|i| i.id == investment.id) {
                *slot = investment.clone();
            }
        }
        self.append_entry(LedgerEntry {
            id: 0,
            user_id: investor.id.clone(),
            deal_id: Some(deal.id.clone()),
            investment_id: Some(investment.id.clone()),
            action: LedgerAction::Refund,
            balance_change: investment.amount,
            capacity_change: -investment.amount,
            balance_after: investor.balance,
            created_at: now,
        })
        .await;

        Ok(AllocationReceipt {
            investment,
            investor: investor.clone(),
            deal: deal.clone(),
            replayed: false,
        })
    }

    async fn top_up(
        &self,
        user_id: &str,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<TopUpReceipt, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(
                "Please enter a valid amount to add.".into(),
            ));
        }
        let user_lock = self.user_lock(user_id)?;
        let mut user = user_lock.write().await;
        user.balance += amount;
        user.updated_at = now;

        let entry = self
            .append_entry(LedgerEntry {
                id: 0,
                user_id: user.id.clone(),
                deal_id: None,
                investment_id: None,
                action: LedgerAction::TopUp,
                balance_change: amount,
                capacity_change: Decimal::ZERO,
                balance_after: user.balance,
                created_at: now,
            })
            .await;
        Ok(TopUpReceipt {
            user: user.clone(),
            entry,
        })
    }

    async fn investments_by_investor(
        &self,
        investor_id: &str,
    ) -> Result<Vec<Investment>, LedgerError> {
        let all = self.investments.read().await;
        Ok(Self::newest_first(
            all.iter()
                .filter(|i| i.investor_id == investor_id)
                .cloned()
                .collect(),
        ))
    }

    async fn investments_by_deal(&self, deal_id: &str) -> Result<Vec<Investment>, LedgerError> {
        let all = self.investments.read().await;
        Ok(Self::newest_first(
            all.iter().filter(|i| i.deal_id == deal_id).cloned().collect(),
        ))
    }

    async fn all_investments(&self) -> Result<Vec<Investment>, LedgerError> {
        let all = self.investments.read().await;
        Ok(Self::newest_first(all.clone()))
    }

    async fn entries_for_user(&self, user_id: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }
}
