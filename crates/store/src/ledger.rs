use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fintechos_core::deal::entity::Deal;
use fintechos_core::ledger::entity::{
    AllocationCommand, AllocationReceipt, Investment, InvestmentStatus, LedgerAction, LedgerEntry,
    TopUpReceipt,
};
use fintechos_core::ledger::port::{LedgerError, LedgerStore};
use fintechos_core::store::error::StoreError;
use rust_decimal::Decimal;
use sqlx::{Row, SqliteConnection, SqlitePool, sqlite::SqliteRow};
use tracing::{info, warn};

use crate::database::{parse_decimal, parse_enum};
use crate::deal::fetch_deal;
use crate::user::fetch_user;

const INVESTMENT_COLUMNS: &str =
    "id, investor_id, deal_id, amount, status, idempotency_key, created_at, updated_at";

const SELECT_BY_INVESTOR: &str = "SELECT id, investor_id, deal_id, amount, status, idempotency_key, \
     created_at, updated_at FROM investments WHERE investor_id = ? ORDER BY created_at DESC, rowid DESC";

const SELECT_BY_DEAL: &str = "SELECT id, investor_id, deal_id, amount, status, idempotency_key, \
     created_at, updated_at FROM investments WHERE deal_id = ? ORDER BY created_at DESC, rowid DESC";

fn internal(e: impl std::fmt::Display) -> LedgerError {
    LedgerError::InternalError(e.to_string())
}

fn store_err(e: StoreError) -> LedgerError {
    LedgerError::InternalError(e.to_string())
}

fn investment_from_row(row: &SqliteRow) -> Result<Investment, LedgerError> {
    let amount: String = row.try_get("amount").map_err(internal)?;
    let status: String = row.try_get("status").map_err(internal)?;
    Ok(Investment {
        id: row.try_get("id").map_err(internal)?,
        investor_id: row.try_get("investor_id").map_err(internal)?,
        deal_id: row.try_get("deal_id").map_err(internal)?,
        amount: parse_decimal(&amount, "amount").map_err(store_err)?,
        status: parse_enum(&status).map_err(store_err)?,
        idempotency_key: row.try_get("idempotency_key").map_err(internal)?,
        created_at: row.try_get("created_at").map_err(internal)?,
        updated_at: row.try_get("updated_at").map_err(internal)?,
    })
}

fn entry_from_row(row: &SqliteRow) -> Result<LedgerEntry, LedgerError> {
    let action: String = row.try_get("action").map_err(internal)?;
    let balance_change: String = row.try_get("balance_change").map_err(internal)?;
    let capacity_change: String = row.try_get("capacity_change").map_err(internal)?;
    let balance_after: String = row.try_get("balance_after").map_err(internal)?;
    Ok(LedgerEntry {
        id: row.try_get("id").map_err(internal)?,
        user_id: row.try_get("user_id").map_err(internal)?,
        deal_id: row.try_get("deal_id").map_err(internal)?,
        investment_id: row.try_get("investment_id").map_err(internal)?,
        action: parse_enum(&action).map_err(store_err)?,
        balance_change: parse_decimal(&balance_change, "balance_change").map_err(store_err)?,
        capacity_change: parse_decimal(&capacity_change, "capacity_change").map_err(store_err)?,
        balance_after: parse_decimal(&balance_after, "balance_after").map_err(store_err)?,
        created_at: row.try_get("created_at").map_err(internal)?,
    })
}

/// 追加一条流水并返回带自增 ID 的完整记录
async fn append_entry(
    conn: &mut SqliteConnection,
    mut entry: LedgerEntry,
) -> Result<LedgerEntry, LedgerError> {
    let result = sqlx::query(
        r#"
        INSERT INTO ledger_entries
            (user_id, deal_id, investment_id, action, balance_change, capacity_change, balance_after, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&entry.user_id)
    .bind(&entry.deal_id)
    .bind(&entry.investment_id)
    .bind(entry.action.to_string())
    .bind(entry.balance_change.to_string())
    .bind(entry.capacity_change.to_string())
    .bind(entry.balance_after.to_string())
    .bind(entry.created_at)
    .execute(conn)
    .await
    .map_err(internal)?;
    entry.id = result.last_insert_rowid();
    Ok(entry)
}

async fn write_balance(
    conn: &mut SqliteConnection,
    user_id: &str,
    balance: Decimal,
    now: DateTime<Utc>,
) -> Result<(), LedgerError> {
    sqlx::query("UPDATE users SET balance = ?, updated_at = ? WHERE id = ?")
        .bind(balance.to_string())
        .bind(now)
        .bind(user_id)
        .execute(conn)
        .await
        .map_err(internal)?;
    Ok(())
}

async fn write_capacity(conn: &mut SqliteConnection, deal: &Deal) -> Result<(), LedgerError> {
    sqlx::query("UPDATE deals SET utilized_amount = ?, status = ?, updated_at = ? WHERE id = ?")
        .bind(deal.utilized_amount.to_string())
        .bind(deal.status.to_string())
        .bind(deal.updated_at)
        .bind(&deal.id)
        .execute(conn)
        .await
        .map_err(internal)?;
    Ok(())
}

/// # Summary
/// `LedgerStore` 的 SQLite 实现。
///
/// # Invariants
/// - 每个写操作都是一个事务：余额、项目额度、投资记录、流水要么全部提交，要么全部回滚。
/// - 连接池为单连接，"读取 + 校验 + 写入" 之间不会插入其它事务。
pub struct SqliteLedgerStore {
    pool: SqlitePool,
}

impl SqliteLedgerStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn list_investments(
        &self,
        sql: &'static str,
        value: &str,
    ) -> Result<Vec<Investment>, LedgerError> {
        sqlx::query(sql)
            .bind(value)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)?
            .iter()
            .map(investment_from_row)
            .collect()
    }
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    /// # Logic
    /// 1. 带幂等键时先查 `(investor_id, idempotency_key)`：命中且项目、金额一致则重放，否则冲突。
    /// 2. 校验投资人、项目状态、剩余额度与余额。
    /// 3. 扣款、占用额度 (满额转 `Funded`)、写投资记录与流水，提交。
    async fn allocate(&self, cmd: &AllocationCommand) -> Result<AllocationReceipt, LedgerError> {
        if cmd.amount <= Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(
                "Please enter a valid amount to allocate.".into(),
            ));
        }
        let mut tx = self.pool.begin().await.map_err(internal)?;

        if let Some(key) = &cmd.idempotency_key {
            let existing = sqlx::query(&format!(
                "SELECT {} FROM investments WHERE investor_id = ? AND idempotency_key = ?",
                INVESTMENT_COLUMNS
            ))
            .bind(&cmd.investor_id)
            .bind(key)
            .fetch_optional(&mut *tx)
            .await
            .map_err(internal)?;

            if let Some(row) = existing {
                let investment = investment_from_row(&row)?;
                if investment.deal_id != cmd.deal_id || investment.amount != cmd.amount {
                    warn!(
                        "幂等键冲突: investor={} key={} 原请求 deal={} amount={}",
                        cmd.investor_id, key, investment.deal_id, investment.amount
                    );
                    return Err(LedgerError::IdempotencyConflict);
                }
                let investor = fetch_user(&mut tx, &cmd.investor_id)
                    .await
                    .map_err(store_err)?
                    .ok_or_else(|| LedgerError::UserNotFound(cmd.investor_id.clone()))?;
                let deal = fetch_deal(&mut tx, &investment.deal_id)
                    .await
                    .map_err(store_err)?
                    .ok_or_else(|| LedgerError::DealNotFound(investment.deal_id.clone()))?;
                tx.commit().await.map_err(internal)?;
                info!("幂等重放: investor={} key={} investment={}", cmd.investor_id, key, investment.id);
                return Ok(AllocationReceipt {
                    investment,
                    investor,
                    deal,
                    replayed: true,
                });
            }
        }

        let mut investor = fetch_user(&mut tx, &cmd.investor_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| LedgerError::UserNotFound(cmd.investor_id.clone()))?;
        if !investor.is_investor() {
            return Err(LedgerError::NotInvestor);
        }

        let mut deal = fetch_deal(&mut tx, &cmd.deal_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| LedgerError::DealNotFound(cmd.deal_id.clone()))?;
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

        write_balance(&mut tx, &investor.id, investor.balance, cmd.now).await?;
        write_capacity(&mut tx, &deal).await?;
        sqlx::query(&format!(
            "INSERT INTO investments ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            INVESTMENT_COLUMNS
        ))
        .bind(&investment.id)
        .bind(&investment.investor_id)
        .bind(&investment.deal_id)
        .bind(investment.amount.to_string())
        .bind(investment.status.to_string())
        .bind(&investment.idempotency_key)
        .bind(investment.created_at)
        .bind(investment.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(internal)?;
        append_entry(
            &mut tx,
            LedgerEntry {
                id: 0,
                user_id: investor.id.clone(),
                deal_id: Some(deal.id.clone()),
                investment_id: Some(investment.id.clone()),
                action: LedgerAction::Allocation,
                balance_change: -cmd.amount,
                capacity_change: cmd.amount,
                balance_after: investor.balance,
                created_at: cmd.now,
            },
        )
        .await?;

        tx.commit().await.map_err(internal)?;
        info!(
            "注资成功: investor={} deal={} amount={} remaining={}",
            investor.id,
            deal.id,
            cmd.amount,
            deal.remaining_capacity()
        );
        Ok(AllocationReceipt {
            investment,
            investor,
            deal,
            replayed: false,
        })
    }

    async fn refund(
        &self,
        investment_id: &str,
        investor_id: &str,
        now: DateTime<Utc>,
    ) -> Result<AllocationReceipt, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(internal)?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM investments WHERE id = ?",
            INVESTMENT_COLUMNS
        ))
        .bind(investment_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(internal)?
        .ok_or_else(|| LedgerError::InvestmentNotFound(investment_id.to_string()))?;
        let mut investment = investment_from_row(&row)?;

        if investment.investor_id != investor_id {
            return Err(LedgerError::NotOwner);
        }
        if investment.status != InvestmentStatus::Completed {
            return Err(LedgerError::InvalidInvestmentStatus);
        }

        let mut investor = fetch_user(&mut tx, investor_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| LedgerError::UserNotFound(investor_id.to_string()))?;
        let mut deal = fetch_deal(&mut tx, &investment.deal_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| LedgerError::DealNotFound(investment.deal_id.clone()))?;

        investor.balance += investment.amount;
        investor.updated_at = now;
        deal.utilized_amount = (deal.utilized_amount - investment.amount).max(Decimal::ZERO);
        deal.status = Deal::status_for(deal.status, deal.facility_size, deal.utilized_amount);
        deal.updated_at = now;
        investment.status = InvestmentStatus::Refunded;
        investment.updated_at = now;

        write_balance(&mut tx, &investor.id, investor.balance, now).await?;
        write_capacity(&mut tx, &deal).await?;
        sqlx::query("UPDATE investments SET status = ?, updated_at = ? WHERE id = ?")
            .bind(investment.status.to_string())
            .bind(now)
            .bind(&investment.id)
            .execute(&mut *tx)
            .await
            .map_err(internal)?;
        append_entry(
            &mut tx,
            LedgerEntry {
                id: 0,
                user_id: investor.id.clone(),
                deal_id: Some(deal.id.clone()),
                investment_id: Some(investment.id.clone()),
                action: LedgerAction::Refund,
                balance_change: investment.amount,
                capacity_change: -investment.amount,
                balance_after: investor.balance,
                created_at: now,
            },
        )
        .await?;

        tx.commit().await.map_err(internal)?;
        info!(
            "退款成功: investor={} deal={} amount={}",
            investor.id, deal.id, investment.amount
        );
        Ok(AllocationReceipt {
            investment,
            investor,
            deal,
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
        let mut tx = self.pool.begin().await.map_err(internal)?;
        let mut user = fetch_user(&mut tx, user_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| LedgerError::UserNotFound(user_id.to_string()))?;

        user.balance += amount;
        user.updated_at = now;
        write_balance(&mut tx, &user.id, user.balance, now).await?;
        let entry = append_entry(
            &mut tx,
            LedgerEntry {
                id: 0,
                user_id: user.id.clone(),
                deal_id: None,
                investment_id: None,
                action: LedgerAction::TopUp,
                balance_change: amount,
                capacity_change: Decimal::ZERO,
                balance_after: user.balance,
                created_at: now,
            },
        )
        .await?;

        tx.commit().await.map_err(internal)?;
        info!("充值成功: user={} amount={} balance={}", user.id, amount, user.balance);
        Ok(TopUpReceipt { user, entry })
    }

    async fn investments_by_investor(
        &self,
        investor_id: &str,
    ) -> Result<Vec<Investment>, LedgerError> {
        self.list_investments(SELECT_BY_INVESTOR, investor_id).await
    }

    async fn investments_by_deal(&self, deal_id: &str) -> Result<Vec<Investment>, LedgerError> {
        self.list_investments(SELECT_BY_DEAL, deal_id).await
    }

    async fn all_investments(&self) -> Result<Vec<Investment>, LedgerError> {
        sqlx::query(&format!(
            "SELECT {} FROM investments ORDER BY created_at DESC, rowid DESC",
            INVESTMENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?
        .iter()
        .map(investment_from_row)
        .collect()
    }

    async fn entries_for_user(&self, user_id: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        sqlx::query(
            r#"
            SELECT id, user_id, deal_id, investment_id, action, balance_change, capacity_change,
                   balance_after, created_at
            FROM ledger_entries WHERE user_id = ? ORDER BY id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?
        .iter()
        .map(entry_from_row)
        .collect()
    }
}
