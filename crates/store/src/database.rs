use fintechos_core::store::error::StoreError;
use rust_decimal::Decimal;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::{SqliteDealStore, SqliteLedgerStore, SqliteTokenStore, SqliteUserStore};

/// 数据库文件名
const DEFAULT_DB_FILE: &str = "fintechos.db";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    name TEXT NOT NULL,
    balance TEXT NOT NULL,
    account_type TEXT NOT NULL,
    deal_id TEXT,
    about TEXT,
    avatar_url TEXT,
    pending_email TEXT,
    email_verified INTEGER NOT NULL DEFAULT 0,
    created_at DATETIME NOT NULL,
    updated_at DATETIME NOT NULL
);

CREATE TABLE IF NOT EXISTS deals (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    name TEXT NOT NULL,
    sector TEXT NOT NULL,
    location TEXT,
    facility_size TEXT NOT NULL,
    utilized_amount TEXT NOT NULL,
    target_yield TEXT NOT NULL,
    tenor_months INTEGER,
    status TEXT NOT NULL,
    risk_rating TEXT,
    contact_name TEXT,
    contact_email TEXT,
    contact_phone TEXT,
    website TEXT,
    cashflows TEXT NOT NULL DEFAULT '[]',
    created_at DATETIME NOT NULL,
    updated_at DATETIME NOT NULL
);

CREATE TABLE IF NOT EXISTS investments (
    id TEXT PRIMARY KEY,
    investor_id TEXT NOT NULL,
    deal_id TEXT NOT NULL,
    amount TEXT NOT NULL,
    status TEXT NOT NULL,
    idempotency_key TEXT,
    created_at DATETIME NOT NULL,
    updated_at DATETIME NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_investments_investor ON investments (investor_id);
CREATE INDEX IF NOT EXISTS idx_investments_deal ON investments (deal_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_investments_idempotency
    ON investments (investor_id, idempotency_key);

CREATE TABLE IF NOT EXISTS ledger_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    deal_id TEXT,
    investment_id TEXT,
    action TEXT NOT NULL,
    balance_change TEXT NOT NULL,
    capacity_change TEXT NOT NULL,
    balance_after TEXT NOT NULL,
    created_at DATETIME NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_ledger_user ON ledger_entries (user_id);

CREATE TABLE IF NOT EXISTS verification_tokens (
    token_hash TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    purpose TEXT NOT NULL,
    payload TEXT,
    expires_at DATETIME NOT NULL,
    created_at DATETIME NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tokens_user ON verification_tokens (user_id, purpose);
"#;

/// # Summary
/// 共享的 SQLite 连接池，负责建表并派生各个存储适配器。
///
/// # Invariants
/// - 连接池只有一个连接，所有事务按到达顺序串行执行。
/// - 表结构在 `open` 时幂等创建。
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// 在 `set_root_dir` 配置的目录下打开数据库
    pub async fn open() -> Result<Self, StoreError> {
        Self::open_at(&crate::config::get_root_dir()).await
    }

    /// # Summary
    /// 在指定目录下打开 (必要时创建) 数据库并初始化表结构。
    ///
    /// # Logic
    /// 1. 确保目录存在。
    /// 2. 开启 WAL 与 busy timeout，连接池限制为单连接。
    /// 3. 执行建表 DDL。
    ///
    /// # Arguments
    /// * `dir` - 数据目录。
    pub async fn open_at(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir).map_err(|e| StoreError::InitError(e.to_string()))?;
        let db_path = dir.join(DEFAULT_DB_FILE);

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::InitError(e.to_string()))?;

        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| StoreError::InitError(e.to_string()))?;

        info!("数据库已就绪: {}", db_path.display());
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn user_store(&self) -> SqliteUserStore {
        SqliteUserStore::new(self.pool.clone())
    }

    pub fn deal_store(&self) -> SqliteDealStore {
        SqliteDealStore::new(self.pool.clone())
    }

    pub fn token_store(&self) -> SqliteTokenStore {
        SqliteTokenStore::new(self.pool.clone())
    }

    pub fn ledger_store(&self) -> SqliteLedgerStore {
        SqliteLedgerStore::new(self.pool.clone())
    }
}

pub(crate) fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

/// 唯一约束冲突转为 `Conflict`，其余为 `Database`
pub(crate) fn write_err(e: sqlx::Error, conflict_msg: &str) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(conflict_msg.to_string())
        }
        _ => db_err(e),
    }
}

pub(crate) fn parse_decimal(raw: &str, field: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(raw)
        .map_err(|e| StoreError::Corrupted(format!("{} 不是合法金额 ({}): {}", field, raw, e)))
}

pub(crate) fn parse_enum<T: FromStr<Err = String>>(raw: &str) -> Result<T, StoreError> {
    T::from_str(raw).map_err(StoreError::Corrupted)
}
