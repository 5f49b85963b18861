//! # `fintechos-store` - SQLite 持久化适配器
//!
//! 所有表位于同一个 `fintechos.db` 文件中，连接池只开一个连接，
//! 使每个"读取 + 校验 + 写入"事务天然串行。

pub mod config;
pub mod database;
pub mod deal;
pub mod ledger;
pub mod token;
pub mod user;

pub use database::Database;
pub use deal::SqliteDealStore;
pub use ledger::SqliteLedgerStore;
pub use token::SqliteTokenStore;
pub use user::SqliteUserStore;
