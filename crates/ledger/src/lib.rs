//! # `fintechos-ledger` - 注资与额度记账
//!
//! `AllocationService` 负责金额护栏、幂等键规范化与 ID 生成，
//! 再把原子写入委托给任意 `LedgerStore` 实现 (SQLite 或内存)。

pub mod memory;
pub mod service;

pub use memory::MemoryLedgerStore;
pub use service::AllocationService;
