//! # `fintechos-core` - 领域核心
//!
//! 定义撮合市场的领域实体 (用户、项目、投资、流水)、端口 (trait) 与错误类型。
//! 本 crate 不做任何 I/O，具体适配器由 `store` / `notify` / `ledger` 等 crate 实现。

pub mod common;
pub mod config;
pub mod deal;
pub mod ledger;
pub mod notify;
pub mod stats;
pub mod store;
pub mod user;

#[cfg(feature = "test-utils")]
pub mod test_utils;
