//! # `fintechos-api` - HTTP API 网关
//!
//! 本 crate 是 FintechOS 撮合市场的 HTTP/REST 服务入口。
//! 使用 `axum` 构建路由与控制器，通过 `utoipa` 自动生成 OpenAPI 3.0 Swagger 文档。
//!
//! ## 架构职责
//! - 接收来自单页前端的 HTTP 请求
//! - 执行 JWT 鉴权、鉴权接口限流后分发至各业务路由
//! - 调用 `fintechos-core` 定义的存储、账本与通知端口完成业务操作
//! - 将领域模型转换为 camelCase DTO 返回给前端

pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod types;
