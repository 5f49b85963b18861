//! # API 统一错误处理
//!
//! 将下层各 crate 的错误类型统一映射到 HTTP 状态码与 JSON 响应体。

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use fintechos_core::ledger::port::LedgerError;
use fintechos_core::stats::error::StatsError;
use fintechos_core::store::error::StoreError;
use thiserror::Error;

use crate::types::ApiErrorResponse;

/// API 层统一错误枚举
#[derive(Error, Debug)]
pub enum ApiError {
    /// 认证失败 (401)
    #[error("认证失败: {0}")]
    Unauthorized(String),

    /// 权限不足 (403)
    #[error("权限不足: {0}")]
    Forbidden(String),

    /// 资源未找到 (404)
    #[error("资源未找到: {0}")]
    NotFound(String),

    /// 请求参数错误 (400)
    #[error("请求参数错误: {0}")]
    BadRequest(String),

    /// 与当前资源状态冲突 (409)
    #[error("状态冲突: {0}")]
    Conflict(String),

    /// 触发限流 (429)
    #[error("请求过于频繁: {0}")]
    TooManyRequests(String),

    /// 下层业务错误 (500)
    #[error("内部服务错误: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// 将 `ApiError` 转换为 axum 的 HTTP 响应
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::Internal(msg) => {
                // 内部错误只记录日志，不向客户端透传细节
                tracing::error!("内部服务错误: {}", msg);
                "Internal server error".to_string()
            }
            ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Conflict(msg)
            | ApiError::TooManyRequests(msg) => msg,
        };

        let body = Json(ApiErrorResponse::from_msg(message));
        (status, body).into_response()
    }
}

/// 从 `LedgerError` 转换
///
/// 业务校验失败原样透传提示文案，只有 `InternalError` 会被隐藏。
impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match &err {
            LedgerError::InvalidAmount(_)
            | LedgerError::InvalidIdempotencyKey(_)
            | LedgerError::CapacityExceeded { .. }
            | LedgerError::InsufficientFunds { .. } => ApiError::BadRequest(err.to_string()),
            LedgerError::UserNotFound(_) => ApiError::NotFound("User not found".into()),
            LedgerError::DealNotFound(_) | LedgerError::InvestmentNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            LedgerError::NotInvestor | LedgerError::NotOwner => {
                ApiError::Forbidden(err.to_string())
            }
            LedgerError::DealNotOpen
            | LedgerError::InvalidInvestmentStatus
            | LedgerError::IdempotencyConflict => ApiError::Conflict(err.to_string()),
            LedgerError::InternalError(msg) => ApiError::Internal(msg.clone()),
        }
    }
}

/// 从 `StoreError` 转换
impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound("Resource not found".into()),
            StoreError::Conflict(msg) => ApiError::Conflict(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

/// 统计溢出映射为 500，细节只写日志
impl From<StatsError> for ApiError {
    fn from(err: StatsError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_ledger_error_mapping() {
        let err: ApiError = LedgerError::CapacityExceeded {
            requested: dec!(800),
            remaining: dec!(749.5),
        }
        .into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("$749.50"));

        let err: ApiError = LedgerError::DealNotFound("d1".into()).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err: ApiError = LedgerError::NotInvestor.into();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let err: ApiError = LedgerError::IdempotencyConflict.into();
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let err: ApiError = LedgerError::InternalError("disk full".into()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_store_error_mapping() {
        let err: ApiError = StoreError::Conflict("Email already registered".into()).into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        let err: ApiError = StoreError::Database("locked".into()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let err: ApiError = StatsError::Overflow("facility size").into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
