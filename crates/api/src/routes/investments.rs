//! # 注资路由控制器
//!
//! 注资、退款与投资记录查询。额度与余额的检查全部交给 `AllocationPort`，
//! 本层只负责鉴权、提取幂等键与 DTO 转换。

use std::collections::HashMap;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};

use fintechos_core::user::entity::AccountType;

use crate::error::ApiError;
use crate::middleware::auth::{CurrentUser, require_account};
use crate::server::AppState;
use crate::types::{
    AllocateRequest, AllocationResponse, ApiResponse, InvestmentResponse, InvestmentsResponse,
};

/// 幂等键请求头
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

/// 向项目注资
///
/// # Logic
/// 1. 仅投资人可调用。
/// 2. 幂等键优先取请求体，其次取 `Idempotency-Key` 请求头。
/// 3. 新建返回 201，幂等重放返回 200 与原结果。
#[utoipa::path(
    post,
    path = "/api/deals/{id}/investments",
    tag = "注资 (Investments)",
    security(("bearer_jwt" = [])),
    params(
        ("id" = String, Path, description = "项目 ID"),
        ("Idempotency-Key" = Option<String>, Header, description = "幂等键")
    ),
    request_body = AllocateRequest,
    responses(
        (status = 201, description = "注资成功", body = ApiResponse<AllocationResponse>),
        (status = 200, description = "幂等重放，返回原结果", body = ApiResponse<AllocationResponse>),
        (status = 400, description = "金额、额度或余额校验失败", body = crate::types::ApiErrorResponse),
        (status = 403, description = "非投资人账户", body = crate::types::ApiErrorResponse),
        (status = 404, description = "项目不存在", body = crate::types::ApiErrorResponse),
        (status = 409, description = "项目未开放或幂等键冲突", body = crate::types::ApiErrorResponse)
    )
)]
pub async fn allocate(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(deal_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<AllocateRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AllocationResponse>>), ApiError> {
    require_account(&user, AccountType::Investor)?;

    let header_key = headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let key = req.idempotency_key.or(header_key);

    let receipt = state
        .allocation
        .allocate(&user.id, &deal_id, req.amount, key.as_deref())
        .await
        .inspect_err(|e| {
            tracing::warn!("注资被拒绝: investor={} deal={} reason={}", user.id, deal_id, e);
        })?;

    let status = if receipt.replayed {
        tracing::info!("幂等重放: investor={} investment={}", user.id, receipt.investment.id);
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(ApiResponse::ok(receipt.into()))))
}

/// 我的投资记录 (新的在前)
#[utoipa::path(
    get,
    path = "/api/investments",
    tag = "注资 (Investments)",
    security(("bearer_jwt" = [])),
    responses(
        (status = 200, description = "投资记录", body = ApiResponse<InvestmentsResponse>)
    )
)]
pub async fn list_investments(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<ApiResponse<InvestmentsResponse>>, ApiError> {
    let investments = state.allocation.investments_by_investor(&user.id).await?;
    let names: HashMap<String, String> = state
        .deal_store
        .list_deals()
        .await?
        .into_iter()
        .map(|d| (d.id, d.name))
        .collect();

    let investments = investments
        .into_iter()
        .map(|i| {
            let name = names.get(&i.deal_id).cloned();
            InvestmentResponse::new(i, name)
        })
        .collect();
    Ok(Json(ApiResponse::ok(InvestmentsResponse { investments })))
}

/// 退回一笔投资
///
/// 资金回到投资人余额，项目额度同步释放，满额项目重新开放。
#[utoipa::path(
    post,
    path = "/api/investments/{id}/refund",
    tag = "注资 (Investments)",
    security(("bearer_jwt" = [])),
    params(("id" = String, Path, description = "投资记录 ID")),
    responses(
        (status = 200, description = "退款成功", body = ApiResponse<AllocationResponse>),
        (status = 403, description = "非本人投资", body = crate::types::ApiErrorResponse),
        (status = 404, description = "投资记录不存在", body = crate::types::ApiErrorResponse),
        (status = 409, description = "投资状态不允许退款", body = crate::types::ApiErrorResponse)
    )
)]
pub async fn refund(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<AllocationResponse>>, ApiError> {
    require_account(&user, AccountType::Investor)?;
    let receipt = state.allocation.refund(&user.id, &id).await?;
    tracing::info!(
        "退款成功: investor={} investment={} amount={}",
        user.id,
        receipt.investment.id,
        receipt.investment.amount
    );
    Ok(Json(ApiResponse::ok(receipt.into())))
}
