//! # 融资项目路由控制器

use std::collections::HashMap;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;

use fintechos_core::deal::entity::DealDraft;
use fintechos_core::user::entity::AccountType;

use crate::error::ApiError;
use crate::middleware::auth::{CurrentUser, require_account};
use crate::server::AppState;
use crate::types::{
    ApiResponse, CreateDealRequest, CreateDealResponse, DealEnvelope, DealInvestorItem,
    DealInvestorsResponse, DealsResponse, InvestorSummary, UserResponse,
};

const DEAL_NOT_FOUND: &str = "Deal not found";

/// 项目列表 (新的在前)
#[utoipa::path(
    get,
    path = "/api/deals",
    tag = "项目 (Deals)",
    security(("bearer_jwt" = [])),
    responses(
        (status = 200, description = "项目列表", body = ApiResponse<DealsResponse>),
        (status = 401, description = "未登录", body = crate::types::ApiErrorResponse)
    )
)]
pub async fn list_deals(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<DealsResponse>>, ApiError> {
    let deals = state.deal_store.list_deals().await?;
    Ok(Json(ApiResponse::ok(DealsResponse {
        deals: deals.into_iter().map(Into::into).collect(),
    })))
}

/// 项目详情
#[utoipa::path(
    get,
    path = "/api/deals/{id}",
    tag = "项目 (Deals)",
    security(("bearer_jwt" = [])),
    params(("id" = String, Path, description = "项目 ID")),
    responses(
        (status = 200, description = "项目详情", body = ApiResponse<DealEnvelope>),
        (status = 401, description = "未登录", body = crate::types::ApiErrorResponse),
        (status = 404, description = "项目不存在", body = crate::types::ApiErrorResponse)
    )
)]
pub async fn get_deal(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<DealEnvelope>>, ApiError> {
    let deal = state
        .deal_store
        .get_deal(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(DEAL_NOT_FOUND.into()))?;
    Ok(Json(ApiResponse::ok(DealEnvelope { deal: deal.into() })))
}

/// 发布项目
///
/// 仅 MSME 可调用，每个账户最多一个项目，创建后回写 `user.dealId`。
#[utoipa::path(
    post,
    path = "/api/deals",
    tag = "项目 (Deals)",
    security(("bearer_jwt" = [])),
    request_body = CreateDealRequest,
    responses(
        (status = 201, description = "创建成功", body = ApiResponse<CreateDealResponse>),
        (status = 400, description = "参数校验失败", body = crate::types::ApiErrorResponse),
        (status = 403, description = "非 MSME 账户", body = crate::types::ApiErrorResponse),
        (status = 409, description = "已有项目", body = crate::types::ApiErrorResponse)
    )
)]
pub async fn create_deal(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<CreateDealRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CreateDealResponse>>), ApiError> {
    require_account(&user, AccountType::Msme)?;
    if user.deal_id.is_some() {
        return Err(ApiError::Conflict("Account already has a deal".into()));
    }

    let draft = DealDraft {
        name: req.name,
        sector: req.sector,
        location: req.location,
        facility_size: req.facility_size,
        target_yield: req.target_yield,
        tenor_months: req.tenor_months,
        risk_rating: req.risk_rating,
        contact: req.contact.into(),
        cashflows: req.cashflows.into_iter().map(Into::into).collect(),
    };
    let deal = draft
        .into_deal(
            uuid::Uuid::new_v4().to_string(),
            user.id.clone(),
            state.clock.now(),
        )
        .map_err(ApiError::BadRequest)?;

    state.deal_store.create_deal(&deal).await?;
    tracing::info!(
        "新项目发布: deal={} owner={} facility={}",
        deal.id,
        user.id,
        deal.facility_size
    );

    let owner = state
        .user_store
        .get_user(&user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(CreateDealResponse {
            deal: deal.into(),
            user: UserResponse::private(&owner),
        })),
    ))
}

/// 项目投资明细
///
/// 仅项目发起人可见，包含每笔投资的投资人信息。
#[utoipa::path(
    get,
    path = "/api/deals/{id}/investors",
    tag = "项目 (Deals)",
    security(("bearer_jwt" = [])),
    params(("id" = String, Path, description = "项目 ID")),
    responses(
        (status = 200, description = "投资明细", body = ApiResponse<DealInvestorsResponse>),
        (status = 403, description = "非项目发起人", body = crate::types::ApiErrorResponse),
        (status = 404, description = "项目不存在", body = crate::types::ApiErrorResponse)
    )
)]
pub async fn deal_investors(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<DealInvestorsResponse>>, ApiError> {
    let deal = state
        .deal_store
        .get_deal(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(DEAL_NOT_FOUND.into()))?;
    if deal.owner_id != user.id {
        tracing::warn!("非发起人查看投资明细: deal={} user={}", deal.id, user.id);
        return Err(ApiError::Forbidden(
            "Only the deal owner can view its investors".into(),
        ));
    }

    let investments = state.allocation.investments_by_deal(&deal.id).await?;
    let mut ids: Vec<String> = investments.iter().map(|i| i.investor_id.clone()).collect();
    ids.sort();
    ids.dedup();
    let investors: HashMap<String, InvestorSummary> = state
        .user_store
        .find_users(&ids)
        .await?
        .into_iter()
        .map(|u| {
            (
                u.id.clone(),
                InvestorSummary {
                    id: u.id,
                    name: u.name,
                    email: u.email,
                },
            )
        })
        .collect();

    let items = investments
        .into_iter()
        .map(|i| DealInvestorItem {
            investor: investors.get(&i.investor_id).cloned(),
            id: i.id,
            amount: i.amount,
            status: i.status,
            created_at: i.created_at,
        })
        .collect();

    Ok(Json(ApiResponse::ok(DealInvestorsResponse {
        deal: deal.into(),
        investors: items,
    })))
}
