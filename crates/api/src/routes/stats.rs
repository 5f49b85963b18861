//! # 统计路由控制器
//!
//! 取数后交给 `fintechos_core::stats::service` 的纯函数计算。

use axum::Json;
use axum::extract::State;

use fintechos_core::stats::entity::{InvestorDashboard, MsmeDashboard, PlatformOverview};
use fintechos_core::stats::service;
use fintechos_core::user::entity::AccountType;

use crate::error::ApiError;
use crate::middleware::auth::{CurrentUser, require_account};
use crate::server::AppState;
use crate::types::{ApiResponse, InvestedDealsResponse};

/// 平台概览 (公开)
#[utoipa::path(
    get,
    path = "/api/stats/overview",
    tag = "统计 (Stats)",
    responses(
        (status = 200, description = "平台汇总", body = ApiResponse<PlatformOverview>)
    )
)]
pub async fn overview(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<PlatformOverview>>, ApiError> {
    let deals = state.deal_store.list_deals().await?;
    let investments = state.allocation.all_investments().await?;
    let overview = service::platform_overview(&deals, &investments)?;
    Ok(Json(ApiResponse::ok(overview)))
}

/// 投资人仪表盘
#[utoipa::path(
    get,
    path = "/api/stats/investor/dashboard",
    tag = "统计 (Stats)",
    security(("bearer_jwt" = [])),
    responses(
        (status = 200, description = "投资人汇总", body = ApiResponse<InvestorDashboard>),
        (status = 403, description = "非投资人账户", body = crate::types::ApiErrorResponse)
    )
)]
pub async fn investor_dashboard(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<ApiResponse<InvestorDashboard>>, ApiError> {
    require_account(&user, AccountType::Investor)?;
    let investments = state.allocation.investments_by_investor(&user.id).await?;
    let deals = state.deal_store.list_deals().await?;
    let dashboard = service::investor_dashboard(&investments, &deals)?;
    Ok(Json(ApiResponse::ok(dashboard)))
}

/// 投资人持有的项目及各自投资额
#[utoipa::path(
    get,
    path = "/api/stats/investor/deals",
    tag = "统计 (Stats)",
    security(("bearer_jwt" = [])),
    responses(
        (status = 200, description = "持仓项目", body = ApiResponse<InvestedDealsResponse>),
        (status = 403, description = "非投资人账户", body = crate::types::ApiErrorResponse)
    )
)]
pub async fn investor_deals(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<ApiResponse<InvestedDealsResponse>>, ApiError> {
    require_account(&user, AccountType::Investor)?;
    let investments = state.allocation.investments_by_investor(&user.id).await?;
    let deals = state.deal_store.list_deals().await?;
    Ok(Json(ApiResponse::ok(InvestedDealsResponse {
        deals: service::invested_deals(&investments, &deals)?,
    })))
}

/// MSME 仪表盘
///
/// 尚未发布项目时返回 `hasDeal = false` 与零值。
#[utoipa::path(
    get,
    path = "/api/stats/msme/dashboard",
    tag = "统计 (Stats)",
    security(("bearer_jwt" = [])),
    responses(
        (status = 200, description = "MSME 汇总", body = ApiResponse<MsmeDashboard>),
        (status = 403, description = "非 MSME 账户", body = crate::types::ApiErrorResponse)
    )
)]
pub async fn msme_dashboard(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<ApiResponse<MsmeDashboard>>, ApiError> {
    require_account(&user, AccountType::Msme)?;

    let deal = match &user.deal_id {
        Some(id) => state.deal_store.get_deal(id).await?,
        None => None,
    };
    let (investments, investors) = match &deal {
        Some(d) => {
            let investments = state.allocation.investments_by_deal(&d.id).await?;
            let mut ids: Vec<String> =
                investments.iter().map(|i| i.investor_id.clone()).collect();
            ids.sort();
            ids.dedup();
            let investors = state.user_store.find_users(&ids).await?;
            (investments, investors)
        }
        None => (Vec::new(), Vec::new()),
    };

    Ok(Json(ApiResponse::ok(service::msme_dashboard(
        deal.as_ref(),
        &investments,
        &investors,
    ))))
}
