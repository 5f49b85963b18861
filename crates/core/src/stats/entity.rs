use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

use crate::deal::entity::DealStatus;
use crate::ledger::entity::InvestmentStatus;

/// # Summary
/// 平台级汇总数据 (公开)。
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlatformOverview {
    pub total_deals: usize,
    pub open_deals: usize,
    #[schema(value_type = String, example = "250000.00")]
    pub total_facility: Decimal,
    #[schema(value_type = String)]
    pub total_utilized: Decimal,
    #[schema(value_type = String)]
    pub total_remaining: Decimal,
    /// 已用额度占比 (百分比)
    #[schema(value_type = String, example = "42.5")]
    pub utilization_rate: Decimal,
    /// 至少持有一笔有效投资的投资人数
    pub total_investors: usize,
    #[schema(value_type = String)]
    pub total_invested: Decimal,
}

/// 按行业划分的持仓
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SectorAllocation {
    pub sector: String,
    #[schema(value_type = String)]
    pub amount: Decimal,
    #[schema(value_type = String, example = "35.25")]
    pub percentage: Decimal,
}

/// 投资人在单个项目上的持仓
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvestedDeal {
    pub deal_id: String,
    pub deal_name: String,
    pub sector: String,
    #[schema(value_type = String)]
    pub target_yield: Decimal,
    pub status: DealStatus,
    /// 有效投资金额合计
    #[schema(value_type = String)]
    pub invested_amount: Decimal,
    pub investment_count: usize,
    #[schema(value_type = String)]
    pub remaining_capacity: Decimal,
    pub last_invested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Allocation,
    Refund,
}

/// 投资人动态
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActivityItem {
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    #[schema(value_type = String)]
    pub amount: Decimal,
    pub deal_id: String,
    pub deal_name: String,
    pub created_at: DateTime<Utc>,
}

/// # Summary
/// 投资人仪表盘。
///
/// # Invariants
/// - 金额类指标只统计 `Completed` 状态的投资。
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvestorDashboard {
    #[schema(value_type = String)]
    pub total_invested: Decimal,
    /// 按金额加权的平均目标收益率
    #[schema(value_type = String, example = "11.4")]
    pub average_yield: Decimal,
    pub active_deals: usize,
    pub allocation: Vec<SectorAllocation>,
    pub recent_deals: Vec<InvestedDeal>,
    pub activity: Vec<ActivityItem>,
}

/// MSME 看到的单笔来款
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedInvestment {
    pub id: String,
    pub investor_id: String,
    pub investor_name: String,
    #[schema(value_type = String)]
    pub amount: Decimal,
    pub status: InvestmentStatus,
    pub created_at: DateTime<Utc>,
}

/// # Summary
/// MSME 仪表盘。尚未创建项目时 `has_deal = false` 且金额均为零。
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MsmeDashboard {
    pub has_deal: bool,
    pub deal_id: Option<String>,
    pub deal_name: Option<String>,
    pub status: Option<DealStatus>,
    #[schema(value_type = String)]
    pub facility_size: Decimal,
    #[schema(value_type = String)]
    pub utilized_amount: Decimal,
    #[schema(value_type = String)]
    pub remaining_capacity: Decimal,
    #[schema(value_type = String)]
    pub utilization: Decimal,
    pub investor_count: usize,
    pub recent_investments: Vec<ReceivedInvestment>,
}
