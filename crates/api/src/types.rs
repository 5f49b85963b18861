//! # DTO (Data Transfer Object) 层
//!
//! 将内部领域模型转化为面向前端 JSON 输出的轻量结构体。
//! 所有 DTO 必须派生 `utoipa::ToSchema` 以自动进入 Swagger 文档，字段统一使用 camelCase。

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use fintechos_core::deal::entity::{Cashflow, CashflowStatus, Deal, DealContact, DealStatus};
use fintechos_core::ledger::entity::{
    AllocationReceipt, Investment, InvestmentStatus, LedgerAction, LedgerEntry,
};
use fintechos_core::stats::entity::InvestedDeal;
use fintechos_core::user::entity::{AccountType, User};

// ============================================================
//  通用响应 DTO
// ============================================================

/// 统一 API 响应包装器
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T: Serialize + ToSchema> {
    /// 是否成功
    pub success: bool,
    /// 数据载荷 (成功时)
    pub data: Option<T>,
    /// 错误信息 (失败时)
    pub error: Option<String>,
}

impl<T: Serialize + ToSchema> ApiResponse<T> {
    /// 构建成功响应
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// 构建失败响应 (不含泛型载荷)
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiErrorResponse {
    /// 固定为 false
    pub success: bool,
    /// 错误描述信息
    pub error: String,
}

impl ApiErrorResponse {
    /// 从错误信息构建
    pub fn from_msg(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            error: msg.into(),
        }
    }
}

/// 仅含提示信息的响应
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    #[schema(example = "Password updated")]
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// 健康检查 (不走统一包装)
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = true)]
    pub ok: bool,
}

// ============================================================
//  鉴权 DTO
// ============================================================

/// 注册请求体
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[schema(example = "amara@example.com")]
    pub email: String,
    /// 至少 8 位
    #[schema(example = "correct-horse-battery")]
    pub password: String,
    #[schema(example = "Amara Okafor")]
    pub name: String,
    /// `investor` 或 `msme`，缺省为 `investor`
    #[schema(example = "investor")]
    pub account_type: Option<String>,
}

/// 登录请求体
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SigninRequest {
    #[schema(example = "amara@example.com")]
    pub email: String,
    #[schema(example = "correct-horse-battery")]
    pub password: String,
}

/// 注册/登录成功返回的用户与 Token
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub user: UserResponse,
    /// JWT Bearer Token
    #[schema(example = "eyJhbGciOiJIUzI1NiIs...")]
    pub token: String,
}

/// 修改密码请求体
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// 忘记密码请求体
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ForgotPasswordRequest {
    #[schema(example = "amara@example.com")]
    pub email: String,
}

/// 通过邮件令牌重置密码
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

/// 通过邮件令牌确认邮箱
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConfirmEmailRequest {
    pub token: String,
}

/// JWT Claims 内容 (内部使用，不暴露到 Swagger)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// 用户唯一标识
    pub sub: String,
    /// 登录邮箱
    pub email: String,
    /// 账户类型 ("investor" 或 "msme")
    pub role: String,
    /// Token 过期时间 (Unix 时间戳)
    pub exp: usize,
}

// ============================================================
//  用户 DTO
// ============================================================

/// # Summary
/// 用户资料 DTO。
///
/// # Invariants
/// - 公开视图 (`UserResponse::public`) 不含 `email`、`balance`、`pendingEmail`，序列化时直接省略。
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    #[schema(example = "6f1c2a9e-3b7d-4d0e-9a51-0c5f0b1e2d34")]
    pub id: String,
    #[schema(example = "Amara Okafor")]
    pub name: String,
    pub account_type: AccountType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, example = "25000.00")]
    pub balance: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    pub deal_id: Option<String>,
    pub about: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UserResponse {
    /// 本人可见的完整资料
    pub fn private(u: &User) -> Self {
        Self {
            email: Some(u.email.clone()),
            balance: Some(u.balance),
            pending_email: u.pending_email.clone(),
            email_verified: Some(u.email_verified),
            ..Self::public(u)
        }
    }

    /// 他人可见的公开资料
    pub fn public(u: &User) -> Self {
        Self {
            id: u.id.clone(),
            name: u.name.clone(),
            account_type: u.account_type,
            email: None,
            balance: None,
            pending_email: None,
            email_verified: None,
            deal_id: u.deal_id.clone(),
            about: u.about.clone(),
            avatar_url: u.avatar_url.clone(),
            created_at: u.created_at,
        }
    }
}

/// `{user}` 包装
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserEnvelope {
    pub user: UserResponse,
}

/// 更新个人资料，未提供的字段保持不变
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub about: Option<String>,
    /// 头像 (URL 或 data URL)
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileResponse {
    pub user: UserResponse,
    pub message: String,
    /// 等待确认的新邮箱
    pub pending_email: Option<String>,
}

/// 充值请求体
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TopUpRequest {
    #[schema(value_type = String, example = "5000.00")]
    pub amount: Decimal,
}

/// 资金流水 DTO
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntryResponse {
    pub id: i64,
    pub action: LedgerAction,
    pub deal_id: Option<String>,
    pub investment_id: Option<String>,
    #[schema(value_type = String, example = "-250.50")]
    pub balance_change: Decimal,
    #[schema(value_type = String, example = "250.50")]
    pub capacity_change: Decimal,
    #[schema(value_type = String)]
    pub balance_after: Decimal,
    pub created_at: DateTime<Utc>,
}

impl From<LedgerEntry> for LedgerEntryResponse {
    fn from(e: LedgerEntry) -> Self {
        Self {
            id: e.id,
            action: e.action,
            deal_id: e.deal_id,
            investment_id: e.investment_id,
            balance_change: e.balance_change,
            capacity_change: e.capacity_change,
            balance_after: e.balance_after,
            created_at: e.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TopUpResponse {
    pub user: UserResponse,
    pub entry: LedgerEntryResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LedgerEntriesResponse {
    pub entries: Vec<LedgerEntryResponse>,
}

// ============================================================
//  项目 DTO
// ============================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ContactDto {
    #[schema(example = "Ngozi Eze")]
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
}

impl From<DealContact> for ContactDto {
    fn from(c: DealContact) -> Self {
        Self {
            name: c.name,
            email: c.email,
            phone: c.phone,
            website: c.website,
        }
    }
}

impl From<ContactDto> for DealContact {
    fn from(c: ContactDto) -> Self {
        Self {
            name: c.name,
            email: c.email,
            phone: c.phone,
            website: c.website,
        }
    }
}

/// 还款计划中的一期
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CashflowDto {
    #[schema(value_type = String, example = "2026-01-31")]
    pub date: NaiveDate,
    #[schema(value_type = String, example = "1250.00")]
    pub amount: Decimal,
    pub status: CashflowStatus,
}

impl From<Cashflow> for CashflowDto {
    fn from(c: Cashflow) -> Self {
        Self {
            date: c.date,
            amount: c.amount,
            status: c.status,
        }
    }
}

impl From<CashflowDto> for Cashflow {
    fn from(c: CashflowDto) -> Self {
        Self {
            date: c.date,
            amount: c.amount,
            status: c.status,
        }
    }
}

/// 融资项目 DTO，附带派生的剩余额度与使用率
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DealResponse {
    pub id: String,
    pub owner_id: String,
    #[schema(example = "BrightMart Supplies")]
    pub name: String,
    #[schema(example = "Retail")]
    pub sector: String,
    pub location: Option<String>,
    #[schema(value_type = String, example = "10000")]
    pub facility_size: Decimal,
    #[schema(value_type = String, example = "2500.50")]
    pub utilized_amount: Decimal,
    #[schema(value_type = String, example = "7499.50")]
    pub remaining_capacity: Decimal,
    /// 使用率 (百分比)
    #[schema(value_type = String, example = "25.01")]
    pub utilization: Decimal,
    #[schema(value_type = String, example = "11.4")]
    pub target_yield: Decimal,
    pub tenor_months: Option<u32>,
    pub status: DealStatus,
    pub risk_rating: Option<String>,
    pub contact: ContactDto,
    pub cashflows: Vec<CashflowDto>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Deal> for DealResponse {
    fn from(d: Deal) -> Self {
        Self {
            remaining_capacity: d.remaining_capacity(),
            utilization: d.utilization(),
            id: d.id,
            owner_id: d.owner_id,
            name: d.name,
            sector: d.sector,
            location: d.location,
            facility_size: d.facility_size,
            utilized_amount: d.utilized_amount,
            target_yield: d.target_yield,
            tenor_months: d.tenor_months,
            status: d.status,
            risk_rating: d.risk_rating,
            contact: d.contact.into(),
            cashflows: d.cashflows.into_iter().map(Into::into).collect(),
            created_at: d.created_at,
            updated_at: d.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DealEnvelope {
    pub deal: DealResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DealsResponse {
    pub deals: Vec<DealResponse>,
}

/// MSME 创建项目请求体
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateDealRequest {
    #[schema(example = "BrightMart Supplies")]
    pub name: String,
    #[schema(example = "Retail")]
    pub sector: String,
    pub location: Option<String>,
    /// 缺省为 10,000
    #[schema(value_type = Option<String>, example = "10000")]
    pub facility_size: Option<Decimal>,
    #[schema(value_type = Option<String>, example = "11.4")]
    pub target_yield: Option<Decimal>,
    pub tenor_months: Option<u32>,
    pub risk_rating: Option<String>,
    #[serde(default)]
    pub contact: ContactDto,
    #[serde(default)]
    pub cashflows: Vec<CashflowDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateDealResponse {
    pub deal: DealResponse,
    pub user: UserResponse,
}

/// 项目投资明细中的投资人摘要
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InvestorSummary {
    pub id: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DealInvestorItem {
    /// 投资记录 ID
    pub id: String,
    /// 投资人已注销时为空
    pub investor: Option<InvestorSummary>,
    #[schema(value_type = String)]
    pub amount: Decimal,
    pub status: InvestmentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DealInvestorsResponse {
    pub deal: DealResponse,
    pub investors: Vec<DealInvestorItem>,
}

// ============================================================
//  投资 DTO
// ============================================================

/// 注资请求体
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AllocateRequest {
    #[schema(value_type = String, example = "250.50")]
    pub amount: Decimal,
    /// 客户端生成的幂等键，也可通过 `Idempotency-Key` 请求头传入
    #[schema(example = "7f3d2c1a-allocate-1")]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvestmentResponse {
    pub id: String,
    pub investor_id: String,
    pub deal_id: String,
    /// 项目已不存在时为空
    pub deal_name: Option<String>,
    #[schema(value_type = String, example = "250.50")]
    pub amount: Decimal,
    pub status: InvestmentStatus,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InvestmentResponse {
    pub fn new(i: Investment, deal_name: Option<String>) -> Self {
        Self {
            id: i.id,
            investor_id: i.investor_id,
            deal_id: i.deal_id,
            deal_name,
            amount: i.amount,
            status: i.status,
            idempotency_key: i.idempotency_key,
            created_at: i.created_at,
            updated_at: i.updated_at,
        }
    }
}

/// 注资/退款结果：投资记录与变动后的用户、项目
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AllocationResponse {
    pub investment: InvestmentResponse,
    pub user: UserResponse,
    pub deal: DealResponse,
}

impl From<AllocationReceipt> for AllocationResponse {
    fn from(r: AllocationReceipt) -> Self {
        Self {
            investment: InvestmentResponse::new(r.investment, Some(r.deal.name.clone())),
            user: UserResponse::private(&r.investor),
            deal: r.deal.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InvestmentsResponse {
    pub investments: Vec<InvestmentResponse>,
}

// ============================================================
//  统计 DTO
// ============================================================

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct InvestedDealsResponse {
    pub deals: Vec<InvestedDeal>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_user() -> User {
        let mut u = User::new(
            "u1".into(),
            "amara@example.com".into(),
            "hash".into(),
            "Amara".into(),
            AccountType::Investor,
            Utc::now(),
        );
        u.balance = dec!(1250.50);
        u.pending_email = Some("new@example.com".into());
        u
    }

    #[test]
    fn test_public_profile_hides_private_fields() {
        let json = serde_json::to_value(UserResponse::public(&sample_user())).unwrap();
        assert_eq!(json["name"], "Amara");
        assert_eq!(json["accountType"], "investor");
        assert!(json.get("email").is_none());
        assert!(json.get("balance").is_none());
        assert!(json.get("pendingEmail").is_none());
    }

    #[test]
    fn test_private_profile_serialises_amounts_as_strings() {
        let json = serde_json::to_value(UserResponse::private(&sample_user())).unwrap();
        assert_eq!(json["email"], "amara@example.com");
        assert_eq!(json["balance"], "1250.50");
        assert_eq!(json["pendingEmail"], "new@example.com");
        assert_eq!(json["emailVerified"], false);
    }

    #[test]
    fn test_allocate_request_accepts_number_or_string() {
        let a: AllocateRequest = serde_json::from_str(r#"{"amount": 250.5}"#).unwrap();
        assert_eq!(a.amount, dec!(250.5));
        let b: AllocateRequest =
            serde_json::from_str(r#"{"amount": "99.99", "idempotencyKey": "k1"}"#).unwrap();
        assert_eq!(b.amount, dec!(99.99));
        assert_eq!(b.idempotency_key.as_deref(), Some("k1"));
    }
}
