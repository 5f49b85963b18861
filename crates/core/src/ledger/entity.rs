use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;

use crate::common::format_usd;
use crate::deal::entity::Deal;
use crate::user::entity::User;

/// 单笔注资/充值金额上限 (业务护栏)
pub const MAX_ALLOCATION_AMOUNT: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// 金额允许的最大小数位
pub const MAX_AMOUNT_SCALE: u32 = 2;

/// 幂等键的最大长度
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

/// # Summary
/// 投资记录的状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum InvestmentStatus {
    /// 资金已划入项目
    Completed,
    /// 已退回投资人
    Refunded,
}

impl FromStr for InvestmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(InvestmentStatus::Completed),
            "refunded" => Ok(InvestmentStatus::Refunded),
            _ => Err(format!("Unknown investment status: {}", s)),
        }
    }
}

impl std::fmt::Display for InvestmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvestmentStatus::Completed => write!(f, "completed"),
            InvestmentStatus::Refunded => write!(f, "refunded"),
        }
    }
}

/// # Summary
/// 投资人对项目的一笔注资。
///
/// # Invariants
/// - `amount > 0` 且最多两位小数。
/// - `Completed` 状态的金额计入项目的 `utilized_amount`。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Investment {
    pub id: String,
    pub investor_id: String,
    pub deal_id: String,
    pub amount: Decimal,
    pub status: InvestmentStatus,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// # Summary
/// 账本流水的动作类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LedgerAction {
    /// 余额充值
    TopUp,
    /// 注资：扣减余额、占用项目额度
    Allocation,
    /// 退款：归还余额、释放项目额度
    Refund,
}

impl FromStr for LedgerAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "top_up" => Ok(LedgerAction::TopUp),
            "allocation" => Ok(LedgerAction::Allocation),
            "refund" => Ok(LedgerAction::Refund),
            _ => Err(format!("Unknown ledger action: {}", s)),
        }
    }
}

impl std::fmt::Display for LedgerAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerAction::TopUp => write!(f, "top_up"),
            LedgerAction::Allocation => write!(f, "allocation"),
            LedgerAction::Refund => write!(f, "refund"),
        }
    }
}

/// # Summary
/// 只追加的资金流水，每次余额或额度变动都对应一条。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub user_id: String,
    pub deal_id: Option<String>,
    pub investment_id: Option<String>,
    pub action: LedgerAction,
    /// 用户余额变动 (注资为负)
    pub balance_change: Decimal,
    /// 项目已用额度变动 (退款为负)
    pub capacity_change: Decimal,
    /// 变动后的用户余额
    pub balance_after: Decimal,
    pub created_at: DateTime<Utc>,
}

/// # Summary
/// 一次注资的完整指令，由服务层校验后交给账本端口原子执行。
#[derive(Debug, Clone)]
pub struct AllocationCommand {
    /// 预先生成的投资 ID (幂等重放时不会被使用)
    pub investment_id: String,
    pub investor_id: String,
    pub deal_id: String,
    pub amount: Decimal,
    pub idempotency_key: Option<String>,
    pub now: DateTime<Utc>,
}

/// # Summary
/// 注资/退款执行后的回执，携带变动后的用户与项目快照。
#[derive(Debug, Clone)]
pub struct AllocationReceipt {
    pub investment: Investment,
    pub investor: User,
    pub deal: Deal,
    /// 是否为幂等键命中后的重放结果
    pub replayed: bool,
}

/// # Summary
/// 充值回执。
#[derive(Debug, Clone)]
pub struct TopUpReceipt {
    pub user: User,
    pub entry: LedgerEntry,
}

/// 被校验金额的用途，决定提示语的措辞
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountPurpose {
    /// 向项目注资
    Allocation,
    /// 余额充值
    TopUp,
}

impl AmountPurpose {
    fn verb(self) -> &'static str {
        match self {
            AmountPurpose::Allocation => "allocate",
            AmountPurpose::TopUp => "add",
        }
    }
}

/// # Summary
/// 金额校验失败的原因，`Display` 即返回给客户端的提示。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmountViolation {
    NotPositive(AmountPurpose),
    TooManyDecimals,
    AboveGuardrail(Decimal),
}

impl std::fmt::Display for AmountViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AmountViolation::NotPositive(purpose) => {
                write!(f, "Please enter a valid amount to {}.", purpose.verb())
            }
            AmountViolation::TooManyDecimals => write!(f, "Please limit amounts to 2 decimal places."),
            AmountViolation::AboveGuardrail(max) => {
                write!(f, "Please enter an amount under {}.", format_usd(*max))
            }
        }
    }
}

/// # Summary
/// 校验单笔金额。
///
/// # Logic
/// 1. 金额必须大于零。
/// 2. 去掉尾随零后最多两位小数 (`10.50` 合法，`10.005` 非法)。
/// 3. 不得超过护栏上限 `max`。
///
/// # Returns
/// 合法时返回去掉尾随零的金额。
pub fn validate_amount(
    amount: Decimal,
    max: Decimal,
    purpose: AmountPurpose,
) -> Result<Decimal, AmountViolation> {
    if amount <= Decimal::ZERO {
        return Err(AmountViolation::NotPositive(purpose));
    }
    let normalized = amount.normalize();
    if normalized.scale() > MAX_AMOUNT_SCALE {
        return Err(AmountViolation::TooManyDecimals);
    }
    if normalized > max {
        return Err(AmountViolation::AboveGuardrail(max));
    }
    Ok(normalized)
}

/// # Summary
/// 规范化客户端传入的幂等键：去除空白，空串视为未提供。
///
/// # Returns
/// 超长或包含控制字符时返回错误信息。
pub fn normalize_idempotency_key(key: Option<&str>) -> Result<Option<String>, String> {
    let Some(raw) = key.map(str::trim).filter(|k| !k.is_empty()) else {
        return Ok(None);
    };
    if raw.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(format!(
            "Idempotency key must be at most {} characters",
            MAX_IDEMPOTENCY_KEY_LEN
        ));
    }
    if raw.chars().any(char::is_control) {
        return Err("Idempotency key contains invalid characters".into());
    }
    Ok(Some(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_validate_amount_rules() {
        assert_eq!(validate_amount(dec!(0), MAX_ALLOCATION_AMOUNT, AmountPurpose::Allocation), Err(AmountViolation::NotPositive(AmountPurpose::Allocation)));
        assert_eq!(validate_amount(dec!(-5), MAX_ALLOCATION_AMOUNT, AmountPurpose::Allocation), Err(AmountViolation::NotPositive(AmountPurpose::Allocation)));
        assert_eq!(
            validate_amount(dec!(10.005), MAX_ALLOCATION_AMOUNT, AmountPurpose::Allocation),
            Err(AmountViolation::TooManyDecimals)
        );
        assert_eq!(validate_amount(dec!(10.500), MAX_ALLOCATION_AMOUNT, AmountPurpose::Allocation), Ok(dec!(10.5)));
        assert_eq!(
            validate_amount(dec!(1000000000), MAX_ALLOCATION_AMOUNT, AmountPurpose::Allocation),
            Ok(dec!(1000000000))
        );
        assert_eq!(
            validate_amount(dec!(1000000000.01), MAX_ALLOCATION_AMOUNT, AmountPurpose::Allocation),
            Err(AmountViolation::AboveGuardrail(MAX_ALLOCATION_AMOUNT))
        );
    }

    #[test]
    fn test_violation_messages() {
        assert_eq!(
            AmountViolation::AboveGuardrail(MAX_ALLOCATION_AMOUNT).to_string(),
            "Please enter an amount under $1,000,000,000.00."
        );
        assert_eq!(
            AmountViolation::NotPositive(AmountPurpose::Allocation).to_string(),
            "Please enter a valid amount to allocate."
        );
        assert_eq!(
            AmountViolation::NotPositive(AmountPurpose::TopUp).to_string(),
            "Please enter a valid amount to add."
        );
        assert_eq!(
            AmountViolation::TooManyDecimals.to_string(),
            "Please limit amounts to 2 decimal places."
        );
    }

    #[test]
    fn test_normalize_idempotency_key() {
        assert_eq!(normalize_idempotency_key(None), Ok(None));
        assert_eq!(normalize_idempotency_key(Some("   ")), Ok(None));
        assert_eq!(normalize_idempotency_key(Some(" abc-1 ")), Ok(Some("abc-1".into())));
        assert!(normalize_idempotency_key(Some(&"k".repeat(129))).is_err());
        assert!(normalize_idempotency_key(Some("a\nb")).is_err());
    }
}
