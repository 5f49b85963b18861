use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;

use crate::common::format_usd;

/// 未指定额度时项目的默认授信规模
pub const DEFAULT_FACILITY_SIZE: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// 单个项目的授信规模上限，与单笔注资护栏一致
pub const MAX_FACILITY_SIZE: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// # Summary
/// 融资项目的生命周期状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DealStatus {
    /// 接受注资
    Open,
    /// 额度已满
    Funded,
    /// 已关闭，不再接受注资
    Closed,
}

impl FromStr for DealStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(DealStatus::Open),
            "funded" => Ok(DealStatus::Funded),
            "closed" => Ok(DealStatus::Closed),
            _ => Err(format!("Unknown deal status: {}", s)),
        }
    }
}

impl std::fmt::Display for DealStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DealStatus::Open => write!(f, "open"),
            DealStatus::Funded => write!(f, "funded"),
            DealStatus::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CashflowStatus {
    Scheduled,
    Settled,
    Overdue,
}

/// 还款计划中的一期现金流 (仅作展示数据)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cashflow {
    pub date: NaiveDate,
    pub amount: Decimal,
    pub status: CashflowStatus,
}

/// 项目联系人信息
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DealContact {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
}

/// # Summary
/// 融资项目实体，记录授信规模与已用额度。
///
/// # Invariants
/// - `0 < facility_size <= MAX_FACILITY_SIZE`。
/// - `0 <= utilized_amount <= facility_size`，由账本端口在事务内维护。
/// - 剩余额度为零时状态为 `Funded`。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deal {
    pub id: String,
    // 发起项目的 MSME 用户
    pub owner_id: String,
    pub name: String,
    pub sector: String,
    pub location: Option<String>,
    pub facility_size: Decimal,
    pub utilized_amount: Decimal,
    // 年化目标收益率 (百分比数值，如 11.4)
    pub target_yield: Decimal,
    pub tenor_months: Option<u32>,
    pub status: DealStatus,
    pub risk_rating: Option<String>,
    pub contact: DealContact,
    pub cashflows: Vec<Cashflow>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deal {
    /// 剩余可注资额度，永不为负
    pub fn remaining_capacity(&self) -> Decimal {
        (self.facility_size - self.utilized_amount).max(Decimal::ZERO)
    }

    /// 额度使用率 (百分比，保留两位小数)
    pub fn utilization(&self) -> Decimal {
        if self.facility_size.is_zero() {
            return Decimal::ZERO;
        }
        (self.utilized_amount / self.facility_size * Decimal::ONE_HUNDRED).round_dp(2)
    }

    /// 是否还能接受注资
    pub fn accepts_allocations(&self) -> bool {
        self.status == DealStatus::Open && self.remaining_capacity() > Decimal::ZERO
    }

    /// # Logic
    /// 根据已用额度推导状态：满额为 `Funded`，重新释放额度的 `Funded` 项目回到 `Open`。
    /// `Closed` 是终态，不随额度变化。
    pub fn status_for(status: DealStatus, facility_size: Decimal, utilized: Decimal) -> DealStatus {
        match status {
            DealStatus::Closed => DealStatus::Closed,
            _ if utilized >= facility_size => DealStatus::Funded,
            _ => DealStatus::Open,
        }
    }
}

/// # Summary
/// MSME 创建项目时提交的草稿。
#[derive(Debug, Clone, Default)]
pub struct DealDraft {
    pub name: String,
    pub sector: String,
    pub location: Option<String>,
    pub facility_size: Option<Decimal>,
    pub target_yield: Option<Decimal>,
    pub tenor_months: Option<u32>,
    pub risk_rating: Option<String>,
    pub contact: DealContact,
    pub cashflows: Vec<Cashflow>,
}

impl DealDraft {
    /// # Summary
    /// 校验草稿并生成新项目。
    ///
    /// # Logic
    /// 1. 名称、行业去除空白后不能为空。
    /// 2. 授信规模缺省为 `DEFAULT_FACILITY_SIZE`，必须为正、最多两位小数且不超过 `MAX_FACILITY_SIZE`。
    /// 3. 目标收益率必须在 [0, 100] 之间。
    ///
    /// # Returns
    /// 成功返回处于 `Open` 状态、零已用额度的项目，失败返回可直接展示的错误信息。
    pub fn into_deal(self, id: String, owner_id: String, now: DateTime<Utc>) -> Result<Deal, String> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err("Deal name is required".into());
        }
        let sector = self.sector.trim().to_string();
        if sector.is_empty() {
            return Err("Sector is required".into());
        }

        let facility_size = self.facility_size.unwrap_or(DEFAULT_FACILITY_SIZE);
        if facility_size <= Decimal::ZERO {
            return Err("Facility size must be greater than zero".into());
        }
        if facility_size.normalize().scale() > 2 {
            return Err("Facility size must have at most 2 decimal places".into());
        }
        if facility_size > MAX_FACILITY_SIZE {
            return Err(format!(
                "Facility size must be at most {}",
                format_usd(MAX_FACILITY_SIZE)
            ));
        }

        let target_yield = self.target_yield.unwrap_or(Decimal::ZERO);
        if target_yield < Decimal::ZERO || target_yield > Decimal::ONE_HUNDRED {
            return Err("Target yield must be between 0 and 100".into());
        }

        Ok(Deal {
            id,
            owner_id,
            name,
            sector,
            location: self.location.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()),
            facility_size,
            utilized_amount: Decimal::ZERO,
            target_yield,
            tenor_months: self.tenor_months,
            status: DealStatus::Open,
            risk_rating: self.risk_rating,
            contact: self.contact,
            cashflows: self.cashflows,
            created_at: now,
            updated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn draft() -> DealDraft {
        DealDraft {
            name: " BrightMart Supplies ".into(),
            sector: "Retail".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_draft_defaults_facility_size() {
        let deal = draft().into_deal("d1".into(), "m1".into(), Utc::now()).unwrap();
        assert_eq!(deal.name, "BrightMart Supplies");
        assert_eq!(deal.facility_size, dec!(10000));
        assert_eq!(deal.remaining_capacity(), dec!(10000));
        assert_eq!(deal.status, DealStatus::Open);
        assert!(deal.accepts_allocations());
    }

    #[test]
    fn test_draft_rejects_bad_numbers() {
        let mut d = draft();
        d.facility_size = Some(dec!(0));
        assert!(d.into_deal("d".into(), "m".into(), Utc::now()).is_err());

        let mut d = draft();
        d.facility_size = Some(dec!(10.001));
        assert!(d.into_deal("d".into(), "m".into(), Utc::now()).is_err());

        let mut d = draft();
        d.facility_size = Some(dec!(50000000000000000000000000000));
        assert_eq!(
            d.into_deal("d".into(), "m".into(), Utc::now()).unwrap_err(),
            "Facility size must be at most $1,000,000,000.00"
        );

        let mut d = draft();
        d.facility_size = Some(MAX_FACILITY_SIZE);
        assert!(d.into_deal("d".into(), "m".into(), Utc::now()).is_ok());

        let mut d = draft();
        d.target_yield = Some(dec!(120));
        assert!(d.into_deal("d".into(), "m".into(), Utc::now()).is_err());

        let mut d = draft();
        d.name = "   ".into();
        assert!(d.into_deal("d".into(), "m".into(), Utc::now()).is_err());
    }

    #[test]
    fn test_capacity_and_status_rules() {
        let mut deal = draft().into_deal("d1".into(), "m1".into(), Utc::now()).unwrap();
        deal.utilized_amount = dec!(2500);
        assert_eq!(deal.remaining_capacity(), dec!(7500));
        assert_eq!(deal.utilization(), dec!(25));

        assert_eq!(Deal::status_for(DealStatus::Open, dec!(100), dec!(100)), DealStatus::Funded);
        assert_eq!(Deal::status_for(DealStatus::Funded, dec!(100), dec!(40)), DealStatus::Open);
        assert_eq!(Deal::status_for(DealStatus::Closed, dec!(100), dec!(0)), DealStatus::Closed);
    }
}
