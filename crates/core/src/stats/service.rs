//! 仪表盘统计的纯计算函数，输入为存储层读出的快照。

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};

use super::error::StatsError;
use super::entity::{
    ActivityItem, ActivityKind, InvestedDeal, InvestorDashboard, MsmeDashboard, PlatformOverview,
    ReceivedInvestment, SectorAllocation,
};
use crate::deal::entity::{Deal, DealStatus};
use crate::ledger::entity::{Investment, InvestmentStatus};
use crate::user::entity::User;

/// 仪表盘中最近项目的条数
pub const RECENT_DEALS_LIMIT: usize = 5;
/// 投资人动态的条数
pub const ACTIVITY_LIMIT: usize = 10;
/// MSME 仪表盘中最近来款的条数
pub const RECENT_INVESTMENTS_LIMIT: usize = 5;

fn percent(part: Decimal, whole: Decimal) -> Decimal {
    if whole.is_zero() {
        return Decimal::ZERO;
    }
    (part / whole * Decimal::ONE_HUNDRED).round_dp(2)
}

/// 逐项 `checked_add`，溢出时返回 `StatsError::Overflow`
fn checked_sum<I>(values: I, what: &'static str) -> Result<Decimal, StatsError>
where
    I: IntoIterator<Item = Decimal>,
{
    values.into_iter().try_fold(Decimal::ZERO, |acc, v| {
        acc.checked_add(v).ok_or(StatsError::Overflow(what))
    })
}

fn completed(investments: &[Investment]) -> impl Iterator<Item = &Investment> {
    investments
        .iter()
        .filter(|i| i.status == InvestmentStatus::Completed)
}

/// # Summary
/// 计算平台汇总。
///
/// # Arguments
/// * `deals`: 全部项目。
/// * `investments`: 全部投资记录 (含已退款)。
///
/// # Returns
/// 任一汇总溢出时返回 `StatsError::Overflow`。
pub fn platform_overview(
    deals: &[Deal],
    investments: &[Investment],
) -> Result<PlatformOverview, StatsError> {
    let total_facility = checked_sum(deals.iter().map(|d| d.facility_size), "facility size")?;
    let total_utilized = checked_sum(deals.iter().map(|d| d.utilized_amount), "utilized amount")?;
    let total_remaining = checked_sum(deals.iter().map(Deal::remaining_capacity), "remaining capacity")?;
    let total_invested = checked_sum(completed(investments).map(|i| i.amount), "invested amount")?;
    let investors: HashSet<&str> = completed(investments)
        .map(|i| i.investor_id.as_str())
        .collect();

    Ok(PlatformOverview {
        total_deals: deals.len(),
        open_deals: deals.iter().filter(|d| d.status == DealStatus::Open).count(),
        total_facility,
        total_utilized,
        total_remaining,
        utilization_rate: percent(total_utilized, total_facility),
        total_investors: investors.len(),
        total_invested,
    })
}

/// # Summary
/// 按项目汇总投资人的有效持仓，最近投资的项目在前。
///
/// # Logic
/// 1. 只统计 `Completed` 投资，按 `deal_id` 聚合金额、笔数与最后投资时间。
/// 2. 找不到对应项目的记录 (项目已被删除) 被忽略。
///
/// # Arguments
/// * `investments`: 该投资人的全部投资。
/// * `deals`: 项目快照。
pub fn invested_deals(
    investments: &[Investment],
    deals: &[Deal],
) -> Result<Vec<InvestedDeal>, StatsError> {
    let by_id: HashMap<&str, &Deal> = deals.iter().map(|d| (d.id.as_str(), d)).collect();
    let mut grouped: HashMap<&str, (Decimal, usize, DateTime<Utc>)> = HashMap::new();

    for inv in completed(investments) {
        let slot = grouped
            .entry(inv.deal_id.as_str())
            .or_insert((Decimal::ZERO, 0, inv.created_at));
        slot.0 = slot
            .0
            .checked_add(inv.amount)
            .ok_or(StatsError::Overflow("invested amount"))?;
        slot.1 += 1;
        slot.2 = slot.2.max(inv.created_at);
    }

    let mut rows: Vec<InvestedDeal> = grouped
        .into_iter()
        .filter_map(|(deal_id, (amount, count, last))| {
            let deal = by_id.get(deal_id)?;
            Some(InvestedDeal {
                deal_id: deal.id.clone(),
                deal_name: deal.name.clone(),
                sector: deal.sector.clone(),
                target_yield: deal.target_yield,
                status: deal.status,
                invested_amount: amount,
                investment_count: count,
                remaining_capacity: deal.remaining_capacity(),
                last_invested_at: last,
            })
        })
        .collect();
    rows.sort_by(|a, b| {
        b.last_invested_at
            .cmp(&a.last_invested_at)
            .then_with(|| a.deal_id.cmp(&b.deal_id))
    });
    Ok(rows)
}

/// # Summary
/// 计算投资人仪表盘。
///
/// # Logic
/// 1. 持仓来自 `invested_deals`，总额与加权收益率由持仓推出。
/// 2. 行业分布按金额降序，百分比保留两位小数。
/// 3. 动态：每笔投资产生一条注资记录，已退款的再产生一条退款记录 (时间取 `updated_at`)，
///    新的在前，最多 `ACTIVITY_LIMIT` 条。
pub fn investor_dashboard(
    investments: &[Investment],
    deals: &[Deal],
) -> Result<InvestorDashboard, StatsError> {
    let holdings = invested_deals(investments, deals)?;
    let total_invested = checked_sum(holdings.iter().map(|h| h.invested_amount), "invested amount")?;

    let weights = holdings
        .iter()
        .map(|h| {
            h.invested_amount
                .checked_mul(h.target_yield)
                .ok_or(StatsError::Overflow("weighted yield"))
        })
        .collect::<Result<Vec<Decimal>, StatsError>>()?;
    let weighted = checked_sum(weights, "weighted yield")?;
    let average_yield = if total_invested.is_zero() {
        Decimal::ZERO
    } else {
        (weighted / total_invested).round_dp(2)
    };

    let mut sectors: HashMap<&str, Decimal> = HashMap::new();
    for h in &holdings {
        let slot = sectors.entry(h.sector.as_str()).or_default();
        *slot = slot
            .checked_add(h.invested_amount)
            .ok_or(StatsError::Overflow("sector amount"))?;
    }
    let mut allocation: Vec<SectorAllocation> = sectors
        .into_iter()
        .map(|(sector, amount)| SectorAllocation {
            sector: sector.to_string(),
            amount,
            percentage: percent(amount, total_invested),
        })
        .collect();
    allocation.sort_by(|a, b| b.amount.cmp(&a.amount).then_with(|| a.sector.cmp(&b.sector)));

    let names: HashMap<&str, &str> = deals
        .iter()
        .map(|d| (d.id.as_str(), d.name.as_str()))
        .collect();
    let mut activity = Vec::new();
    for inv in investments {
        let deal_name = names
            .get(inv.deal_id.as_str())
            .map(|n| n.to_string())
            .unwrap_or_default();
        activity.push(ActivityItem {
            kind: ActivityKind::Allocation,
            amount: inv.amount,
            deal_id: inv.deal_id.clone(),
            deal_name: deal_name.clone(),
            created_at: inv.created_at,
        });
        if inv.status == InvestmentStatus::Refunded {
            activity.push(ActivityItem {
                kind: ActivityKind::Refund,
                amount: inv.amount,
                deal_id: inv.deal_id.clone(),
                deal_name,
                created_at: inv.updated_at,
            });
        }
    }
    activity.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    activity.truncate(ACTIVITY_LIMIT);

    Ok(InvestorDashboard {
        total_invested,
        average_yield,
        active_deals: holdings.len(),
        allocation,
        recent_deals: holdings.into_iter().take(RECENT_DEALS_LIMIT).collect(),
        activity,
    })
}

/// # Summary
/// 计算 MSME 仪表盘。
///
/// # Arguments
/// * `deal`: MSME 名下的项目，可能尚未创建。
/// * `investments`: 该项目收到的全部投资，新的在前。
/// * `investors`: 相关投资人，用于补全名称。
pub fn msme_dashboard(
    deal: Option<&Deal>,
    investments: &[Investment],
    investors: &[User],
) -> MsmeDashboard {
    let Some(deal) = deal else {
        return MsmeDashboard {
            has_deal: false,
            deal_id: None,
            deal_name: None,
            status: None,
            facility_size: Decimal::ZERO,
            utilized_amount: Decimal::ZERO,
            remaining_capacity: Decimal::ZERO,
            utilization: Decimal::ZERO,
            investor_count: 0,
            recent_investments: Vec::new(),
        };
    };

    let names: HashMap<&str, &str> = investors
        .iter()
        .map(|u| (u.id.as_str(), u.name.as_str()))
        .collect();
    let investor_count = completed(investments)
        .map(|i| i.investor_id.as_str())
        .collect::<HashSet<_>>()
        .len();

    let mut recent: Vec<&Investment> = investments.iter().collect();
    recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let recent_investments = recent
        .into_iter()
        .take(RECENT_INVESTMENTS_LIMIT)
        .map(|i| ReceivedInvestment {
            id: i.id.clone(),
            investor_id: i.investor_id.clone(),
            investor_name: names
                .get(i.investor_id.as_str())
                .map(|n| n.to_string())
                .unwrap_or_default(),
            amount: i.amount,
            status: i.status,
            created_at: i.created_at,
        })
        .collect();

    MsmeDashboard {
        has_deal: true,
        deal_id: Some(deal.id.clone()),
        deal_name: Some(deal.name.clone()),
        status: Some(deal.status),
        facility_size: deal.facility_size,
        utilized_amount: deal.utilized_amount,
        remaining_capacity: deal.remaining_capacity(),
        utilization: deal.utilization(),
        investor_count,
        recent_investments,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deal::entity::DealDraft;
    use crate::user::entity::AccountType;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
    }

    fn deal(id: &str, sector: &str, facility: Decimal, yld: Decimal) -> Deal {
        DealDraft {
            name: format!("Deal {}", id),
            sector: sector.into(),
            facility_size: Some(facility),
            target_yield: Some(yld),
            ..Default::default()
        }
        .into_deal(id.into(), format!("owner-{}", id), t0())
        .unwrap()
    }

    fn inv(
        id: &str,
        investor: &str,
        deal_id: &str,
        amount: Decimal,
        status: InvestmentStatus,
        minutes: i64,
    ) -> Investment {
        let at = t0() + Duration::minutes(minutes);
        Investment {
            id: id.into(),
            investor_id: investor.into(),
            deal_id: deal_id.into(),
            amount,
            status,
            idempotency_key: None,
            created_at: at,
            updated_at: at + Duration::minutes(30),
        }
    }

    #[test]
    fn test_platform_overview_counts_only_completed() {
        let mut a = deal("a", "Retail", dec!(10000), dec!(10));
        a.utilized_amount = dec!(4000);
        let mut b = deal("b", "Agri", dec!(6000), dec!(12));
        b.utilized_amount = dec!(6000);
        b.status = DealStatus::Funded;

        let investments = vec![
            inv("1", "i1", "a", dec!(4000), InvestmentStatus::Completed, 1),
            inv("2", "i2", "b", dec!(6000), InvestmentStatus::Completed, 2),
            inv("3", "i3", "a", dec!(500), InvestmentStatus::Refunded, 3),
        ];
        let o = platform_overview(&[a, b], &investments).unwrap();

        assert_eq!(o.total_deals, 2);
        assert_eq!(o.open_deals, 1);
        assert_eq!(o.total_facility, dec!(16000));
        assert_eq!(o.total_utilized, dec!(10000));
        assert_eq!(o.total_remaining, dec!(6000));
        assert_eq!(o.utilization_rate, dec!(62.5));
        assert_eq!(o.total_investors, 2);
        assert_eq!(o.total_invested, dec!(10000));
    }

    #[test]
    fn test_platform_overview_reports_overflow_instead_of_panicking() {
        let mut a = deal("a", "Retail", dec!(1000), dec!(10));
        a.facility_size = Decimal::MAX;
        let mut b = deal("b", "Retail", dec!(1000), dec!(10));
        b.facility_size = Decimal::MAX;

        assert_eq!(
            platform_overview(&[a, b], &[]),
            Err(StatsError::Overflow("facility size"))
        );
    }

    #[test]
    fn test_investor_dashboard_weighted_yield_and_sectors() {
        let deals = vec![
            deal("a", "Retail", dec!(10000), dec!(10)),
            deal("b", "Agri", dec!(10000), dec!(14)),
        ];
        let investments = vec![
            inv("1", "i1", "a", dec!(1000), InvestmentStatus::Completed, 1),
            inv("2", "i1", "b", dec!(3000), InvestmentStatus::Completed, 2),
            inv("3", "i1", "a", dec!(2000), InvestmentStatus::Refunded, 3),
        ];
        let d = investor_dashboard(&investments, &deals).unwrap();

        assert_eq!(d.total_invested, dec!(4000));
        // (1000 * 10 + 3000 * 14) / 4000
        assert_eq!(d.average_yield, dec!(13));
        assert_eq!(d.active_deals, 2);
        assert_eq!(d.allocation[0].sector, "Agri");
        assert_eq!(d.allocation[0].percentage, dec!(75));
        assert_eq!(d.allocation[1].percentage, dec!(25));
        assert_eq!(d.recent_deals[0].deal_id, "b");

        // 3 笔注资 + 1 笔退款
        assert_eq!(d.activity.len(), 4);
        assert_eq!(d.activity[0].kind, ActivityKind::Refund);
        assert_eq!(d.activity[0].deal_name, "Deal a");
    }

    #[test]
    fn test_investor_dashboard_limits() {
        let deals: Vec<Deal> = (0..8)
            .map(|n| deal(&format!("d{}", n), "Retail", dec!(1000), dec!(9)))
            .collect();
        let investments: Vec<Investment> = (0..12)
            .map(|n| {
                inv(
                    &n.to_string(),
                    "i1",
                    &format!("d{}", n % 8),
                    dec!(10),
                    InvestmentStatus::Completed,
                    n,
                )
            })
            .collect();
        let d = investor_dashboard(&investments, &deals).unwrap();
        assert_eq!(d.recent_deals.len(), RECENT_DEALS_LIMIT);
        assert_eq!(d.activity.len(), ACTIVITY_LIMIT);
        assert_eq!(d.active_deals, 8);
    }

    #[test]
    fn test_empty_investor_dashboard() {
        let d = investor_dashboard(&[], &[]).unwrap();
        assert_eq!(d.total_invested, Decimal::ZERO);
        assert_eq!(d.average_yield, Decimal::ZERO);
        assert!(d.allocation.is_empty());
    }

    #[test]
    fn test_msme_dashboard() {
        let empty = msme_dashboard(None, &[], &[]);
        assert!(!empty.has_deal);

        let mut d = deal("a", "Retail", dec!(10000), dec!(10));
        d.utilized_amount = dec!(2500);
        let investor = User::new(
            "i1".into(),
            "i1@example.com".into(),
            "h".into(),
            "Ivy".into(),
            AccountType::Investor,
            t0(),
        );
        let investments = vec![
            inv("1", "i1", "a", dec!(2000), InvestmentStatus::Completed, 1),
            inv("2", "i1", "a", dec!(500), InvestmentStatus::Completed, 2),
        ];
        let m = msme_dashboard(Some(&d), &investments, &[investor]);
        assert!(m.has_deal);
        assert_eq!(m.remaining_capacity, dec!(7500));
        assert_eq!(m.utilization, dec!(25));
        assert_eq!(m.investor_count, 1);
        assert_eq!(m.recent_investments[0].id, "2");
        assert_eq!(m.recent_investments[0].investor_name, "Ivy");
    }
}
