use chrono::Utc;
use fintechos_core::deal::entity::{DealDraft, DealStatus};
use fintechos_core::ledger::entity::{AllocationCommand, InvestmentStatus, LedgerAction};
use fintechos_core::ledger::port::{LedgerError, LedgerStore};
use fintechos_core::store::port::{DealStore, UserStore};
use fintechos_core::user::entity::{AccountType, User};
use fintechos_store::Database;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tempfile::{TempDir, tempdir};

/// 建库并准备一个 MSME 项目 (额度 `facility`) 与若干投资人
async fn setup(facility: Decimal, investors: &[(&str, Decimal)]) -> anyhow::Result<(TempDir, Database)> {
    let tmp = tempdir()?;
    let db = Database::open_at(tmp.path()).await?;
    let users = db.user_store();
    let ledger = db.ledger_store();
    let now = Utc::now();

    users
        .insert_user(&User::new(
            "m1".into(),
            "m1@example.com".into(),
            "h".into(),
            "Harbor Foods".into(),
            AccountType::Msme,
            now,
        ))
        .await?;
    let deal = DealDraft {
        name: "Harbor Foods".into(),
        sector: "Food".into(),
        facility_size: Some(facility),
        target_yield: Some(dec!(12)),
        ..Default::default()
    }
    .into_deal("d1".into(), "m1".into(), now)
    .map_err(anyhow::Error::msg)?;
    db.deal_store().create_deal(&deal).await?;

    for (id, balance) in investors {
        users
            .insert_user(&User::new(
                id.to_string(),
                format!("{}@example.com", id),
                "h".into(),
                id.to_string(),
                AccountType::Investor,
                now,
            ))
            .await?;
        if *balance > Decimal::ZERO {
            ledger.top_up(id, *balance, now).await?;
        }
    }
    Ok((tmp, db))
}

fn cmd(id: &str, investor: &str, amount: Decimal, key: Option<&str>) -> AllocationCommand {
    AllocationCommand {
        investment_id: id.into(),
        investor_id: investor.into(),
        deal_id: "d1".into(),
        amount,
        idempotency_key: key.map(str::to_string),
        now: Utc::now(),
    }
}

#[tokio::test]
async fn test_allocate_moves_balance_capacity_and_ledger() -> anyhow::Result<()> {
    let (_tmp, db) = setup(dec!(10000), &[("i1", dec!(5000))]).await?;
    let ledger = db.ledger_store();

    let receipt = ledger.allocate(&cmd("inv1", "i1", dec!(2500), None)).await?;
    assert!(!receipt.replayed);
    assert_eq!(receipt.investor.balance, dec!(2500));
    assert_eq!(receipt.deal.utilized_amount, dec!(2500));
    assert_eq!(receipt.deal.remaining_capacity(), dec!(7500));

    // 持久化结果与回执一致
    let deal = db.deal_store().get_deal("d1").await?.expect("deal");
    assert_eq!(deal.utilized_amount, dec!(2500));
    let investor = db.user_store().get_user("i1").await?.expect("i1");
    assert_eq!(investor.balance, dec!(2500));

    let entries = ledger.entries_for_user("i1").await?;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].action, LedgerAction::Allocation);
    assert_eq!(entries[0].balance_change, dec!(-2500));
    assert_eq!(entries[0].capacity_change, dec!(2500));
    assert_eq!(entries[0].balance_after, dec!(2500));
    assert_eq!(entries[1].action, LedgerAction::TopUp);
    Ok(())
}

#[tokio::test]
async fn test_allocate_rejections_leave_no_trace() -> anyhow::Result<()> {
    let (_tmp, db) = setup(dec!(1000), &[("i1", dec!(5000)), ("poor", dec!(100))]).await?;
    let ledger = db.ledger_store();

    // Case 1: 超出剩余额度
    let err = ledger.allocate(&cmd("x1", "i1", dec!(1000.01), None)).await;
    match err {
        Err(LedgerError::CapacityExceeded { remaining, .. }) => assert_eq!(remaining, dec!(1000)),
        other => panic!("unexpected: {:?}", other.map(|r| r.investment.id)),
    }

    // Case 2: 余额不足
    let err = ledger.allocate(&cmd("x2", "poor", dec!(500), None)).await;
    assert!(matches!(err, Err(LedgerError::InsufficientFunds { .. })));

    // Case 3: MSME 不能注资
    let err = ledger.allocate(&cmd("x3", "m1", dec!(10), None)).await;
    assert!(matches!(err, Err(LedgerError::NotInvestor)));

    // Case 4: 项目不存在
    let mut missing = cmd("x4", "i1", dec!(10), None);
    missing.deal_id = "nope".into();
    assert!(matches!(ledger.allocate(&missing).await, Err(LedgerError::DealNotFound(_))));

    let deal = db.deal_store().get_deal("d1").await?.expect("deal");
    assert_eq!(deal.utilized_amount, Decimal::ZERO);
    assert!(ledger.investments_by_deal("d1").await?.is_empty());
    assert_eq!(db.user_store().get_user("poor").await?.expect("poor").balance, dec!(100));
    Ok(())
}

#[tokio::test]
async fn test_fill_to_funded_then_refund_reopens() -> anyhow::Result<()> {
    let (_tmp, db) = setup(dec!(1000), &[("i1", dec!(5000))]).await?;
    let ledger = db.ledger_store();

    ledger.allocate(&cmd("a", "i1", dec!(400), None)).await?;
    let full = ledger.allocate(&cmd("b", "i1", dec!(600), None)).await?;
    assert_eq!(full.deal.status, DealStatus::Funded);
    assert_eq!(full.deal.remaining_capacity(), Decimal::ZERO);

    let err = ledger.allocate(&cmd("c", "i1", dec!(1), None)).await;
    assert!(matches!(err, Err(LedgerError::DealNotOpen)));

    let refunded = ledger.refund("a", "i1", Utc::now()).await?;
    assert_eq!(refunded.investment.status, InvestmentStatus::Refunded);
    assert_eq!(refunded.deal.status, DealStatus::Open);
    assert_eq!(refunded.deal.utilized_amount, dec!(600));
    assert_eq!(refunded.investor.balance, dec!(4400));

    // 重复退款与他人退款
    assert!(matches!(
        ledger.refund("a", "i1", Utc::now()).await,
        Err(LedgerError::InvalidInvestmentStatus)
    ));
    assert!(matches!(
        ledger.refund("b", "m1", Utc::now()).await,
        Err(LedgerError::NotOwner)
    ));
    assert!(matches!(
        ledger.refund("zzz", "i1", Utc::now()).await,
        Err(LedgerError::InvestmentNotFound(_))
    ));

    let entries = ledger.entries_for_user("i1").await?;
    assert_eq!(entries[0].action, LedgerAction::Refund);
    assert_eq!(entries[0].capacity_change, dec!(-400));
    Ok(())
}

#[tokio::test]
async fn test_idempotent_replay_and_conflict() -> anyhow::Result<()> {
    let (_tmp, db) = setup(dec!(10000), &[("i1", dec!(5000))]).await?;
    let ledger = db.ledger_store();

    let first = ledger.allocate(&cmd("k1", "i1", dec!(100), Some("req-1"))).await?;
    let again = ledger.allocate(&cmd("k2", "i1", dec!(100.00), Some("req-1"))).await?;
    assert!(again.replayed);
    assert_eq!(again.investment.id, first.investment.id);
    assert_eq!(again.investor.balance, dec!(4900));
    assert_eq!(ledger.investments_by_investor("i1").await?.len(), 1);

    let conflict = ledger.allocate(&cmd("k3", "i1", dec!(200), Some("req-1"))).await;
    assert!(matches!(conflict, Err(LedgerError::IdempotencyConflict)));
    Ok(())
}

#[tokio::test]
async fn test_concurrent_allocations_never_exceed_facility() -> anyhow::Result<()> {
    let investors: Vec<(String, Decimal)> =
        (0..10).map(|i| (format!("i{}", i), dec!(1000))).collect();
    let refs: Vec<(&str, Decimal)> = investors.iter().map(|(id, b)| (id.as_str(), *b)).collect();
    let (_tmp, db) = setup(dec!(1000), &refs).await?;
    let ledger = Arc::new(db.ledger_store());

    // 50 个并发请求争抢 1000 的额度，每笔 75
    let mut handles = vec![];
    for n in 0..50 {
        let ledger = ledger.clone();
        let investor = format!("i{}", n % 10);
        handles.push(tokio::spawn(async move {
            ledger
                .allocate(&cmd(&format!("inv{}", n), &investor, dec!(75), None))
                .await
        }));
    }

    let mut ok = 0;
    for h in handles {
        match h.await? {
            Ok(_) => ok += 1,
            Err(LedgerError::CapacityExceeded { .. }) | Err(LedgerError::DealNotOpen) => {}
            Err(e) => return Err(e.into()),
        }
    }

    // 1000 / 75 = 13 笔
    assert_eq!(ok, 13);
    let deal = db.deal_store().get_deal("d1").await?.expect("deal");
    assert_eq!(deal.utilized_amount, dec!(975));
    assert!(deal.utilized_amount <= deal.facility_size);

    let total: Decimal = ledger
        .investments_by_deal("d1")
        .await?
        .iter()
        .map(|i| i.amount)
        .sum();
    assert_eq!(total, deal.utilized_amount);
    Ok(())
}
