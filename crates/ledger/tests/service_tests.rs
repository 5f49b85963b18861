use chrono::{TimeZone, Utc};
use fintechos_core::common::time::{FakeClockProvider, RealTimeProvider, TimeProvider};
use fintechos_core::deal::entity::{DealDraft, DealStatus};
use fintechos_core::ledger::entity::{InvestmentStatus, LedgerAction, MAX_ALLOCATION_AMOUNT};
use fintechos_core::ledger::port::{AllocationPort, LedgerError, LedgerStore};
use fintechos_core::store::port::{DealStore, UserStore};
use fintechos_core::user::entity::{AccountType, User};
use fintechos_ledger::{AllocationService, MemoryLedgerStore};
use fintechos_store::Database;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

fn investor(id: &str, balance: Decimal) -> User {
    let mut u = User::new(
        id.into(),
        format!("{}@example.com", id),
        "h".into(),
        id.into(),
        AccountType::Investor,
        Utc::now(),
    );
    u.balance = balance;
    u
}

fn memory_service(facility: Decimal, balance: Decimal) -> (Arc<MemoryLedgerStore>, AllocationService) {
    let store = Arc::new(MemoryLedgerStore::new());
    store.insert_user(investor("i1", balance));
    let deal = DealDraft {
        name: "Sunrise Textiles".into(),
        sector: "Manufacturing".into(),
        facility_size: Some(facility),
        target_yield: Some(dec!(13.5)),
        ..Default::default()
    }
    .into_deal("d1".into(), "m1".into(), Utc::now())
    .unwrap();
    store.insert_deal(deal);

    let service = AllocationService::new(
        store.clone(),
        Arc::new(RealTimeProvider),
        MAX_ALLOCATION_AMOUNT,
    );
    (store, service)
}

#[tokio::test]
async fn test_amount_guardrails_are_enforced_before_store() {
    let (store, service) = memory_service(dec!(10000), dec!(5000));

    // Case 1: 非正数
    let err = service.allocate("i1", "d1", dec!(0), None).await.unwrap_err();
    assert_eq!(err.to_string(), "Please enter a valid amount to allocate.");

    // Case 2: 三位小数
    let err = service.allocate("i1", "d1", dec!(1.005), None).await.unwrap_err();
    assert_eq!(err.to_string(), "Please limit amounts to 2 decimal places.");

    // Case 3: 超过护栏
    let err = service
        .allocate("i1", "d1", dec!(1000000000.01), None)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Please enter an amount under $1,000,000,000.00.");

    // Case 4: 非法幂等键
    let long_key = "k".repeat(200);
    let err = service
        .allocate("i1", "d1", dec!(10), Some(&long_key))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidIdempotencyKey(_)));

    // Case 5: 充值走同一套护栏，但提示语针对充值
    let err = service.top_up("i1", dec!(0)).await.unwrap_err();
    assert_eq!(err.to_string(), "Please enter a valid amount to add.");
    let err = service.top_up("i1", dec!(-20)).await.unwrap_err();
    assert_eq!(err.to_string(), "Please enter a valid amount to add.");
    let err = service.top_up("i1", dec!(5.555)).await.unwrap_err();
    assert_eq!(err.to_string(), "Please limit amounts to 2 decimal places.");

    assert_eq!(store.user("i1").await.unwrap().balance, dec!(5000));
    assert!(store.all_investments().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_capacity_message_and_trailing_zero_normalisation() {
    let (store, service) = memory_service(dec!(1000), dec!(5000));

    let r = service.allocate("i1", "d1", dec!(250.50), None).await.unwrap();
    assert_eq!(r.investment.amount, dec!(250.5));
    assert_eq!(r.deal.remaining_capacity(), dec!(749.5));

    let err = service.allocate("i1", "d1", dec!(800), None).await.unwrap_err();
    assert_eq!(err.to_string(), "Amount exceeds remaining capacity of $749.50.");

    let deal = store.deal("d1").await.unwrap();
    assert_eq!(deal.utilized_amount, dec!(250.5));
}

#[tokio::test]
async fn test_blank_idempotency_key_is_ignored() {
    let (_store, service) = memory_service(dec!(1000), dec!(5000));

    let a = service.allocate("i1", "d1", dec!(10), Some("   ")).await.unwrap();
    let b = service.allocate("i1", "d1", dec!(10), Some("   ")).await.unwrap();
    assert_ne!(a.investment.id, b.investment.id);
    assert!(a.investment.idempotency_key.is_none());

    let c = service.allocate("i1", "d1", dec!(10), Some(" retry-7 ")).await.unwrap();
    let d = service.allocate("i1", "d1", dec!(10), Some("retry-7")).await.unwrap();
    assert!(d.replayed);
    assert_eq!(c.investment.id, d.investment.id);
    assert_eq!(d.investor.balance, dec!(4970));
}

#[tokio::test]
async fn test_refund_and_top_up_use_injected_clock() {
    let store = Arc::new(MemoryLedgerStore::new());
    store.insert_user(investor("i1", dec!(0)));
    store.insert_deal(
        DealDraft {
            name: "Green Grocer".into(),
            sector: "Retail".into(),
            facility_size: Some(dec!(300)),
            ..Default::default()
        }
        .into_deal("d1".into(), "m1".into(), Utc::now())
        .unwrap(),
    );
    let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
    let clock = Arc::new(FakeClockProvider::new(t0));
    let service = AllocationService::new(store.clone(), clock.clone(), MAX_ALLOCATION_AMOUNT);

    let receipt = service.top_up("i1", dec!(500)).await.unwrap();
    assert_eq!(receipt.user.balance, dec!(500));
    assert_eq!(receipt.entry.action, LedgerAction::TopUp);
    assert_eq!(receipt.entry.created_at, t0);

    let r = service.allocate("i1", "d1", dec!(300), None).await.unwrap();
    assert_eq!(r.deal.status, DealStatus::Funded);

    clock.advance(chrono::Duration::hours(2));
    let refunded = service.refund("i1", &r.investment.id).await.unwrap();
    assert_eq!(refunded.investment.status, InvestmentStatus::Refunded);
    assert_eq!(refunded.investment.updated_at, clock.now());
    assert_eq!(refunded.deal.status, DealStatus::Open);
    assert_eq!(refunded.investor.balance, dec!(500));

    let entries = service.ledger_entries("i1").await.unwrap();
    let actions: Vec<LedgerAction> = entries.iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![LedgerAction::Refund, LedgerAction::Allocation, LedgerAction::TopUp]
    );
}

#[tokio::test]
async fn test_memory_store_concurrent_allocations() {
    let store = Arc::new(MemoryLedgerStore::new());
    for n in 0..5 {
        store.insert_user(investor(&format!("i{}", n), dec!(1000)));
    }
    store.insert_deal(
        DealDraft {
            name: "Bulk Deal".into(),
            sector: "Logistics".into(),
            facility_size: Some(dec!(500)),
            ..Default::default()
        }
        .into_deal("d1".into(), "m1".into(), Utc::now())
        .unwrap(),
    );
    let service = Arc::new(AllocationService::new(
        store.clone(),
        Arc::new(RealTimeProvider),
        MAX_ALLOCATION_AMOUNT,
    ));

    let mut handles = vec![];
    for n in 0..40 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service
                .allocate(&format!("i{}", n % 5), "d1", dec!(30), None)
                .await
                .is_ok()
        }));
    }
    let mut ok = 0;
    for h in handles {
        if h.await.unwrap() {
            ok += 1;
        }
    }

    // 500 / 30 = 16 笔
    assert_eq!(ok, 16);
    let deal = store.deal("d1").await.unwrap();
    assert_eq!(deal.utilized_amount, dec!(480));
    assert!(deal.utilized_amount <= deal.facility_size);
}

#[tokio::test]
async fn test_service_over_sqlite_store() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let db = Database::open_at(tmp.path()).await?;
    let users = db.user_store();
    users.insert_user(&investor("i1", Decimal::ZERO)).await?;
    users
        .insert_user(&User::new(
            "m1".into(),
            "m1@example.com".into(),
            "h".into(),
            "M".into(),
            AccountType::Msme,
            Utc::now(),
        ))
        .await?;
    let deal = DealDraft {
        name: "Coastal Crafts".into(),
        sector: "Retail".into(),
        ..Default::default()
    }
    .into_deal("d1".into(), "m1".into(), Utc::now())
    .map_err(anyhow::Error::msg)?;
    db.deal_store().create_deal(&deal).await?;

    let service = AllocationService::new(
        Arc::new(db.ledger_store()),
        Arc::new(RealTimeProvider),
        MAX_ALLOCATION_AMOUNT,
    );
    service.top_up("i1", dec!(2000)).await?;
    let r = service.allocate("i1", "d1", dec!(1500), Some("abc")).await?;
    assert_eq!(r.deal.remaining_capacity(), dec!(8500));
    assert_eq!(service.investments_by_deal("d1").await?.len(), 1);
    assert_eq!(service.investments_by_investor("i1").await?.len(), 1);

    let err = service.allocate("i1", "d1", dec!(600), None).await;
    assert!(matches!(err, Err(LedgerError::InsufficientFunds { .. })));
    Ok(())
}
