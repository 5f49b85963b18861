use chrono::{Duration, Utc};
use fintechos_core::deal::entity::{Cashflow, CashflowStatus, DealDraft, DealStatus};
use fintechos_core::store::error::StoreError;
use fintechos_core::store::port::{
    DealStore, TokenPurpose, TokenStore, UserStore, VerificationToken,
};
use fintechos_core::user::entity::{AccountType, User};
use fintechos_store::Database;
use rust_decimal_macros::dec;
use tempfile::tempdir;

fn user(id: &str, email: &str, account_type: AccountType) -> User {
    User::new(
        id.into(),
        email.into(),
        "$2b$04$hash".into(),
        format!("User {}", id),
        account_type,
        Utc::now(),
    )
}

#[tokio::test]
async fn test_user_store_roundtrip_and_conflicts() -> anyhow::Result<()> {
    let tmp = tempdir()?;
    let db = Database::open_at(tmp.path()).await?;
    let users = db.user_store();

    users.insert_user(&user("u1", "alice@example.com", AccountType::Investor)).await?;
    users.insert_user(&user("u2", "bob@example.com", AccountType::Msme)).await?;

    // Case 1: 重复邮箱
    let dup = users
        .insert_user(&user("u3", "alice@example.com", AccountType::Investor))
        .await;
    assert!(matches!(dup, Err(StoreError::Conflict(_))));

    // Case 2: 按邮箱与批量查询
    let alice = users.find_user_by_email("alice@example.com").await?.expect("alice");
    assert_eq!(alice.id, "u1");
    assert_eq!(alice.balance, dec!(0));
    let found = users
        .find_users(&["u1".to_string(), "u2".to_string(), "ghost".to_string()])
        .await?;
    assert_eq!(found.len(), 2);
    assert!(users.find_users(&[]).await?.is_empty());

    // Case 3: 资料更新不会改动余额，改成他人邮箱冲突
    let mut profile = alice.clone();
    profile.name = "Alice A.".into();
    profile.about = Some("Angel investor".into());
    profile.pending_email = Some("alice@new.example.com".into());
    profile.balance = dec!(999999);
    users.update_profile(&profile).await?;
    let reloaded = users.get_user("u1").await?.expect("u1");
    assert_eq!(reloaded.name, "Alice A.");
    assert_eq!(reloaded.pending_email.as_deref(), Some("alice@new.example.com"));
    assert_eq!(reloaded.balance, dec!(0));

    profile.email = "bob@example.com".into();
    assert!(matches!(users.update_profile(&profile).await, Err(StoreError::Conflict(_))));

    // Case 4: 改密码与删除
    users.update_password("u1", "new-hash", Utc::now()).await?;
    assert_eq!(users.get_user("u1").await?.expect("u1").password_hash, "new-hash");
    users.delete_user("u1").await?;
    assert!(users.get_user("u1").await?.is_none());
    assert!(matches!(users.delete_user("u1").await, Err(StoreError::NotFound)));
    Ok(())
}

#[tokio::test]
async fn test_deal_store_links_owner_once() -> anyhow::Result<()> {
    let tmp = tempdir()?;
    let db = Database::open_at(tmp.path()).await?;
    let users = db.user_store();
    let deals = db.deal_store();
    users.insert_user(&user("m1", "msme@example.com", AccountType::Msme)).await?;

    let now = Utc::now();
    let draft = DealDraft {
        name: "Harbor Foods".into(),
        sector: "Food".into(),
        location: Some("Lagos".into()),
        facility_size: Some(dec!(25000)),
        target_yield: Some(dec!(11.4)),
        tenor_months: Some(12),
        cashflows: vec![Cashflow {
            date: (now + Duration::days(30)).date_naive(),
            amount: dec!(2500),
            status: CashflowStatus::Scheduled,
        }],
        ..Default::default()
    };
    let deal = draft
        .clone()
        .into_deal("d1".into(), "m1".into(), now)
        .map_err(anyhow::Error::msg)?;
    deals.create_deal(&deal).await?;

    let stored = deals.get_deal("d1").await?.expect("deal");
    assert_eq!(stored.facility_size, dec!(25000));
    assert_eq!(stored.target_yield, dec!(11.4));
    assert_eq!(stored.tenor_months, Some(12));
    assert_eq!(stored.status, DealStatus::Open);
    assert_eq!(stored.cashflows.len(), 1);
    assert_eq!(stored.location.as_deref(), Some("Lagos"));
    assert_eq!(
        users.get_user("m1").await?.expect("m1").deal_id.as_deref(),
        Some("d1")
    );

    // 第二个项目被拒绝，且没有残留记录
    let second = draft
        .into_deal("d2".into(), "m1".into(), now + Duration::seconds(1))
        .map_err(anyhow::Error::msg)?;
    assert!(matches!(deals.create_deal(&second).await, Err(StoreError::Conflict(_))));
    assert!(deals.get_deal("d2").await?.is_none());
    assert_eq!(deals.list_deals().await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_token_store_single_use_and_expiry() -> anyhow::Result<()> {
    let tmp = tempdir()?;
    let db = Database::open_at(tmp.path()).await?;
    db.user_store()
        .insert_user(&user("u1", "t@example.com", AccountType::Investor))
        .await?;
    let tokens = db.token_store();
    let now = Utc::now();

    let token = |hash: &str, ttl: i64| VerificationToken {
        token_hash: hash.into(),
        user_id: "u1".into(),
        purpose: TokenPurpose::PasswordReset,
        payload: None,
        expires_at: now + Duration::seconds(ttl),
        created_at: now,
    };

    tokens.issue_token(&token("h1", 3600)).await?;
    // 重新签发会作废旧令牌
    tokens.issue_token(&token("h2", 3600)).await?;
    assert!(tokens.consume_token("h1", TokenPurpose::PasswordReset, now).await?.is_none());

    // 用途不匹配不可消费
    assert!(tokens.consume_token("h2", TokenPurpose::EmailChange, now).await?.is_none());
    let consumed = tokens.consume_token("h2", TokenPurpose::PasswordReset, now).await?;
    assert_eq!(consumed.map(|t| t.user_id), Some("u1".to_string()));
    // 一次性
    assert!(tokens.consume_token("h2", TokenPurpose::PasswordReset, now).await?.is_none());

    // 过期
    tokens.issue_token(&token("h3", 60)).await?;
    let later = now + Duration::seconds(61);
    assert!(tokens.consume_token("h3", TokenPurpose::PasswordReset, later).await?.is_none());
    Ok(())
}
