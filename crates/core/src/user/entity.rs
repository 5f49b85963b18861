use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;

/// # Summary
/// 账户类型：出资方 (Investor) 或融资方 (MSME，中小微企业)。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    /// 投资人，可向项目注资
    Investor,
    /// 中小微企业，可发布一个融资项目
    Msme,
}

impl FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "investor" => Ok(AccountType::Investor),
            "msme" | "business" => Ok(AccountType::Msme),
            _ => Err(format!("Unknown account type: {}", s)),
        }
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountType::Investor => write!(f, "investor"),
            AccountType::Msme => write!(f, "msme"),
        }
    }
}

/// # Summary
/// 平台用户实体。
///
/// # Invariants
/// - `id` 全局唯一，`email` 规范化 (小写) 后全局唯一。
/// - `balance` 永远非负，只能通过账本端口 (`LedgerStore`) 原子修改。
/// - 仅 `Msme` 用户可能持有 `deal_id`。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    // 用户唯一标识 (uuid)
    pub id: String,
    // 登录邮箱 (小写)
    pub email: String,
    // bcrypt 哈希
    pub password_hash: String,
    // 显示名称
    pub name: String,
    // 可用余额
    pub balance: Decimal,
    pub account_type: AccountType,
    // MSME 名下的项目
    pub deal_id: Option<String>,
    pub about: Option<String>,
    pub avatar_url: Option<String>,
    // 待确认的新邮箱
    pub pending_email: Option<String>,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// # Logic
    /// 以零余额、未验证邮箱的状态创建新用户。
    pub fn new(
        id: String,
        email: String,
        password_hash: String,
        name: String,
        account_type: AccountType,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            email,
            password_hash,
            name,
            balance: Decimal::ZERO,
            account_type,
            deal_id: None,
            about: None,
            avatar_url: None,
            pending_email: None,
            email_verified: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_investor(&self) -> bool {
        self.account_type == AccountType::Investor
    }

    pub fn is_msme(&self) -> bool {
        self.account_type == AccountType::Msme
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_type_parse_and_display() {
        assert_eq!("investor".parse::<AccountType>(), Ok(AccountType::Investor));
        assert_eq!(" MSME ".parse::<AccountType>(), Ok(AccountType::Msme));
        assert!("admin".parse::<AccountType>().is_err());
        assert_eq!(AccountType::Msme.to_string(), "msme");
    }

    #[test]
    fn test_new_user_starts_empty() {
        let user = User::new(
            "u1".into(),
            "a@b.co".into(),
            "hash".into(),
            "Alice".into(),
            AccountType::Investor,
            Utc::now(),
        );
        assert!(user.is_investor());
        assert_eq!(user.balance, Decimal::ZERO);
        assert!(!user.email_verified);
        assert!(user.deal_id.is_none());
    }
}
