use super::error::StoreError;
use crate::deal::entity::Deal;
use crate::user::entity::User;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// # Summary
/// 一次性令牌的用途。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    // 忘记密码后的重置链接
    PasswordReset,
    // 注册后的邮箱验证
    EmailVerification,
    // 修改邮箱后的新地址确认
    EmailChange,
}

impl FromStr for TokenPurpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "password_reset" => Ok(TokenPurpose::PasswordReset),
            "email_verification" => Ok(TokenPurpose::EmailVerification),
            "email_change" => Ok(TokenPurpose::EmailChange),
            _ => Err(format!("Unknown token purpose: {}", s)),
        }
    }
}

impl std::fmt::Display for TokenPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenPurpose::PasswordReset => write!(f, "password_reset"),
            TokenPurpose::EmailVerification => write!(f, "email_verification"),
            TokenPurpose::EmailChange => write!(f, "email_change"),
        }
    }
}

/// # Summary
/// 一次性令牌记录。
///
/// # Invariants
/// - 只保存令牌明文的 SHA-256 摘要 (`token_hash`)，明文只出现在邮件里。
/// - 被消费后立即删除，过期令牌不可消费。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationToken {
    // 令牌摘要 (hex)
    pub token_hash: String,
    // 归属用户
    pub user_id: String,
    pub purpose: TokenPurpose,
    // 附加数据 (邮箱变更时为新邮箱)
    pub payload: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// # Summary
/// 用户存储接口。
///
/// # Invariants
/// - 不提供修改余额的方法，余额只能经由 `LedgerStore` 在事务内变动。
#[async_trait]
pub trait UserStore: Send + Sync {
    /// # Summary
    /// 根据 ID 获取用户。
    ///
    /// # Returns
    /// 存在返回 `Some(User)`，否则返回 `None`。
    async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError>;

    /// # Summary
    /// 根据规范化邮箱查找用户。
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// # Summary
    /// 批量获取用户，不存在的 ID 被忽略。
    async fn find_users(&self, ids: &[String]) -> Result<Vec<User>, StoreError>;

    /// # Summary
    /// 插入新用户。
    ///
    /// # Returns
    /// 邮箱已被占用时返回 `StoreError::Conflict`。
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;

    /// # Summary
    /// 更新资料字段：邮箱、名称、简介、头像、待确认邮箱、验证状态。
    ///
    /// # Logic
    /// 不触碰余额、密码与项目绑定，避免覆盖并发的记账结果。
    ///
    /// # Returns
    /// 新邮箱与他人冲突时返回 `StoreError::Conflict`，用户不存在返回 `StoreError::NotFound`。
    async fn update_profile(&self, user: &User) -> Result<(), StoreError>;

    /// # Summary
    /// 替换密码哈希。
    async fn update_password(
        &self,
        user_id: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// # Summary
    /// 删除用户及其未消费的令牌。
    async fn delete_user(&self, user_id: &str) -> Result<(), StoreError>;
}

/// # Summary
/// 融资项目存储接口。额度字段的变动由 `LedgerStore` 负责。
#[async_trait]
pub trait DealStore: Send + Sync {
    /// 按创建时间倒序列出全部项目
    async fn list_deals(&self) -> Result<Vec<Deal>, StoreError>;

    /// 获取单个项目
    async fn get_deal(&self, id: &str) -> Result<Option<Deal>, StoreError>;

    /// # Summary
    /// 为 MSME 创建项目并绑定到其账户。
    ///
    /// # Logic
    /// 在同一事务内插入项目并设置 `users.deal_id`；若该用户已绑定项目则整体回滚。
    ///
    /// # Returns
    /// 已有项目时返回 `StoreError::Conflict`，用户不存在返回 `StoreError::NotFound`。
    async fn create_deal(&self, deal: &Deal) -> Result<(), StoreError>;
}

/// # Summary
/// 一次性令牌存储接口。
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// 保存新令牌，并作废该用户同用途的旧令牌
    async fn issue_token(&self, token: &VerificationToken) -> Result<(), StoreError>;

    /// # Summary
    /// 消费令牌。
    ///
    /// # Logic
    /// 1. 按摘要与用途查找并删除记录。
    /// 2. 若已过期则视为不存在。
    ///
    /// # Returns
    /// 有效时返回令牌记录，否则 `None`。
    async fn consume_token(
        &self,
        token_hash: &str,
        purpose: TokenPurpose,
        now: DateTime<Utc>,
    ) -> Result<Option<VerificationToken>, StoreError>;
}
