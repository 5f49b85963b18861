use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fintechos_core::store::error::StoreError;
use fintechos_core::store::port::{TokenPurpose, TokenStore, VerificationToken};
use sqlx::{Row, SqlitePool};

use crate::database::{db_err, parse_enum};

/// # Summary
/// `TokenStore` 的 SQLite 实现。
///
/// # Invariants
/// - 同一用户同一用途同时至多一枚有效令牌。
pub struct SqliteTokenStore {
    pool: SqlitePool,
}

impl SqliteTokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for SqliteTokenStore {
    async fn issue_token(&self, token: &VerificationToken) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query("DELETE FROM verification_tokens WHERE user_id = ? AND purpose = ?")
            .bind(&token.user_id)
            .bind(token.purpose.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        sqlx::query(
            r#"
            INSERT INTO verification_tokens (token_hash, user_id, purpose, payload, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&token.token_hash)
        .bind(&token.user_id)
        .bind(token.purpose.to_string())
        .bind(&token.payload)
        .bind(token.expires_at)
        .bind(token.created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    /// # Logic
    /// 先删后判：无论是否过期，命中的记录都被删除，过期则返回 `None`。
    async fn consume_token(
        &self,
        token_hash: &str,
        purpose: TokenPurpose,
        now: DateTime<Utc>,
    ) -> Result<Option<VerificationToken>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let row = sqlx::query(
            r#"
            SELECT token_hash, user_id, purpose, payload, expires_at, created_at
            FROM verification_tokens WHERE token_hash = ? AND purpose = ?
            "#,
        )
        .bind(token_hash)
        .bind(purpose.to_string())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM verification_tokens WHERE token_hash = ?")
            .bind(token_hash)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;

        let stored_purpose: String = row.try_get("purpose").map_err(db_err)?;
        let token = VerificationToken {
            token_hash: row.try_get("token_hash").map_err(db_err)?,
            user_id: row.try_get("user_id").map_err(db_err)?,
            purpose: parse_enum(&stored_purpose)?,
            payload: row.try_get("payload").map_err(db_err)?,
            expires_at: row.try_get("expires_at").map_err(db_err)?,
            created_at: row.try_get("created_at").map_err(db_err)?,
        };

        if token.expires_at <= now {
            return Ok(None);
        }
        Ok(Some(token))
    }
}
