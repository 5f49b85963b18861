use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fintechos_core::store::error::StoreError;
use fintechos_core::store::port::UserStore;
use fintechos_core::user::entity::User;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool, sqlite::SqliteRow};

use crate::database::{db_err, parse_decimal, parse_enum, write_err};

macro_rules! user_columns {
    () => {
        "id, email, password_hash, name, balance, account_type, deal_id, about, avatar_url, \
         pending_email, email_verified, created_at, updated_at"
    };
}

const SELECT_USER_BY_ID: &str = concat!("SELECT ", user_columns!(), " FROM users WHERE id = ?");

const EMAIL_TAKEN: &str = "Email already registered";

/// 将 `users` 表的一行还原为领域实体
pub(crate) fn user_from_row(row: &SqliteRow) -> Result<User, StoreError> {
    let balance: String = row.try_get("balance").map_err(db_err)?;
    let account_type: String = row.try_get("account_type").map_err(db_err)?;
    Ok(User {
        id: row.try_get("id").map_err(db_err)?,
        email: row.try_get("email").map_err(db_err)?,
        password_hash: row.try_get("password_hash").map_err(db_err)?,
        name: row.try_get("name").map_err(db_err)?,
        balance: parse_decimal(&balance, "balance")?,
        account_type: parse_enum(&account_type)?,
        deal_id: row.try_get("deal_id").map_err(db_err)?,
        about: row.try_get("about").map_err(db_err)?,
        avatar_url: row.try_get("avatar_url").map_err(db_err)?,
        pending_email: row.try_get("pending_email").map_err(db_err)?,
        email_verified: row.try_get("email_verified").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}

/// 在给定连接 (可以是事务内连接) 上按 ID 读取用户
pub(crate) async fn fetch_user(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<User>, StoreError> {
    sqlx::query(SELECT_USER_BY_ID)
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(db_err)?
        .as_ref()
        .map(user_from_row)
        .transpose()
}

/// # Summary
/// `UserStore` 的 SQLite 实现。
///
/// # Invariants
/// - `email` 列带唯一约束，冲突统一转为 `StoreError::Conflict`。
pub struct SqliteUserStore {
    pool: SqlitePool,
}

impl SqliteUserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        fetch_user(&mut conn, id).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        sqlx::query(concat!("SELECT ", user_columns!(), " FROM users WHERE email = ?"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    /// # Logic
    /// 用 `QueryBuilder` 拼出 `IN (?, ?, ...)`，空列表直接返回。
    async fn find_users(&self, ids: &[String]) -> Result<Vec<User>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(concat!("SELECT ", user_columns!(), " FROM users WHERE id IN ("));
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        qb.build()
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?
            .iter()
            .map(user_from_row)
            .collect()
    }

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(concat!(
            "INSERT INTO users (",
            user_columns!(),
            ") VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(user.balance.to_string())
        .bind(user.account_type.to_string())
        .bind(&user.deal_id)
        .bind(&user.about)
        .bind(&user.avatar_url)
        .bind(&user.pending_email)
        .bind(user.email_verified)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| write_err(e, EMAIL_TAKEN))?;
        Ok(())
    }

    async fn update_profile(&self, user: &User) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET email = ?, name = ?, about = ?, avatar_url = ?, pending_email = ?,
                email_verified = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.about)
        .bind(&user.avatar_url)
        .bind(&user.pending_email)
        .bind(user.email_verified)
        .bind(user.updated_at)
        .bind(&user.id)
        .execute(&self.pool)
        .await
        .map_err(|e| write_err(e, EMAIL_TAKEN))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn update_password(
        &self,
        user_id: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(password_hash)
            .bind(now)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// # Logic
    /// 同一事务内删除令牌与用户记录，流水保留用于审计。
    async fn delete_user(&self, user_id: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query("DELETE FROM verification_tokens WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }
}
