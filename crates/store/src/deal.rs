use async_trait::async_trait;
use fintechos_core::deal::entity::{Cashflow, Deal, DealContact};
use fintechos_core::store::error::StoreError;
use fintechos_core::store::port::DealStore;
use sqlx::{Row, SqliteConnection, SqlitePool, sqlite::SqliteRow};
use tracing::info;

use crate::database::{db_err, parse_decimal, parse_enum};

macro_rules! deal_columns {
    () => {
        "id, owner_id, name, sector, location, facility_size, utilized_amount, target_yield, \
         tenor_months, status, risk_rating, contact_name, contact_email, contact_phone, website, \
         cashflows, created_at, updated_at"
    };
}

const SELECT_DEAL_BY_ID: &str = concat!("SELECT ", deal_columns!(), " FROM deals WHERE id = ?");

pub(crate) fn deal_from_row(row: &SqliteRow) -> Result<Deal, StoreError> {
    let facility: String = row.try_get("facility_size").map_err(db_err)?;
    let utilized: String = row.try_get("utilized_amount").map_err(db_err)?;
    let target_yield: String = row.try_get("target_yield").map_err(db_err)?;
    let status: String = row.try_get("status").map_err(db_err)?;
    let cashflows: String = row.try_get("cashflows").map_err(db_err)?;
    let cashflows: Vec<Cashflow> = serde_json::from_str(&cashflows)
        .map_err(|e| StoreError::Corrupted(format!("cashflows: {}", e)))?;

    Ok(Deal {
        id: row.try_get("id").map_err(db_err)?,
        owner_id: row.try_get("owner_id").map_err(db_err)?,
        name: row.try_get("name").map_err(db_err)?,
        sector: row.try_get("sector").map_err(db_err)?,
        location: row.try_get("location").map_err(db_err)?,
        facility_size: parse_decimal(&facility, "facility_size")?,
        utilized_amount: parse_decimal(&utilized, "utilized_amount")?,
        target_yield: parse_decimal(&target_yield, "target_yield")?,
        tenor_months: row.try_get("tenor_months").map_err(db_err)?,
        status: parse_enum(&status)?,
        risk_rating: row.try_get("risk_rating").map_err(db_err)?,
        contact: DealContact {
            name: row.try_get("contact_name").map_err(db_err)?,
            email: row.try_get("contact_email").map_err(db_err)?,
            phone: row.try_get("contact_phone").map_err(db_err)?,
            website: row.try_get("website").map_err(db_err)?,
        },
        cashflows,
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}

pub(crate) async fn fetch_deal(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<Deal>, StoreError> {
    sqlx::query(SELECT_DEAL_BY_ID)
        .bind(id)
        .fetch_optional(conn)
        .await
        .map_err(db_err)?
        .as_ref()
        .map(deal_from_row)
        .transpose()
}

/// # Summary
/// `DealStore` 的 SQLite 实现。现金流计划以 JSON 文本存放在 `cashflows` 列。
pub struct SqliteDealStore {
    pool: SqlitePool,
}

impl SqliteDealStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DealStore for SqliteDealStore {
    async fn list_deals(&self) -> Result<Vec<Deal>, StoreError> {
        sqlx::query(concat!(
            "SELECT ",
            deal_columns!(),
            " FROM deals ORDER BY created_at DESC, rowid DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?
        .iter()
        .map(deal_from_row)
        .collect()
    }

    async fn get_deal(&self, id: &str) -> Result<Option<Deal>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        fetch_deal(&mut conn, id).await
    }

    /// # Logic
    /// 1. 事务内读取发起人的 `deal_id`，已绑定则冲突。
    /// 2. 插入项目并回写 `users.deal_id`。
    async fn create_deal(&self, deal: &Deal) -> Result<(), StoreError> {
        let cashflows = serde_json::to_string(&deal.cashflows)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let owner: Option<(Option<String>,)> =
            sqlx::query_as("SELECT deal_id FROM users WHERE id = ?")
                .bind(&deal.owner_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;
        match owner {
            None => return Err(StoreError::NotFound),
            Some((Some(_),)) => {
                return Err(StoreError::Conflict("Account already has a deal".into()));
            }
            Some((None,)) => {}
        }

        sqlx::query(concat!(
            "INSERT INTO deals (",
            deal_columns!(),
            ") VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&deal.id)
        .bind(&deal.owner_id)
        .bind(&deal.name)
        .bind(&deal.sector)
        .bind(&deal.location)
        .bind(deal.facility_size.to_string())
        .bind(deal.utilized_amount.to_string())
        .bind(deal.target_yield.to_string())
        .bind(deal.tenor_months)
        .bind(deal.status.to_string())
        .bind(&deal.risk_rating)
        .bind(&deal.contact.name)
        .bind(&deal.contact.email)
        .bind(&deal.contact.phone)
        .bind(&deal.contact.website)
        .bind(cashflows)
        .bind(deal.created_at)
        .bind(deal.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        sqlx::query("UPDATE users SET deal_id = ?, updated_at = ? WHERE id = ?")
            .bind(&deal.id)
            .bind(deal.created_at)
            .bind(&deal.owner_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        info!("项目已创建: {} ({}) owner={}", deal.name, deal.id, deal.owner_id);
        Ok(())
    }
}
