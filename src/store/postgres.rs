//! PostgreSQL settlement store
//!
//! Row locks (`SELECT ... FOR UPDATE`) serialize rounds of the same user.
//! JSON payloads are bound as text and cast to JSONB in SQL.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

use super::{SettlementStore, StoreError, StoreTx};
use crate::core_types::{BalanceRecordId, OrderId, UserId};
use crate::ledger::{BalanceKind, BalanceRecord, UserAccount};
use crate::order::{GameResult, Order, OrderStatus, OrderType};

const USER_COLUMNS: &str = "user_id, available, frozen, version, created_at, updated_at";

const RECORD_COLUMNS: &str = "id, user_id, kind, amount, before_available, after_available, \
     before_frozen, after_frozen, description, operator, reference_id, remark::text AS remark, \
     created_at";

const ORDER_COLUMNS: &str = "id, order_no, user_id, order_type, status, bet_amount, win_amount, \
     game_result::text AS game_result, balance_record_ids, reference_id, created_at, updated_at, \
     completed_at, remark";

/// `SettlementStore` backed by a sqlx connection pool
#[derive(Clone)]
pub struct PgSettlementStore {
    pool: PgPool,
}

impl PgSettlementStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SettlementStore for PgSettlementStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStoreTx { tx }))
    }

    async fn create_user(&self, opening_balance: Decimal) -> Result<UserAccount, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO users_tb (available, frozen, version) VALUES ($1, 0, 0) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(opening_balance)
        .fetch_one(&self.pool)
        .await?;

        row_to_user(&row)
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<UserAccount>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM users_tb WHERE user_id = $1",
            USER_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM slot_orders_tb WHERE id = $1",
            ORDER_COLUMNS
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_order).transpose()
    }

    async fn find_order_by_reference(
        &self,
        user_id: UserId,
        reference_id: &str,
    ) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM slot_orders_tb WHERE user_id = $1 AND reference_id = $2",
            ORDER_COLUMNS
        ))
        .bind(user_id)
        .bind(reference_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_order).transpose()
    }

    async fn balance_records(
        &self,
        ids: &[BalanceRecordId],
    ) -> Result<Vec<BalanceRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM balance_records_tb WHERE id = ANY($1) ORDER BY id",
            RECORD_COLUMNS
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }

    async fn user_balance_records(
        &self,
        user_id: UserId,
    ) -> Result<Vec<BalanceRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM balance_records_tb WHERE user_id = $1 ORDER BY id",
            RECORD_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }
}

/// One open PostgreSQL transaction; rolls back when dropped uncommitted
pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn lock_user(&mut self, user_id: UserId) -> Result<Option<UserAccount>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM users_tb WHERE user_id = $1 FOR UPDATE",
            USER_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn update_user(&mut self, user: &UserAccount) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users_tb
            SET available = $1, frozen = $2, version = $3, updated_at = $4
            WHERE user_id = $5
            "#,
        )
        .bind(user.available())
        .bind(user.frozen())
        .bind(user.version())
        .bind(user.updated_at())
        .bind(user.user_id())
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Backend(format!(
                "user {} vanished during update",
                user.user_id()
            )));
        }
        Ok(())
    }

    async fn insert_balance_record(
        &mut self,
        record: &BalanceRecord,
    ) -> Result<BalanceRecordId, StoreError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO balance_records_tb
                (user_id, kind, amount, before_available, after_available,
                 before_frozen, after_frozen, description, operator, reference_id,
                 remark, created_at)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11::jsonb, $12)
            RETURNING id
            "#,
        )
        .bind(record.user_id)
        .bind(record.kind.id())
        .bind(record.amount)
        .bind(record.before_available)
        .bind(record.after_available)
        .bind(record.before_frozen)
        .bind(record.after_frozen)
        .bind(&record.description)
        .bind(&record.operator)
        .bind(&record.reference_id)
        .bind(record.remark.to_string())
        .bind(record.created_at)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(id)
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        let game_result = order
            .game_result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO slot_orders_tb
                (id, order_no, user_id, order_type, status, bet_amount, win_amount,
                 game_result, balance_record_ids, reference_id, created_at, updated_at,
                 completed_at, remark)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7, $8::jsonb, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(order.id)
        .bind(&order.order_no)
        .bind(order.user_id)
        .bind(order.order_type.id())
        .bind(order.status.id())
        .bind(order.bet_amount)
        .bind(order.win_amount)
        .bind(game_result)
        .bind(&order.balance_record_ids)
        .bind(&order.reference_id)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.completed_at)
        .bind(&order.remark)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE slot_orders_tb
            SET status = $1, balance_record_ids = $2, updated_at = $3,
                completed_at = $4, remark = $5
            WHERE id = $6
            "#,
        )
        .bind(order.status.id())
        .bind(&order.balance_record_ids)
        .bind(order.updated_at)
        .bind(order.completed_at)
        .bind(&order.remark)
        .bind(order.id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Backend(format!("order {} not found", order.id)));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let PgStoreTx { tx } = *self;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let PgStoreTx { tx } = *self;
        tx.rollback().await?;
        Ok(())
    }
}

fn row_to_user(row: &PgRow) -> Result<UserAccount, StoreError> {
    Ok(UserAccount::from_parts(
        row.try_get("user_id")?,
        row.try_get("available")?,
        row.try_get("frozen")?,
        row.try_get("version")?,
        row.try_get("created_at")?,
        row.try_get("updated_at")?,
    ))
}

fn row_to_record(row: &PgRow) -> Result<BalanceRecord, StoreError> {
    let kind_id: i16 = row.try_get("kind")?;
    let kind = BalanceKind::from_id(kind_id)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown balance kind {}", kind_id)))?;
    let remark: Option<String> = row.try_get("remark")?;
    let remark = match remark {
        Some(text) => serde_json::from_str(&text)?,
        None => serde_json::Value::Null,
    };

    Ok(BalanceRecord {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        kind,
        amount: row.try_get("amount")?,
        before_available: row.try_get("before_available")?,
        after_available: row.try_get("after_available")?,
        before_frozen: row.try_get("before_frozen")?,
        after_frozen: row.try_get("after_frozen")?,
        description: row.try_get("description")?,
        operator: row.try_get("operator")?,
        reference_id: row.try_get("reference_id")?,
        remark,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_order(row: &PgRow) -> Result<Order, StoreError> {
    let type_id: i16 = row.try_get("order_type")?;
    let order_type = OrderType::from_id(type_id)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown order type {}", type_id)))?;
    let status_id: i16 = row.try_get("status")?;
    let status = OrderStatus::from_id(status_id)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown order status {}", status_id)))?;
    let game_result: Option<String> = row.try_get("game_result")?;
    let game_result = game_result
        .map(|text| serde_json::from_str::<GameResult>(&text))
        .transpose()?;

    Ok(Order {
        id: row.try_get("id")?,
        order_no: row.try_get("order_no")?,
        user_id: row.try_get("user_id")?,
        order_type,
        status,
        bet_amount: row.try_get("bet_amount")?,
        win_amount: row.try_get("win_amount")?,
        game_result,
        balance_record_ids: row.try_get("balance_record_ids")?,
        reference_id: row.try_get("reference_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        completed_at: row.try_get("completed_at")?,
        remark: row.try_get("remark")?,
    })
}
