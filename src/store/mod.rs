//! Settlement storage
//!
//! The engine talks to storage only through these traits. A `StoreTx` is one
//! atomic unit of work spanning users, balance records and orders:
//!
//! - `lock_user` takes the per-account lock (row lock) for the rest of the
//!   transaction, serializing concurrent rounds of the same player
//! - writes are invisible to other transactions until `commit`
//! - dropping a `StoreTx` without committing rolls everything back
//!
//! Implementations:
//! - [`postgres::PgSettlementStore`] - PostgreSQL via sqlx
//! - [`memory::MemoryStore`] - in-process store for tests and local tooling

pub mod error;
pub mod memory;
pub mod postgres;
pub mod schema;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgres::PgSettlementStore;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::core_types::{BalanceRecordId, OrderId, UserId};
use crate::ledger::{BalanceRecord, UserAccount};
use crate::order::Order;

/// One open transaction
#[async_trait]
pub trait StoreTx: Send {
    /// Read a user row and hold its lock until commit/rollback.
    /// Re-locking a user already locked by this transaction is a no-op read.
    async fn lock_user(&mut self, user_id: UserId) -> Result<Option<UserAccount>, StoreError>;

    /// Persist balances and version of a locked user
    async fn update_user(&mut self, user: &UserAccount) -> Result<(), StoreError>;

    /// Append a balance record, returning its assigned id
    async fn insert_balance_record(
        &mut self,
        record: &BalanceRecord,
    ) -> Result<BalanceRecordId, StoreError>;

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError>;

    /// Persist status, timestamps, balance record ids and remark
    async fn update_order(&mut self, order: &Order) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Transaction factory plus committed-state queries
#[async_trait]
pub trait SettlementStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;

    /// Create a user with an opening available balance
    async fn create_user(&self, opening_balance: Decimal) -> Result<UserAccount, StoreError>;

    async fn get_user(&self, user_id: UserId) -> Result<Option<UserAccount>, StoreError>;

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError>;

    async fn find_order_by_reference(
        &self,
        user_id: UserId,
        reference_id: &str,
    ) -> Result<Option<Order>, StoreError>;

    /// Records with the given ids, in id order
    async fn balance_records(
        &self,
        ids: &[BalanceRecordId],
    ) -> Result<Vec<BalanceRecord>, StoreError>;

    /// All records of a user, in id order
    async fn user_balance_records(&self, user_id: UserId)
    -> Result<Vec<BalanceRecord>, StoreError>;
}
