//! In-memory settlement store
//!
//! Same transactional contract as PostgreSQL:
//! - per-user async mutex stands in for `SELECT ... FOR UPDATE`
//! - writes are staged in the transaction and applied atomically on commit
//! - unique `order_no` and `(user_id, reference_id)` are checked on commit
//!
//! Commit faults can be scripted to exercise retry and failure paths.

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::{SettlementStore, StoreError, StoreTx};
use crate::core_types::{BalanceRecordId, OrderId, UserId};
use crate::ledger::{BalanceRecord, UserAccount};
use crate::money::max_amount;
use crate::order::Order;

const ORDER_PKEY: &str = "slot_orders_tb_pkey";
const ORDER_NO_KEY: &str = "slot_orders_tb_order_no_key";
const ORDER_REF_KEY: &str = "slot_orders_tb_user_id_reference_id_key";

#[derive(Default)]
struct State {
    users: FxHashMap<UserId, UserAccount>,
    records: BTreeMap<BalanceRecordId, BalanceRecord>,
    orders: BTreeMap<OrderId, Order>,
    order_nos: FxHashMap<String, OrderId>,
    references: FxHashMap<(UserId, String), OrderId>,
}

struct Shared {
    state: Mutex<State>,
    user_locks: DashMap<UserId, Arc<AsyncMutex<()>>>,
    next_user_id: AtomicI64,
    next_record_id: AtomicI64,
    commit_faults: Mutex<VecDeque<StoreError>>,
}

impl Shared {
    fn state(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Backend("memory store state poisoned".into()))
    }

    fn next_fault(&self) -> Option<StoreError> {
        match self.commit_faults.lock() {
            Ok(mut faults) => faults.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        }
    }
}

/// In-process `SettlementStore`
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                user_locks: DashMap::new(),
                next_user_id: AtomicI64::new(1),
                next_record_id: AtomicI64::new(1),
                commit_faults: Mutex::new(VecDeque::new()),
            }),
        }
    }

    /// Make the next commits fail with the given errors, in order
    pub fn fail_next_commits(&self, faults: impl IntoIterator<Item = StoreError>) {
        let mut queue = match self.shared.commit_faults.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        queue.extend(faults);
    }

    pub fn order_count(&self) -> usize {
        self.shared.state().map(|s| s.orders.len()).unwrap_or(0)
    }

    pub fn record_count(&self) -> usize {
        self.shared.state().map(|s| s.records.len()).unwrap_or(0)
    }

    /// All committed orders of a user, in id order
    pub fn user_orders(&self, user_id: UserId) -> Vec<Order> {
        self.shared
            .state()
            .map(|s| {
                s.orders
                    .values()
                    .filter(|o| o.user_id == user_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl SettlementStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        Ok(Box::new(MemoryTx {
            shared: self.shared.clone(),
            guards: FxHashMap::default(),
            users: FxHashMap::default(),
            records: Vec::new(),
            orders: BTreeMap::new(),
        }))
    }

    async fn create_user(&self, opening_balance: Decimal) -> Result<UserAccount, StoreError> {
        // Same outcome as the users_tb column constraints
        if opening_balance < Decimal::ZERO {
            return Err(StoreError::Backend(format!(
                "users_tb_available_check violated: opening balance {}",
                opening_balance
            )));
        }
        if opening_balance >= max_amount() {
            return Err(StoreError::Backend("numeric field overflow".into()));
        }
        let user_id = self.shared.next_user_id.fetch_add(1, Ordering::SeqCst);
        let user = UserAccount::new(user_id, opening_balance);
        self.shared.state()?.users.insert(user_id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<UserAccount>, StoreError> {
        Ok(self.shared.state()?.users.get(&user_id).cloned())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.shared.state()?.orders.get(&order_id).cloned())
    }

    async fn find_order_by_reference(
        &self,
        user_id: UserId,
        reference_id: &str,
    ) -> Result<Option<Order>, StoreError> {
        let state = self.shared.state()?;
        Ok(state
            .references
            .get(&(user_id, reference_id.to_string()))
            .and_then(|id| state.orders.get(id))
            .cloned())
    }

    async fn balance_records(
        &self,
        ids: &[BalanceRecordId],
    ) -> Result<Vec<BalanceRecord>, StoreError> {
        let state = self.shared.state()?;
        let mut records: Vec<BalanceRecord> = ids
            .iter()
            .filter_map(|id| state.records.get(id))
            .cloned()
            .collect();
        records.sort_by_key(|r| r.id);
        Ok(records)
    }

    async fn user_balance_records(
        &self,
        user_id: UserId,
    ) -> Result<Vec<BalanceRecord>, StoreError> {
        let state = self.shared.state()?;
        Ok(state
            .records
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }
}

/// Staged writes plus the user locks held by this transaction
pub struct MemoryTx {
    shared: Arc<Shared>,
    guards: FxHashMap<UserId, OwnedMutexGuard<()>>,
    users: FxHashMap<UserId, UserAccount>,
    records: Vec<BalanceRecord>,
    orders: BTreeMap<OrderId, Order>,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_user(&mut self, user_id: UserId) -> Result<Option<UserAccount>, StoreError> {
        if let Some(user) = self.users.get(&user_id) {
            return Ok(Some(user.clone()));
        }

        // Users are never deleted, so unknown ids get no lock entry
        let known = self.shared.state()?.users.contains_key(&user_id);
        if !known {
            return Ok(None);
        }

        let lock = self.shared.user_locks.entry(user_id).or_default().clone();
        let guard = lock.lock_owned().await;

        let committed = self.shared.state()?.users.get(&user_id).cloned();
        match committed {
            Some(user) => {
                self.guards.insert(user_id, guard);
                self.users.insert(user_id, user.clone());
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }

    async fn update_user(&mut self, user: &UserAccount) -> Result<(), StoreError> {
        match self.users.get_mut(&user.user_id()) {
            Some(staged) => {
                *staged = user.clone();
                Ok(())
            }
            None => Err(StoreError::Backend(format!(
                "user {} updated without holding its lock",
                user.user_id()
            ))),
        }
    }

    async fn insert_balance_record(
        &mut self,
        record: &BalanceRecord,
    ) -> Result<BalanceRecordId, StoreError> {
        let id = self.shared.next_record_id.fetch_add(1, Ordering::SeqCst);
        let mut record = record.clone();
        record.id = id;
        self.records.push(record);
        Ok(id)
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        let committed = self.shared.state()?.orders.contains_key(&order.id);
        if committed || self.orders.contains_key(&order.id) {
            return Err(StoreError::DuplicateKey(ORDER_PKEY.into()));
        }
        self.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), StoreError> {
        let exists = self.orders.contains_key(&order.id)
            || self.shared.state()?.orders.contains_key(&order.id);
        if !exists {
            return Err(StoreError::Backend(format!("order {} not found", order.id)));
        }
        self.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        if let Some(fault) = self.shared.next_fault() {
            return Err(fault);
        }

        let MemoryTx {
            shared,
            guards,
            users,
            records,
            orders,
        } = *self;

        let mut state = shared.state()?;

        // Unique checks first so a violation leaves committed state untouched
        for order in orders.values() {
            if state.orders.contains_key(&order.id) {
                continue;
            }
            if state.order_nos.contains_key(&order.order_no) {
                return Err(StoreError::DuplicateKey(ORDER_NO_KEY.into()));
            }
            if let Some(reference) = &order.reference_id
                && state
                    .references
                    .contains_key(&(order.user_id, reference.clone()))
            {
                return Err(StoreError::DuplicateKey(ORDER_REF_KEY.into()));
            }
        }

        for (user_id, user) in users {
            state.users.insert(user_id, user);
        }
        for record in records {
            state.records.insert(record.id, record);
        }
        for (id, order) in orders {
            state.order_nos.insert(order.order_no.clone(), id);
            if let Some(reference) = &order.reference_id {
                state.references.insert((order.user_id, reference.clone()), id);
            }
            state.orders.insert(id, order);
        }

        drop(state);
        drop(guards);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{BalanceChange, BalanceKind};
    use std::time::Duration;

    fn d(units: i64) -> Decimal {
        Decimal::new(units, 0)
    }

    fn record_for(before: &UserAccount, after: &UserAccount) -> BalanceRecord {
        let change = BalanceChange::new(before.user_id(), BalanceKind::Add, d(1));
        BalanceRecord::capture(&change, before, after)
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_invisible_and_dropped() {
        let store = MemoryStore::new();
        let user = store.create_user(d(10)).await.unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            let before = tx.lock_user(user.user_id()).await.unwrap().unwrap();
            let mut after = before.clone();
            after.apply(BalanceKind::Add, d(1)).unwrap();
            tx.insert_balance_record(&record_for(&before, &after))
                .await
                .unwrap();
            tx.update_user(&after).await.unwrap();

            let committed = store.get_user(user.user_id()).await.unwrap().unwrap();
            assert_eq!(committed.available(), d(10));
            // dropped without commit
        }

        assert_eq!(
            store.get_user(user.user_id()).await.unwrap().unwrap().available(),
            d(10)
        );
        assert_eq!(store.record_count(), 0);
    }

    #[tokio::test]
    async fn test_commit_applies_everything() {
        let store = MemoryStore::new();
        let user = store.create_user(d(10)).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let before = tx.lock_user(user.user_id()).await.unwrap().unwrap();
        let mut after = before.clone();
        after.apply(BalanceKind::Add, d(1)).unwrap();
        let id = tx
            .insert_balance_record(&record_for(&before, &after))
            .await
            .unwrap();
        tx.update_user(&after).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(
            store.get_user(user.user_id()).await.unwrap().unwrap().available(),
            d(11)
        );
        let records = store.balance_records(&[id]).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, id);
    }

    #[tokio::test]
    async fn test_lock_user_blocks_second_transaction() {
        let store = MemoryStore::new();
        let user = store.create_user(d(10)).await.unwrap();

        let mut tx1 = store.begin().await.unwrap();
        tx1.lock_user(user.user_id()).await.unwrap();

        let store2 = store.clone();
        let uid = user.user_id();
        let waiter = tokio::spawn(async move {
            let mut tx2 = store2.begin().await.unwrap();
            tx2.lock_user(uid).await.unwrap().unwrap().available()
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        let mut after = user.clone();
        after.apply(BalanceKind::Add, d(5)).unwrap();
        tx1.update_user(&after).await.unwrap();
        tx1.commit().await.unwrap();

        // Second transaction sees the committed balance
        assert_eq!(waiter.await.unwrap(), d(15));
    }

    #[tokio::test]
    async fn test_relock_in_same_transaction_does_not_deadlock() {
        let store = MemoryStore::new();
        let user = store.create_user(d(10)).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.lock_user(user.user_id()).await.unwrap();
        let again = tokio::time::timeout(Duration::from_secs(1), tx.lock_user(user.user_id()))
            .await
            .expect("re-lock must not block");
        assert!(again.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unknown_user_and_unlocked_update() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        assert!(tx.lock_user(404).await.unwrap().is_none());
        assert_eq!(store.shared.user_locks.len(), 0);

        let ghost = UserAccount::new(404, d(1));
        assert!(matches!(
            tx.update_user(&ghost).await,
            Err(StoreError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn test_lookups_of_unknown_ids_leave_no_lock_entries() {
        let store = MemoryStore::new();
        let user = store.create_user(d(1)).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        for id in 1_000..1_100 {
            assert!(tx.lock_user(id).await.unwrap().is_none());
        }
        assert!(tx.lock_user(user.user_id()).await.unwrap().is_some());
        assert_eq!(store.shared.user_locks.len(), 1);
    }

    #[tokio::test]
    async fn test_create_user_rejects_what_the_table_rejects() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.create_user(d(-5)).await,
            Err(StoreError::Backend(msg)) if msg.contains("users_tb_available_check")
        ));
        assert!(matches!(
            store.create_user(max_amount()).await,
            Err(StoreError::Backend(_))
        ));
        assert!(store.create_user(Decimal::ZERO).await.is_ok());
        assert!(store.get_user(1).await.unwrap().is_some());
        assert_eq!(store.shared.state().unwrap().users.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_order_no_rejected_on_commit() {
        let store = MemoryStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&Order::pending(1, "SLOT1".into(), 1, d(1)))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&Order::pending(2, "SLOT1".into(), 1, d(1)))
            .await
            .unwrap();
        assert_eq!(
            tx.commit().await,
            Err(StoreError::DuplicateKey(ORDER_NO_KEY.into()))
        );
        assert_eq!(store.order_count(), 1);
    }

    #[tokio::test]
    async fn test_scripted_commit_faults() {
        let store = MemoryStore::new();
        store.fail_next_commits([StoreError::Conflict("40001".into())]);

        let tx = store.begin().await.unwrap();
        assert!(matches!(tx.commit().await, Err(StoreError::Conflict(_))));

        let tx = store.begin().await.unwrap();
        assert!(tx.commit().await.is_ok());
    }
}
