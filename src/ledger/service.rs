//! Ledger operations
//!
//! Every balance mutation runs as: lock user → validate → write record →
//! write user, inside the caller's transaction. Any rejection happens before
//! the first write, so a failed change leaves nothing behind even if the
//! caller commits.

use rust_decimal::Decimal;
use tracing::debug;

use super::types::{BalanceChange, BalanceRecord, UserAccount};
use crate::error::SettleError;
use crate::store::{SettlementStore, StoreTx};

/// Pre-write validation of a change against the locked user row
pub fn before_balance_change(
    user: &UserAccount,
    change: &BalanceChange,
) -> Result<(), SettleError> {
    if user.user_id() != change.user_id {
        return Err(SettleError::Validation(format!(
            "balance change for user {} applied to user {}",
            change.user_id,
            user.user_id()
        )));
    }
    if change.operator.trim().is_empty() {
        return Err(SettleError::Validation("operator is required".into()));
    }
    user.check(change.kind, change.amount)
}

pub struct Ledger;

impl Ledger {
    /// Apply one change inside an open transaction.
    ///
    /// Returns the updated user and the stored record (with its id).
    pub async fn process_balance_change(
        tx: &mut dyn StoreTx,
        change: &BalanceChange,
    ) -> Result<(UserAccount, BalanceRecord), SettleError> {
        if change.amount <= Decimal::ZERO {
            return Err(SettleError::InvalidAmount);
        }

        let before = tx
            .lock_user(change.user_id)
            .await?
            .ok_or(SettleError::UserNotFound(change.user_id))?;

        before_balance_change(&before, change)?;

        let mut after = before.clone();
        after.apply(change.kind, change.amount)?;

        let mut record = BalanceRecord::capture(change, &before, &after);
        record.id = tx.insert_balance_record(&record).await?;
        tx.update_user(&after).await?;

        debug!(
            user_id = change.user_id,
            kind = %change.kind,
            amount = %change.amount,
            available = %after.available(),
            frozen = %after.frozen(),
            record_id = record.id,
            "Balance changed"
        );

        Ok((after, record))
    }

    /// Apply one change in its own transaction and commit it.
    pub async fn apply(
        store: &dyn SettlementStore,
        change: &BalanceChange,
    ) -> Result<(UserAccount, BalanceRecord), SettleError> {
        let mut tx = store.begin().await?;
        let result = Self::process_balance_change(tx.as_mut(), change).await?;
        tx.commit().await?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::BalanceKind;
    use crate::store::MemoryStore;

    fn d(units: i64) -> Decimal {
        Decimal::new(units, 0)
    }

    #[tokio::test]
    async fn test_freeze_then_unfreeze() {
        let store = MemoryStore::new();
        let user = store.create_user(d(50)).await.unwrap();
        let uid = user.user_id();

        let (after, freeze) = Ledger::apply(
            &store,
            &BalanceChange::new(uid, BalanceKind::Freeze, d(20)).with_description("hold"),
        )
        .await
        .unwrap();
        assert_eq!((after.available(), after.frozen()), (d(30), d(20)));
        assert_eq!(freeze.kind, BalanceKind::Freeze);

        let (after, unfreeze) = Ledger::apply(
            &store,
            &BalanceChange::new(uid, BalanceKind::Unfreeze, d(20)).with_description("release"),
        )
        .await
        .unwrap();
        assert_eq!((after.available(), after.frozen()), (d(50), d(0)));

        let records = store.user_balance_records(uid).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, freeze.id);
        assert_eq!(records[1].id, unfreeze.id);
        assert!(records.iter().all(BalanceRecord::is_consistent));
    }

    #[tokio::test]
    async fn test_rejections_have_zero_effect() {
        let store = MemoryStore::new();
        let user = store.create_user(d(5)).await.unwrap();
        let uid = user.user_id();

        let cases = [
            (BalanceKind::Deduct, d(10)),
            (BalanceKind::Freeze, d(6)),
            (BalanceKind::Unfreeze, d(1)),
            (BalanceKind::Add, d(0)),
            (BalanceKind::Deduct, d(-1)),
        ];
        for (kind, amount) in cases {
            let err = Ledger::apply(&store, &BalanceChange::new(uid, kind, amount))
                .await
                .unwrap_err();
            assert!(
                err.is_business_rejection() || err == SettleError::InvalidAmount,
                "{:?}",
                err
            );
        }

        let loaded = store.get_user(uid).await.unwrap().unwrap();
        assert_eq!((loaded.available(), loaded.frozen()), (d(5), d(0)));
        assert_eq!(store.record_count(), 0);
    }

    #[tokio::test]
    async fn test_insufficient_balance_reports_current_state() {
        let store = MemoryStore::new();
        let user = store.create_user(d(5)).await.unwrap();

        let err = Ledger::apply(
            &store,
            &BalanceChange::new(user.user_id(), BalanceKind::Deduct, d(10)),
        )
        .await
        .unwrap_err();
        assert_eq!(
            err,
            SettleError::InsufficientAvailableBalance {
                available: d(5),
                frozen: d(0),
                required: d(10),
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let store = MemoryStore::new();
        let err = Ledger::apply(&store, &BalanceChange::new(77, BalanceKind::Add, d(1)))
            .await
            .unwrap_err();
        assert_eq!(err, SettleError::UserNotFound(77));
    }

    #[tokio::test]
    async fn test_random_sequence_never_goes_negative() {
        use rand::Rng;

        let store = MemoryStore::new();
        let uid = store.create_user(d(100)).await.unwrap().user_id();
        let kinds = [
            BalanceKind::Add,
            BalanceKind::Deduct,
            BalanceKind::Freeze,
            BalanceKind::Unfreeze,
        ];

        let mut rng = rand::thread_rng();
        let mut applied = 0;
        for _ in 0..500 {
            let kind = kinds[rng.gen_range(0..kinds.len())];
            let amount = Decimal::new(rng.gen_range(1..5_000), 2);
            if Ledger::apply(&store, &BalanceChange::new(uid, kind, amount))
                .await
                .is_ok()
            {
                applied += 1;
            }
            let user = store.get_user(uid).await.unwrap().unwrap();
            assert!(user.available() >= Decimal::ZERO);
            assert!(user.frozen() >= Decimal::ZERO);
        }

        let records = store.user_balance_records(uid).await.unwrap();
        assert_eq!(records.len(), applied);
        assert!(records.iter().all(BalanceRecord::is_consistent));

        // Records chain: each before equals the previous after
        for pair in records.windows(2) {
            assert_eq!(pair[0].after_available, pair[1].before_available);
            assert_eq!(pair[0].after_frozen, pair[1].before_frozen);
        }
    }

    #[test]
    fn test_before_balance_change_rejects_mismatched_user() {
        let user = UserAccount::new(1, d(10));
        let change = BalanceChange::new(2, BalanceKind::Add, d(1));
        assert!(matches!(
            before_balance_change(&user, &change),
            Err(SettleError::Validation(_))
        ));

        let change = BalanceChange::new(1, BalanceKind::Add, d(1)).with_operator(" ");
        assert!(matches!(
            before_balance_change(&user, &change),
            Err(SettleError::Validation(_))
        ));
    }
}
