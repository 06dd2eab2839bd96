//! Ledger types
//!
//! `UserAccount` is the enforced balance type: fields are private and every
//! mutation goes through `apply`, which rejects anything that would leave a
//! balance negative before touching state.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core_types::{BalanceRecordId, UserId};
use crate::error::SettleError;
use crate::money::fits_storage;

/// Balance operation kind
///
/// IDs are stored as SMALLINT in `balance_records_tb.kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum BalanceKind {
    Add = 1,
    Deduct = 2,
    Freeze = 3,
    Unfreeze = 4,
}

impl BalanceKind {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(BalanceKind::Add),
            2 => Some(BalanceKind::Deduct),
            3 => Some(BalanceKind::Freeze),
            4 => Some(BalanceKind::Unfreeze),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceKind::Add => "ADD",
            BalanceKind::Deduct => "DEDUCT",
            BalanceKind::Freeze => "FREEZE",
            BalanceKind::Unfreeze => "UNFREEZE",
        }
    }

    /// (available delta sign, frozen delta sign)
    fn signs(&self) -> (i8, i8) {
        match self {
            BalanceKind::Add => (1, 0),
            BalanceKind::Deduct => (-1, 0),
            BalanceKind::Freeze => (-1, 1),
            BalanceKind::Unfreeze => (1, -1),
        }
    }
}

impl fmt::Display for BalanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A player's balance row
///
/// # Invariants (ENFORCED by private fields):
/// - available >= 0, frozen >= 0
/// - version increments on every applied change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAccount {
    user_id: UserId,
    available: Decimal,
    frozen: Decimal,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserAccount {
    /// Fresh account with an opening balance
    pub fn new(user_id: UserId, available: Decimal) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            available,
            frozen: Decimal::ZERO,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rehydrate a stored row
    pub fn from_parts(
        user_id: UserId,
        available: Decimal,
        frozen: Decimal,
        version: i64,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            available,
            frozen,
            version,
            created_at,
            updated_at,
        }
    }

    #[inline]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[inline]
    pub fn available(&self) -> Decimal {
        self.available
    }

    #[inline]
    pub fn frozen(&self) -> Decimal {
        self.frozen
    }

    #[inline]
    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Check a change without applying it
    pub fn check(&self, kind: BalanceKind, amount: Decimal) -> Result<(), SettleError> {
        if amount <= Decimal::ZERO {
            return Err(SettleError::InvalidAmount);
        }
        match kind {
            BalanceKind::Deduct | BalanceKind::Freeze if self.available < amount => {
                Err(SettleError::InsufficientAvailableBalance {
                    available: self.available,
                    frozen: self.frozen,
                    required: amount,
                })
            }
            BalanceKind::Unfreeze if self.frozen < amount => {
                Err(SettleError::InsufficientFrozenBalance {
                    available: self.available,
                    frozen: self.frozen,
                    required: amount,
                })
            }
            _ => Ok(()),
        }
    }

    /// Apply a change. On error the account is untouched.
    pub fn apply(&mut self, kind: BalanceKind, amount: Decimal) -> Result<(), SettleError> {
        self.check(kind, amount)?;

        let (avail_sign, frozen_sign) = kind.signs();
        let available = shift(self.available, avail_sign, amount)?;
        let frozen = shift(self.frozen, frozen_sign, amount)?;

        self.available = available;
        self.frozen = frozen;
        self.version = self.version.wrapping_add(1);
        self.updated_at = Utc::now();
        Ok(())
    }
}

fn shift(value: Decimal, sign: i8, amount: Decimal) -> Result<Decimal, SettleError> {
    let next = match sign {
        1 => value.checked_add(amount),
        -1 => value.checked_sub(amount),
        _ => Some(value),
    };
    match next {
        Some(v) if v < Decimal::ZERO => {
            Err(SettleError::Validation("balance would become negative".into()))
        }
        Some(v) if fits_storage(v) => Ok(v),
        _ => Err(SettleError::AmountOverflow(format!(
            "balance {} {} {} exceeds the money range",
            value,
            if sign < 0 { "-" } else { "+" },
            amount
        ))),
    }
}

/// A requested balance mutation
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceChange {
    pub user_id: UserId,
    pub kind: BalanceKind,
    pub amount: Decimal,
    pub description: String,
    pub operator: String,
    pub reference_id: Option<String>,
    pub remark: serde_json::Value,
}

impl BalanceChange {
    pub fn new(user_id: UserId, kind: BalanceKind, amount: Decimal) -> Self {
        Self {
            user_id,
            kind,
            amount,
            description: String::new(),
            operator: String::from("system"),
            reference_id: None,
            remark: serde_json::Value::Null,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = operator.into();
        self
    }

    pub fn with_reference(mut self, reference_id: impl Into<String>) -> Self {
        self.reference_id = Some(reference_id.into());
        self
    }

    pub fn with_remark(mut self, remark: serde_json::Value) -> Self {
        self.remark = remark;
        self
    }
}

/// Append-only audit entry, one per applied change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceRecord {
    /// Assigned by the store on insert (0 before)
    pub id: BalanceRecordId,
    pub user_id: UserId,
    pub kind: BalanceKind,
    pub amount: Decimal,
    pub before_available: Decimal,
    pub after_available: Decimal,
    pub before_frozen: Decimal,
    pub after_frozen: Decimal,
    pub description: String,
    pub operator: String,
    pub reference_id: Option<String>,
    pub remark: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl BalanceRecord {
    /// Build the record for a change applied between `before` and `after`
    pub fn capture(change: &BalanceChange, before: &UserAccount, after: &UserAccount) -> Self {
        Self {
            id: 0,
            user_id: change.user_id,
            kind: change.kind,
            amount: change.amount,
            before_available: before.available(),
            after_available: after.available(),
            before_frozen: before.frozen(),
            after_frozen: after.frozen(),
            description: change.description.clone(),
            operator: change.operator.clone(),
            reference_id: change.reference_id.clone(),
            remark: change.remark.clone(),
            created_at: after.updated_at(),
        }
    }

    /// Net change of the available balance
    pub fn available_delta(&self) -> Decimal {
        self.after_available - self.before_available
    }

    /// Before/after fields agree with kind and amount
    pub fn is_consistent(&self) -> bool {
        let (a, f) = self.kind.signs();
        let expect = |sign: i8| match sign {
            1 => self.amount,
            -1 => -self.amount,
            _ => Decimal::ZERO,
        };
        self.amount > Decimal::ZERO
            && self.after_available - self.before_available == expect(a)
            && self.after_frozen - self.before_frozen == expect(f)
            && self.after_available >= Decimal::ZERO
            && self.after_frozen >= Decimal::ZERO
    }
}
