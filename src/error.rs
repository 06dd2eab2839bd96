//! Settlement Error Types
//!
//! One taxonomy for the ledger and the order engine, with API-facing codes.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::core_types::UserId;
use crate::money::MoneyError;
use crate::order::state::OrderStatus;
use crate::store::StoreError;

/// Settlement error types
///
/// Business rejections carry the balance state at the time of rejection so the
/// caller can explain why the bet could not be placed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettleError {
    // === Validation Errors ===
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Amount overflow: {0}")]
    AmountOverflow(String),

    // === Business Rejections ===
    #[error("Insufficient available balance: available {available}, required {required}")]
    InsufficientAvailableBalance {
        available: Decimal,
        frozen: Decimal,
        required: Decimal,
    },

    #[error("Insufficient frozen balance: frozen {frozen}, required {required}")]
    InsufficientFrozenBalance {
        available: Decimal,
        frozen: Decimal,
        required: Decimal,
    },

    // === Order Lifecycle ===
    #[error("Invalid order status transition: {from} -> {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    // === System Errors ===
    #[error("Transaction conflict")]
    TransactionConflict,

    #[error("Settlement timed out, transaction rolled back")]
    Timeout,

    #[error("Storage failure: {0}")]
    Storage(String),
}

impl SettleError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            SettleError::Validation(_) => "VALIDATION_ERROR",
            SettleError::UserNotFound(_) => "USER_NOT_FOUND",
            SettleError::InvalidAmount => "INVALID_AMOUNT",
            SettleError::AmountOverflow(_) => "AMOUNT_OVERFLOW",
            SettleError::InsufficientAvailableBalance { .. } => "INSUFFICIENT_AVAILABLE_BALANCE",
            SettleError::InsufficientFrozenBalance { .. } => "INSUFFICIENT_FROZEN_BALANCE",
            SettleError::InvalidStatusTransition { .. } => "INVALID_STATUS_TRANSITION",
            SettleError::InvalidOrder(_) => "INVALID_ORDER",
            SettleError::TransactionConflict => "TRANSACTION_CONFLICT",
            SettleError::Timeout => "TIMEOUT",
            SettleError::Storage(_) => "STORAGE_FAILURE",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            SettleError::Validation(_)
            | SettleError::InvalidAmount
            | SettleError::AmountOverflow(_) => 400,
            SettleError::UserNotFound(_) => 404,
            SettleError::InsufficientAvailableBalance { .. }
            | SettleError::InsufficientFrozenBalance { .. } => 422,
            SettleError::TransactionConflict => 409,
            SettleError::Timeout => 504,
            SettleError::InvalidStatusTransition { .. }
            | SettleError::InvalidOrder(_)
            | SettleError::Storage(_) => 500,
        }
    }

    /// Malformed input, rejected before any state change
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SettleError::Validation(_)
                | SettleError::UserNotFound(_)
                | SettleError::InvalidAmount
                | SettleError::AmountOverflow(_)
        )
    }

    /// Business-rule rejection (player cannot cover the operation)
    pub fn is_business_rejection(&self) -> bool {
        matches!(
            self,
            SettleError::InsufficientAvailableBalance { .. }
                | SettleError::InsufficientFrozenBalance { .. }
        )
    }

    /// Safe to retry the whole unit of work
    pub fn is_retriable(&self) -> bool {
        matches!(self, SettleError::TransactionConflict)
    }
}

impl From<StoreError> for SettleError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(_) => SettleError::TransactionConflict,
            other => SettleError::Storage(other.to_string()),
        }
    }
}

impl From<MoneyError> for SettleError {
    fn from(e: MoneyError) -> Self {
        match e {
            MoneyError::InvalidAmount => SettleError::InvalidAmount,
            other => SettleError::Validation(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(SettleError::InvalidAmount.code(), "INVALID_AMOUNT");
        assert_eq!(SettleError::TransactionConflict.code(), "TRANSACTION_CONFLICT");
        assert_eq!(
            SettleError::InsufficientAvailableBalance {
                available: Decimal::ONE,
                frozen: Decimal::ZERO,
                required: Decimal::TEN,
            }
            .code(),
            "INSUFFICIENT_AVAILABLE_BALANCE"
        );
    }

    #[test]
    fn test_http_status() {
        assert_eq!(SettleError::Validation("x".into()).http_status(), 400);
        assert_eq!(SettleError::UserNotFound(7).http_status(), 404);
        assert_eq!(SettleError::TransactionConflict.http_status(), 409);
        assert_eq!(SettleError::AmountOverflow("win".into()).http_status(), 400);
        assert_eq!(SettleError::Storage("disk".into()).http_status(), 500);
    }

    #[test]
    fn test_classification() {
        assert!(SettleError::UserNotFound(1).is_validation());
        assert!(!SettleError::UserNotFound(1).is_retriable());
        assert!(SettleError::TransactionConflict.is_retriable());
        assert!(
            SettleError::InsufficientFrozenBalance {
                available: Decimal::ZERO,
                frozen: Decimal::ZERO,
                required: Decimal::ONE,
            }
            .is_business_rejection()
        );
    }

    #[test]
    fn test_store_error_mapping() {
        let err: SettleError = StoreError::Conflict("40001".into()).into();
        assert_eq!(err, SettleError::TransactionConflict);

        let err: SettleError = StoreError::Backend("connection reset".into()).into();
        assert!(matches!(err, SettleError::Storage(_)));
    }

    #[test]
    fn test_out_of_range_amount_is_validation() {
        let err: SettleError = MoneyError::OutOfRange(Decimal::MAX).into();
        assert!(err.is_validation());
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(SettleError::AmountOverflow("win".into()).is_validation());
    }

    #[test]
    fn test_display() {
        let err = SettleError::InsufficientAvailableBalance {
            available: Decimal::new(500, 2),
            frozen: Decimal::ZERO,
            required: Decimal::new(1000, 2),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient available balance: available 5.00, required 10.00"
        );
    }
}
