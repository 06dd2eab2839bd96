//! Core types used throughout the system
//!
//! These are fundamental type aliases used by all modules.
//! All ids map to PostgreSQL `BIGINT`, hence signed.

/// User ID - primary key of `users_tb`, immutable after assignment.
pub type UserId = i64;

/// Order ID - snowflake id, unique across all machines.
pub type OrderId = i64;

/// Balance record ID - assigned by the store on insert.
pub type BalanceRecordId = i64;
