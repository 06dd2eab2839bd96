//! Money Module
//!
//! All money values are `rust_decimal::Decimal` in the platform's base
//! currency unit. Conversions from client strings MUST go through this module.
//!
//! ## Rules
//! 1. No floating point anywhere on the money path
//! 2. No silent truncation: more fractional digits than the scale is an error
//! 3. Amounts entering the ledger are strictly positive
//! 4. Every amount fits the NUMERIC(30,8) storage columns

use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

/// Default number of fractional digits for the base currency (cents)
pub const DEFAULT_MONEY_SCALE: u32 = 2;

/// Fractional digits of the NUMERIC(30,8) money columns
pub const STORAGE_SCALE: u32 = 8;

/// Integer digits of the NUMERIC(30,8) money columns
pub const STORAGE_INTEGER_DIGITS: u32 = 22;

/// Exclusive upper bound of any stored amount (10^22)
pub fn max_amount() -> Decimal {
    Decimal::from_i128_with_scale(10_i128.pow(STORAGE_INTEGER_DIGITS), 0)
}

/// True if `amount` can be stored without rounding or overflow
pub fn fits_storage(amount: Decimal) -> bool {
    amount.abs() < max_amount() && amount.normalize().scale() <= STORAGE_SCALE
}

/// Money conversion errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Precision overflow: provided {provided} decimals, max allowed {max}")]
    PrecisionOverflow { provided: u32, max: u32 },

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Amount {0} exceeds the storage range")]
    OutOfRange(Decimal),
}

/// Parse a client-provided amount string (e.g. "10.00") into a Decimal.
///
/// # Errors
/// * `InvalidFormat` - empty, signed, or not a decimal number
/// * `InvalidAmount` - zero
/// * `PrecisionOverflow` - more fractional digits than `scale`
/// * `OutOfRange` - 10^22 or more
pub fn parse_amount(amount_str: &str, scale: u32) -> Result<Decimal, MoneyError> {
    let amount_str = amount_str.trim();
    if amount_str.is_empty() {
        return Err(MoneyError::InvalidFormat("empty string".into()));
    }

    if amount_str.starts_with('-') || amount_str.starts_with('+') {
        return Err(MoneyError::InvalidAmount);
    }

    // Reject ".5" / "5." style input, same as the order gateway
    if amount_str.starts_with('.') || amount_str.ends_with('.') {
        return Err(MoneyError::InvalidFormat(format!(
            "ambiguous decimal point: {}",
            amount_str
        )));
    }

    let amount = Decimal::from_str(amount_str)
        .map_err(|e| MoneyError::InvalidFormat(format!("{}: {}", amount_str, e)))?;

    validate_amount(amount, scale)?;
    Ok(amount)
}

/// Check that an amount is strictly positive and fits the money scale.
pub fn validate_amount(amount: Decimal, scale: u32) -> Result<(), MoneyError> {
    if amount <= Decimal::ZERO {
        return Err(MoneyError::InvalidAmount);
    }

    // normalize() strips trailing zeros so "10.00" at scale 2 is fine
    let provided = amount.normalize().scale();
    if provided > scale {
        return Err(MoneyError::PrecisionOverflow {
            provided,
            max: scale,
        });
    }

    if amount >= max_amount() {
        return Err(MoneyError::OutOfRange(amount));
    }

    Ok(())
}

/// Format an amount with exactly `scale` fractional digits for display.
pub fn format_amount(amount: Decimal, scale: u32) -> String {
    format!("{:.prec$}", amount, prec = scale as usize)
}
