//! Common type definitions shared by the ledger and credential layers.
//!
//! # ID Types
//!
//! All entity IDs are UUIDs wrapped in type aliases:
//!
//! - [`UserId`]: User account identifier
//! - [`WalletId`]: Wallet identifier (one per user)
//! - [`TransactionId`]: Ledger transaction identifier
//! - [`ApiKeyId`]: API key identifier
//!
//! # Money
//!
//! Amounts are [`rust_decimal::Decimal`] values with at most two fractional digits. They are
//! validated with [`validate_amount`] at every entry point and converted to gateway minor units
//! with [`to_minor_units`].

use rust_decimal::Decimal;
use uuid::Uuid;

// Type aliases for IDs
pub type UserId = Uuid;
pub type WalletId = Uuid;
pub type TransactionId = Uuid;
pub type ApiKeyId = Uuid;

/// Number of fractional digits a monetary amount may carry.
pub const MONEY_SCALE: u32 = 2;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

/// Why an amount was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("amount must be greater than zero")]
    NotPositive,
    #[error("amount cannot have more than 2 decimal places")]
    TooPrecise,
    #[error("amount is too large")]
    TooLarge,
}

/// Check that an amount is strictly positive and representable in minor units.
pub fn validate_amount(amount: Decimal) -> Result<Decimal, AmountError> {
    if amount <= Decimal::ZERO {
        return Err(AmountError::NotPositive);
    }
    if amount.normalize().scale() > MONEY_SCALE {
        return Err(AmountError::TooPrecise);
    }
    to_minor_units(amount)?;
    Ok(amount)
}

/// Convert a major-unit amount (e.g. 25.50) into integer minor units (2550).
pub fn to_minor_units(amount: Decimal) -> Result<i64, AmountError> {
    let minor = amount.checked_mul(Decimal::ONE_HUNDRED).ok_or(AmountError::TooLarge)?;
    if minor.fract() != Decimal::ZERO {
        return Err(AmountError::TooPrecise);
    }
    i64::try_from(minor).map_err(|_| AmountError::TooLarge)
}

/// Convert integer minor units back into a major-unit amount.
pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, MONEY_SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_abbrev_uuid() {
        let id = Uuid::from_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(abbrev_uuid(&id), "550e8400");
    }

    #[test]
    fn test_validate_amount() {
        assert_eq!(validate_amount(Decimal::new(2550, 2)), Ok(Decimal::new(2550, 2)));
        assert_eq!(validate_amount(Decimal::ZERO), Err(AmountError::NotPositive));
        assert_eq!(validate_amount(Decimal::new(-1, 0)), Err(AmountError::NotPositive));
        assert_eq!(validate_amount(Decimal::new(1001, 3)), Err(AmountError::TooPrecise));
        // Trailing zeros beyond the scale are fine
        assert!(validate_amount(Decimal::from_str("10.500").unwrap()).is_ok());
        assert_eq!(validate_amount(Decimal::MAX), Err(AmountError::TooLarge));
    }

    #[test]
    fn test_minor_units() {
        assert_eq!(to_minor_units(Decimal::new(2550, 2)), Ok(2550));
        assert_eq!(to_minor_units(Decimal::from(40)), Ok(4000));
        assert_eq!(from_minor_units(2550), Decimal::new(2550, 2));
    }
}
