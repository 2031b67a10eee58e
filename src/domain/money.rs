//! Money Codec
//!
//! Decimal-string ⇄ integer-cents conversion and currency normalization.
//! Amounts cross the wire as ASCII decimal strings (`"123.45"`); every
//! arithmetic operation (sums, comparisons, differences) happens on the
//! integer-cents representation so no floating point is ever involved.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

use super::error::DomainError;

/// Parse a decimal amount string into integer cents.
///
/// Accepts at most two decimal places; anything finer would silently lose
/// precision, so it is rejected rather than rounded.
///
/// # Errors
/// `DomainError::InvalidAmount` on malformed input, more than two decimal
/// places, or magnitude outside the `i64` cents range.
pub fn amount_to_cents(value: &str) -> Result<i64, DomainError> {
    let decimal = Decimal::from_str(value.trim())
        .map_err(|_| DomainError::InvalidAmount(value.to_string()))?;

    if decimal.scale() > 2 {
        return Err(DomainError::InvalidAmount(value.to_string()));
    }

    decimal
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|cents| cents.to_i64())
        .ok_or_else(|| DomainError::InvalidAmount(value.to_string()))
}

/// Render integer cents as a canonical decimal string with two places.
pub fn cents_to_amount(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// Normalize an amount string to its canonical two-decimal form.
///
/// `"5"` becomes `"5.00"`, `"07.5"` becomes `"7.50"`. Round-trips through
/// cents, so the output always satisfies
/// `amount_to_cents(&normalize_amount(s)?) == amount_to_cents(s)`.
pub fn normalize_amount(value: &str) -> Result<String, DomainError> {
    Ok(cents_to_amount(amount_to_cents(value)?))
}

/// Normalize a currency code: trimmed, uppercased, exactly three ASCII
/// letters.
///
/// # Errors
/// `DomainError::InvalidCurrency` for anything else.
pub fn normalize_currency(value: &str) -> Result<String, DomainError> {
    let trimmed = value.trim();
    if trimmed.len() == 3 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(trimmed.to_ascii_uppercase())
    } else {
        Err(DomainError::InvalidCurrency(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_to_cents() {
        assert_eq!(amount_to_cents("123.45").unwrap(), 12345);
        assert_eq!(amount_to_cents("0.01").unwrap(), 1);
        assert_eq!(amount_to_cents("5").unwrap(), 500);
        assert_eq!(amount_to_cents("7.5").unwrap(), 750);
        assert_eq!(amount_to_cents("-10.00").unwrap(), -1000);
        assert_eq!(amount_to_cents(" 42.00 ").unwrap(), 4200);
    }

    #[test]
    fn test_amount_to_cents_rejects_malformed() {
        assert!(matches!(
            amount_to_cents("abc"),
            Err(DomainError::InvalidAmount(_))
        ));
        assert!(matches!(
            amount_to_cents(""),
            Err(DomainError::InvalidAmount(_))
        ));
        assert!(matches!(
            amount_to_cents("1.2.3"),
            Err(DomainError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_amount_to_cents_rejects_sub_cent_precision() {
        assert!(matches!(
            amount_to_cents("1.005"),
            Err(DomainError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_cents_to_amount() {
        assert_eq!(cents_to_amount(12345), "123.45");
        assert_eq!(cents_to_amount(0), "0.00");
        assert_eq!(cents_to_amount(1), "0.01");
        assert_eq!(cents_to_amount(500), "5.00");
        assert_eq!(cents_to_amount(-1000), "-10.00");
        assert_eq!(cents_to_amount(-7), "-0.07");
    }

    #[test]
    fn test_round_trip_law() {
        for x in [0i64, 1, 99, 100, 101, 12345, 1_000_000, i64::MAX / 100] {
            assert_eq!(amount_to_cents(&cents_to_amount(x)).unwrap(), x);
        }
    }

    #[test]
    fn test_normalize_amount_canonical_form() {
        assert_eq!(normalize_amount("5").unwrap(), "5.00");
        assert_eq!(normalize_amount("07.5").unwrap(), "7.50");
        assert_eq!(normalize_amount("123.45").unwrap(), "123.45");
    }

    #[test]
    fn test_normalize_currency() {
        assert_eq!(normalize_currency("usd").unwrap(), "USD");
        assert_eq!(normalize_currency(" Rub ").unwrap(), "RUB");
        assert!(matches!(
            normalize_currency("DOLLARS"),
            Err(DomainError::InvalidCurrency(_))
        ));
        assert!(matches!(
            normalize_currency("U1"),
            Err(DomainError::InvalidCurrency(_))
        ));
        assert!(matches!(
            normalize_currency(""),
            Err(DomainError::InvalidCurrency(_))
        ));
    }
}
