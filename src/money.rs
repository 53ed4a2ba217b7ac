//! Fixed-point money at two fractional digits
//!
//! Amounts enter the crate as decimal strings and are held as
//! [`BigDecimal`] values at scale 2. Binary floating point is never used.

use bigdecimal::{BigDecimal, RoundingMode};
use std::str::FromStr;

use crate::types::ReasonCode;

/// Number of fractional digits carried by every monetary value
pub const SCALE: i64 = 2;

/// Parse a decimal string of the form `[+-]digits[.digits]` without any
/// sign or precision policy.
pub fn parse_decimal(value: &str) -> Result<BigDecimal, ReasonCode> {
    if value.is_empty() {
        return Err(ReasonCode::Empty);
    }

    let (sign, unsigned) = match value.as_bytes()[0] {
        b'-' => ("-", &value[1..]),
        b'+' => ("", &value[1..]),
        _ => ("", value),
    };

    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((int_part, frac_part)) => (int_part, frac_part),
        None => (unsigned, ""),
    };

    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty()) || !all_digits(int_part) || !all_digits(frac_part)
    {
        return Err(ReasonCode::NonNumeric);
    }

    let int_part = if int_part.is_empty() { "0" } else { int_part };
    let canonical = if frac_part.is_empty() {
        format!("{}{}", sign, int_part)
    } else {
        format!("{}{}.{}", sign, int_part, frac_part)
    };

    BigDecimal::from_str(&canonical).map_err(|_| ReasonCode::NonNumeric)
}

/// Parse a strictly positive amount exactly representable at two digits
pub fn parse_amount(value: &str) -> Result<BigDecimal, ReasonCode> {
    let amount = parse_decimal(value)?;
    if amount <= BigDecimal::from(0) {
        return Err(ReasonCode::NotPositive);
    }
    if !fits_scale(&amount) {
        return Err(ReasonCode::ExcessPrecision);
    }
    Ok(normalize(&amount))
}

/// Parse a non-negative amount (opening balances, limits)
pub fn parse_non_negative(value: &str) -> Result<BigDecimal, ReasonCode> {
    let amount = parse_decimal(value)?;
    if amount < BigDecimal::from(0) {
        return Err(ReasonCode::NotPositive);
    }
    if !fits_scale(&amount) {
        return Err(ReasonCode::ExcessPrecision);
    }
    Ok(normalize(&amount))
}

/// Whether the value has no significant digits past the second decimal
pub fn fits_scale(value: &BigDecimal) -> bool {
    value.with_scale(SCALE) == *value
}

/// Rescale a value that already fits two digits
pub fn normalize(value: &BigDecimal) -> BigDecimal {
    value.with_scale(SCALE)
}

/// Round an arbitrary-precision result to two digits, half to even
pub fn round(value: &BigDecimal) -> BigDecimal {
    value.with_scale_round(SCALE, RoundingMode::HalfEven)
}

/// Render with exactly two fractional digits
pub fn format(value: &BigDecimal) -> String {
    normalize(value).to_string()
}
