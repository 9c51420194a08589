//! Exact decimal arithmetic for bid amounts. No native floats anywhere in
//! this module or its callers — see the hard rule in the design notes.

use rust_decimal::Decimal;
use rust_decimal::RoundingStrategy;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("could not parse `{0}` as a decimal amount")]
pub struct ParseError(pub String);

/// An immutable, 2-decimal-place amount.
///
/// `Money::cmp` is defined in terms of the canonical (rounded) representation,
/// so two values that round to the same cents compare equal even if their
/// unrounded scale differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Parses any textual amount. Null/empty input yields zero, per contract.
    pub fn from_str_opt(input: Option<&str>) -> Result<Self, ParseError> {
        match input {
            None => Ok(Self::ZERO),
            Some(s) => Self::from_str(s),
        }
    }

    pub fn from_decimal(value: Decimal) -> Self {
        Self(value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }

    pub fn from_i64(cents: i64) -> Self {
        Self::from_decimal(Decimal::new(cents, 2))
    }

    pub fn raw(&self) -> Decimal {
        self.0
    }

    pub fn eq(&self, other: &Money) -> bool {
        self.0 == other.0
    }

    pub fn lt(&self, other: &Money) -> bool {
        self.0 < other.0
    }

    pub fn gt(&self, other: &Money) -> bool {
        self.0 > other.0
    }

    pub fn cmp(&self, other: &Money) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }

    pub fn min(self, other: Money) -> Money {
        if self.lt(&other) {
            self
        } else {
            other
        }
    }

    pub fn max(self, other: Money) -> Money {
        if self.gt(&other) {
            self
        } else {
            other
        }
    }

    pub fn sum(values: impl IntoIterator<Item = Money>) -> Money {
        values.into_iter().fold(Money::ZERO, |acc, v| Money::from_decimal(acc.0 + v.0))
    }

    pub fn avg(values: &[Money]) -> Money {
        if values.is_empty() {
            return Money::ZERO;
        }
        let total = Self::sum(values.iter().copied());
        Money::from_decimal(total.0 / Decimal::from(values.len() as u64))
    }

    /// Clamps into `[lo, hi]`, inclusive on both ends.
    pub fn clamp(self, lo: Money, hi: Money) -> Money {
        self.max(lo).min(hi)
    }

    /// Inclusive range check.
    pub fn in_range(&self, lo: Money, hi: Money) -> bool {
        !self.lt(&lo) && !self.gt(&hi)
    }

    pub fn round_to_cents(self) -> Money {
        Money::from_decimal(self.0)
    }

    pub fn format_usd(&self) -> String {
        format!("${:.2}", self.0)
    }
}

impl FromStr for Money {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(Self::ZERO);
        }
        Decimal::from_str(trimmed).map(Self::from_decimal).map_err(|_| ParseError(s.to_string()))
    }
}

impl TryFrom<String> for Money {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(&value)
    }
}

impl From<Money> for String {
    fn from(value: Money) -> Self {
        value.0.to_string()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_empty_as_zero() {
        assert_eq!(Money::from_str_opt(None).unwrap(), Money::ZERO);
        assert_eq!(Money::from_str_opt(Some("")).unwrap(), Money::ZERO);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(Money::from_str("not-a-number").is_err());
    }

    #[test]
    fn cmp_is_bitwise_on_canonical_form() {
        let a = Money::from_str("150").unwrap();
        let b = Money::from_str("150.00").unwrap();
        assert_eq!(a.cmp(&b), std::cmp::Ordering::Equal);
        assert_eq!(a.raw().to_string(), b.raw().to_string());
    }

    #[test]
    fn in_range_is_inclusive() {
        let min = Money::from_str("50").unwrap();
        let max = Money::from_str("300").unwrap();
        assert!(min.in_range(min, max));
        assert!(max.in_range(min, max));
        assert!(!Money::from_str("49.99").unwrap().in_range(min, max));
        assert!(!Money::from_str("300.01").unwrap().in_range(min, max));
    }

    #[test]
    fn clamp_bounds_both_sides() {
        let min = Money::from_str("50").unwrap();
        let max = Money::from_str("300").unwrap();
        assert_eq!(Money::from_str("1000").unwrap().clamp(min, max), max);
        assert_eq!(Money::from_str("1").unwrap().clamp(min, max), min);
    }

    #[test]
    fn sum_and_avg() {
        let values = vec![
            Money::from_str("100").unwrap(),
            Money::from_str("200").unwrap(),
            Money::from_str("300").unwrap(),
        ];
        assert_eq!(Money::sum(values.clone()), Money::from_str("600").unwrap());
        assert_eq!(Money::avg(&values), Money::from_str("200").unwrap());
    }

    #[test]
    fn round_trips_through_serde() {
        let m = Money::from_str("42.5").unwrap();
        let json = serde_json::to_string(&m).unwrap();
        let back: Money = serde_json::from_str(&json).unwrap();
        assert_eq!(m, back);
    }
}
