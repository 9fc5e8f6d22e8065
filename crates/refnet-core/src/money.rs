//! Monetary amounts under a single fixed numeric policy.
//!
//! Every monetary quantity in the engine is a [`Money`]: an exact decimal
//! truncated (round-toward-zero) to [`MONEY_SCALE`] fractional digits at
//! construction. The wire and storage representation is the normalized
//! decimal string — never a binary float.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::RefnetError;

/// Fractional digits kept on every amount.
pub const MONEY_SCALE: u32 = 18;

/// An exact decimal amount, truncated to [`MONEY_SCALE`] digits.
///
/// Comparison and equality are value-based (`1.50 == 1.5`). Display strips
/// trailing zeros, so the same value always renders as the same string.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Apply the numeric policy to a raw decimal.
    pub fn new(value: Decimal) -> Self {
        Self(value.trunc_with_scale(MONEY_SCALE))
    }

    /// Parse a wire/storage string. Fails with `InvalidInput` on anything
    /// that is not a plain finite decimal literal.
    pub fn parse(raw: &str) -> Result<Self, RefnetError> {
        Decimal::from_str_exact(raw.trim())
            .map(Self::new)
            .map_err(|_| RefnetError::InvalidInput(format!("unparsable decimal amount: {raw:?}")))
    }

    pub fn from_int(value: i64) -> Self {
        Self(Decimal::from(value))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Multiply by a rate, truncating the product back to policy scale.
    /// This is the only multiplication the engine performs on money.
    pub fn mul_rate(&self, rate: Decimal) -> Money {
        Money::new(self.0 * rate)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == Decimal::ZERO
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl From<Money> for String {
    fn from(value: Money) -> String {
        value.to_string()
    }
}

impl TryFrom<String> for Money {
    type Error = RefnetError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Money::parse(&value)
    }
}
