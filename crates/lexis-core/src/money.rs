//! Decimal currency amounts
//!
//! All prices and balances are [`Money`], a thin wrapper over
//! [`rust_decimal::Decimal`]. Arithmetic keeps full decimal precision;
//! values are rounded to [`Money::SCALE`] digits only when they are stored
//! or displayed.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// A currency amount.
///
/// Serializes as a decimal string (`"12.50"`), never as a float.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Number of fractional digits kept in storage
    pub const SCALE: u32 = 2;

    /// Zero
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Wrap a decimal amount
    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Build from minor units (cents)
    pub fn from_minor_units(units: i64) -> Self {
        Self(Decimal::new(units, Self::SCALE))
    }

    /// Build from whole currency units
    pub fn from_major(units: i64) -> Self {
        Self(Decimal::from(units))
    }

    /// The underlying decimal, unrounded
    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Round to the stored precision (midpoint away from zero)
    pub fn rounded(&self) -> Money {
        Money(
            self.0
                .round_dp_with_strategy(Self::SCALE, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    /// The rounded amount in minor units, if it fits in an `i64`
    pub fn minor_units(&self) -> Option<i64> {
        (self.rounded().0 * Decimal::ONE_HUNDRED).to_i64()
    }

    /// Multiply by a decimal factor without losing precision
    pub fn scaled(&self, factor: Decimal) -> Money {
        Money(self.0 * factor)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Clamp negative amounts to zero
    pub fn non_negative(self) -> Money {
        if self.is_negative() { Money::ZERO } else { self }
    }
}

/// Convert a float (license rates, ratings) to a decimal using its shortest
/// round-trip representation, so `1.1` becomes exactly `1.1`.
///
/// Returns `None` for NaN and infinities.
pub fn decimal_from_f64(value: f64) -> Option<Decimal> {
    if !value.is_finite() {
        return None;
    }
    Decimal::from_str(&value.to_string())
        .or_else(|_| Decimal::from_scientific(&format!("{value:e}")))
        .ok()
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim()).map(Money)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.rounded().0)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.copied().sum()
    }
}
