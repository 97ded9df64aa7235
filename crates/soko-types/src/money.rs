//! Minor-unit money arithmetic.
//!
//! All settlement amounts are integers in the smallest currency unit
//! (kobo). Decimal values exist only at the display boundary, and every
//! conversion across that boundary rounds half-up at the minor-unit edge
//! so repeated conversions never drift.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SokoError};

/// Number of minor units per major unit (kobo per naira).
pub const MINOR_PER_MAJOR: u64 = 100;

/// Basis-point denominator (10_000 bps = 100%).
pub const BPS_DENOMINATOR: u64 = 10_000;

/// An amount in minor currency units. Never negative; direction is carried
/// separately wherever movement matters.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Minor(pub u64);

impl Minor {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub fn new(units: u64) -> Self {
        Self(units)
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checked addition. `None` on overflow.
    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Checked subtraction. `None` on underflow.
    #[must_use]
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Saturating subtraction (floors at zero).
    #[must_use]
    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Apply a basis-point rate, rounding half-up at the minor-unit boundary.
    ///
    /// Uses a u128 intermediate so `amount * bps` cannot overflow for any
    /// representable amount.
    #[must_use]
    pub fn apply_bps(self, bps: u32) -> Self {
        let numerator = u128::from(self.0) * u128::from(bps);
        let denominator = u128::from(BPS_DENOMINATOR);
        let half = denominator / 2;
        #[allow(clippy::cast_possible_truncation)]
        let result = ((numerator + half) / denominator) as u64;
        Self(result)
    }

    /// Convert to the major-unit display amount (two decimal places).
    #[must_use]
    pub fn to_major(self) -> Decimal {
        Decimal::from_i128_with_scale(i128::from(self.0), 2)
    }

    /// Parse a major-unit display amount back into minor units, rounding
    /// half-up at the minor-unit boundary.
    ///
    /// # Errors
    /// Returns [`SokoError::InvalidAmount`] for negative inputs or amounts
    /// that exceed the representable range.
    pub fn from_major(major: Decimal) -> Result<Self> {
        if major.is_sign_negative() && !major.is_zero() {
            return Err(SokoError::InvalidAmount {
                reason: format!("negative amount: {major}"),
            });
        }
        let scaled = (major * Decimal::from(MINOR_PER_MAJOR))
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        scaled.to_u64().map(Self).ok_or(SokoError::InvalidAmount {
            reason: format!("amount out of range: {major}"),
        })
    }
}

impl std::fmt::Display for Minor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Add for Minor {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }
}

impl std::iter::Sum for Minor {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, m| acc + m)
    }
}
