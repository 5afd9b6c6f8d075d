//! Amount types with 18-decimal precision
//!
//! Agora uses fixed-point arithmetic with i128 for amounts so that escrow
//! splits and revenue counters never lose value to floating-point rounding.

use crate::{AgoraError, Currency, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Standard precision for internal calculations (18 decimals)
pub const STANDARD_DECIMALS: u8 = 18;

/// The standard multiplier for 18 decimals
pub const STANDARD_MULTIPLIER: i128 = 1_000_000_000_000_000_000;

/// High-precision amount with currency
///
/// Uses i128 for the value (in smallest units) with 18 decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Amount {
    /// Raw value in smallest units
    pub value: i128,
    /// The currency
    pub currency: Currency,
}

impl Amount {
    /// Create a new amount from raw units
    pub fn new(value: i128, currency: Currency) -> Self {
        Self { value, currency }
    }

    /// Create a zero amount
    pub fn zero(currency: Currency) -> Self {
        Self { value: 0, currency }
    }

    /// Create an amount from a human-readable value (e.g., 100.50)
    pub fn from_human(human_value: f64, currency: Currency) -> Self {
        let value = (human_value * STANDARD_MULTIPLIER as f64) as i128;
        Self { value, currency }
    }

    /// Convenience constructor for US dollars
    pub fn usd(human_value: f64) -> Self {
        Self::from_human(human_value, Currency::USD)
    }

    /// Convenience constructor for settlement credits
    pub fn credits(human_value: f64) -> Self {
        Self::from_human(human_value, Currency::CREDIT)
    }

    /// Get the human-readable value
    pub fn to_human(&self) -> f64 {
        self.value as f64 / STANDARD_MULTIPLIER as f64
    }

    /// Check if the amount is zero
    pub fn is_zero(&self) -> bool {
        self.value == 0
    }

    /// Check if the amount is positive
    pub fn is_positive(&self) -> bool {
        self.value > 0
    }

    /// Check if the amount is negative
    pub fn is_negative(&self) -> bool {
        self.value < 0
    }

    /// Checked addition (currencies must match)
    pub fn checked_add(self, other: Self) -> Result<Self> {
        self.require_same_currency(&other)?;
        let value = self
            .value
            .checked_add(other.value)
            .ok_or(AgoraError::AmountOverflow)?;
        Ok(Self {
            value,
            currency: self.currency,
        })
    }

    /// Checked subtraction (currencies must match)
    pub fn checked_sub(self, other: Self) -> Result<Self> {
        self.require_same_currency(&other)?;
        let value = self
            .value
            .checked_sub(other.value)
            .ok_or(AgoraError::AmountOverflow)?;
        Ok(Self {
            value,
            currency: self.currency,
        })
    }

    /// Compare two amounts of the same currency
    pub fn compare(&self, other: &Self) -> Result<Ordering> {
        self.require_same_currency(other)?;
        Ok(self.value.cmp(&other.value))
    }

    fn require_same_currency(&self, other: &Self) -> Result<()> {
        if self.currency != other.currency {
            return Err(AgoraError::CurrencyMismatch {
                expected: self.currency.code().to_string(),
                actual: other.currency.code().to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let decimals = self.currency.display_decimals() as usize;
        write!(f, "{:.*} {}", decimals, self.to_human(), self.currency)
    }
}
