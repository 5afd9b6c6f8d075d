//! Currency types for Agora
//!
//! Supports the fiat currencies accepted for task budgets plus the
//! platform-issued settlement credit.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Currencies accepted for task budgets and bids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    /// US Dollar
    USD,
    /// Euro
    EUR,
    /// British Pound
    GBP,
    /// Agora settlement credit
    CREDIT,
}

impl Currency {
    /// Get the ISO 4217 code (or platform code for credits)
    pub fn code(&self) -> &'static str {
        match self {
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
            Self::CREDIT => "CREDIT",
        }
    }

    /// Get the customary display decimal places for this currency
    pub fn display_decimals(&self) -> u8 {
        match self {
            Self::CREDIT => 6,
            _ => 2,
        }
    }

    /// Parse a currency code
    pub fn parse(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "USD" => Some(Self::USD),
            "EUR" => Some(Self::EUR),
            "GBP" => Some(Self::GBP),
            "CREDIT" => Some(Self::CREDIT),
            _ => None,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_codes() {
        assert_eq!(Currency::USD.code(), "USD");
        assert_eq!(Currency::parse("usd"), Some(Currency::USD));
        assert_eq!(Currency::parse("XYZ"), None);
    }

    #[test]
    fn test_display_decimals() {
        assert_eq!(Currency::USD.display_decimals(), 2);
        assert_eq!(Currency::CREDIT.display_decimals(), 6);
    }
}
