//! # Money Types
//!
//! Currency, region and amount types for the gateway.
//! Amounts are always integer minor units (cents); decimals only appear when
//! parsing admin input or rendering order notes.

use crate::error::{PaymentError, PaymentResult};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Currencies the provider accepts (ISO 4217)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    USD,
    CAD,
}

impl Currency {
    /// Returns the ISO 4217 currency code
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::CAD => "CAD",
        }
    }

    /// Provider region implied by the currency
    pub fn country(&self) -> Country {
        match self {
            Currency::USD => Country::Usa,
            Currency::CAD => Country::Can,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Currency::USD => "$",
            Currency::CAD => "CA$",
        }
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency::USD
    }
}

impl FromStr for Currency {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "USD" => Ok(Currency::USD),
            "CAD" => Ok(Currency::CAD),
            other => Err(PaymentError::InvalidRequest(format!(
                "Unsupported currency: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider region. Selects the API host and key pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Country {
    Usa,
    Can,
}

impl Country {
    /// ISO 3166 alpha-2 code
    pub fn alpha2(&self) -> &'static str {
        match self {
            Country::Usa => "US",
            Country::Can => "CA",
        }
    }

    /// ISO 3166 alpha-3 code, sent as the `Country-Code` header
    pub fn alpha3(&self) -> &'static str {
        match self {
            Country::Usa => "USA",
            Country::Can => "CAN",
        }
    }
}

impl std::fmt::Display for Country {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.alpha3())
    }
}

/// Amount in cents with its currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// Amount in cents
    pub amount: i64,
    /// Currency
    pub currency: Currency,
}

impl Money {
    /// Create from cents
    pub fn from_cents(amount: i64, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// Parse a decimal major-unit string ("30.00") into cents.
    ///
    /// Rounds half away from zero at the cent.
    pub fn parse_decimal(input: &str, currency: Currency) -> PaymentResult<Self> {
        let value = Decimal::from_str(input.trim()).map_err(|e| PaymentError::InvalidAmount {
            message: format!("{:?} is not a decimal amount: {}", input, e),
        })?;
        let cents = (value * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .ok_or_else(|| PaymentError::InvalidAmount {
                message: format!("{} is out of range", input),
            })?;
        Ok(Self::from_cents(cents, currency))
    }

    /// Decimal major-unit value
    pub fn as_decimal(&self) -> Decimal {
        Decimal::new(self.amount, 2)
    }

    /// Format for display (e.g., "$10.00")
    pub fn display(&self) -> String {
        if self.amount < 0 {
            format!("-{}{}", self.currency.symbol(), Decimal::new(-self.amount, 2))
        } else {
            format!("{}{}", self.currency.symbol(), self.as_decimal())
        }
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decimal() {
        assert_eq!(Money::parse_decimal("30.00", Currency::USD).unwrap().amount, 3000);
        assert_eq!(Money::parse_decimal("10.995", Currency::USD).unwrap().amount, 1100);
        assert_eq!(Money::parse_decimal(" 7 ", Currency::CAD).unwrap().amount, 700);
        assert!(Money::parse_decimal("ten", Currency::USD).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(10000, Currency::USD).display(), "$100.00");
        assert_eq!(Money::from_cents(1999, Currency::CAD).display(), "CA$19.99");
        assert_eq!(Money::from_cents(-90, Currency::USD).display(), "-$0.90");
    }

    #[test]
    fn test_currency_region() {
        assert_eq!(Currency::USD.country(), Country::Usa);
        assert_eq!(Currency::CAD.country().alpha3(), "CAN");
        assert_eq!(Currency::CAD.country().alpha2(), "CA");
        assert!("eur".parse::<Currency>().is_err());
        assert_eq!("cad".parse::<Currency>().unwrap(), Currency::CAD);
    }
}
