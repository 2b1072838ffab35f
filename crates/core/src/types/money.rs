//! Monetary amounts using decimal arithmetic.
//!
//! [`Money`] is always non-negative: line prices, subtotals, tax, shipping
//! and discount amounts are all stored as positive magnitudes, and the
//! discount is subtracted when the total is computed. Negative amounts are
//! rejected at construction (including deserialization), so they can never
//! reach the pricing code.

use core::fmt;
use core::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::Quantity;

/// Number of decimal places used for currency amounts.
pub const CURRENCY_DECIMAL_PLACES: u32 = 2;

/// Errors that can occur when constructing or combining [`Money`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// The amount is below zero.
    #[error("amount cannot be negative (got {0})")]
    Negative(Decimal),
    /// Two amounts in different currencies were combined.
    #[error("currency mismatch: expected {expected}, got {got}")]
    CurrencyMismatch {
        /// Currency of the left-hand side.
        expected: CurrencyCode,
        /// Currency of the right-hand side.
        got: CurrencyCode,
    },
    /// Decimal arithmetic overflowed.
    #[error("arithmetic overflow in money calculation")]
    Overflow,
}

/// ISO 4217 currency codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    /// Turkish lira.
    #[default]
    TRY,
    USD,
    EUR,
    GBP,
}

impl CurrencyCode {
    /// The three-letter ISO code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::TRY => "TRY",
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
        }
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for CurrencyCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TRY" | "TL" => Ok(Self::TRY),
            "USD" => Ok(Self::USD),
            "EUR" => Ok(Self::EUR),
            "GBP" => Ok(Self::GBP),
            other => Err(format!("unsupported currency: {other}")),
        }
    }
}

/// A non-negative amount of money in a specific currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawMoney")]
pub struct Money {
    amount: Decimal,
    currency: CurrencyCode,
}

#[derive(Deserialize)]
struct RawMoney {
    amount: Decimal,
    currency: CurrencyCode,
}

impl TryFrom<RawMoney> for Money {
    type Error = MoneyError;

    fn try_from(raw: RawMoney) -> Result<Self, Self::Error> {
        Self::new(raw.amount, raw.currency)
    }
}

impl Money {
    /// Create a new amount.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Negative`] if `amount` is below zero.
    pub fn new(amount: Decimal, currency: CurrencyCode) -> Result<Self, MoneyError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(MoneyError::Negative(amount));
        }
        Ok(Self { amount, currency })
    }

    /// Zero in the given currency.
    #[must_use]
    pub const fn zero(currency: CurrencyCode) -> Self {
        Self {
            amount: Decimal::ZERO,
            currency,
        }
    }

    /// The decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.amount
    }

    /// The currency of this amount.
    #[must_use]
    pub const fn currency(&self) -> CurrencyCode {
        self.currency
    }

    /// Whether the amount is exactly zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Multiply a unit price by a line quantity.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Overflow`] if the product does not fit a `Decimal`.
    pub fn times(&self, quantity: Quantity) -> Result<Self, MoneyError> {
        let amount = self
            .amount
            .checked_mul(Decimal::from(quantity.get()))
            .ok_or(MoneyError::Overflow)?;
        Ok(Self {
            amount,
            currency: self.currency,
        })
    }

    /// Add two amounts of the same currency.
    ///
    /// # Errors
    ///
    /// Returns an error on currency mismatch or overflow.
    pub fn checked_add(&self, other: &Self) -> Result<Self, MoneyError> {
        self.ensure_same_currency(other)?;
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or(MoneyError::Overflow)?;
        Ok(Self {
            amount,
            currency: self.currency,
        })
    }

    /// Round to currency precision (two places, midpoint away from zero).
    #[must_use]
    pub fn rounded(&self) -> Self {
        Self {
            amount: round_currency(self.amount),
            currency: self.currency,
        }
    }

    /// Format for display.
    ///
    /// Lira amounts use Turkish grouping (`1.234,50 TL`); other currencies
    /// use the `CODE 1,234.50` form.
    #[must_use]
    pub fn display(&self) -> String {
        let fixed = format!("{:.2}", round_currency(self.amount));
        let (whole, frac) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
        match self.currency {
            CurrencyCode::TRY => format!("{},{frac} TL", group_thousands(whole, '.')),
            other => format!("{other} {}.{frac}", group_thousands(whole, ',')),
        }
    }

    fn ensure_same_currency(&self, other: &Self) -> Result<(), MoneyError> {
        if self.currency == other.currency {
            Ok(())
        } else {
            Err(MoneyError::CurrencyMismatch {
                expected: self.currency,
                got: other.currency,
            })
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

/// Round a decimal to currency precision.
#[must_use]
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(
        CURRENCY_DECIMAL_PLACES,
        RoundingStrategy::MidpointAwayFromZero,
    )
}

fn group_thousands(digits: &str, separator: char) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(separator);
        }
        out.push(c);
    }
    out
}
