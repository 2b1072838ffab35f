//! Discount code policies.
//!
//! A [`DiscountPolicy`] maps a normalized code to a [`DiscountRule`]. The
//! pricing code asks the policy about the cart's applied code on every read,
//! so changing the policy changes every cart's totals immediately.
//!
//! There is no validation beyond "is the code known": no expiry, usage
//! limits or stacking. One code per cart.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{Money, round_currency};

/// How a discount reduces the subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DiscountRule {
    /// A fraction of the subtotal, between 0 and 1 (e.g. `0.10` for 10%).
    Percentage(Decimal),
    /// A fixed amount off.
    Fixed(Money),
}

impl DiscountRule {
    /// The amount this rule takes off `subtotal`.
    ///
    /// The result is rounded to currency precision and never exceeds the
    /// subtotal.
    #[must_use]
    pub fn amount_for(&self, subtotal: Decimal) -> Decimal {
        let raw = match self {
            Self::Percentage(rate) => subtotal.checked_mul(*rate).unwrap_or(subtotal),
            Self::Fixed(amount) => amount.amount(),
        };
        round_currency(raw).min(subtotal).max(Decimal::ZERO)
    }
}

/// Lookup of discount codes.
pub trait DiscountPolicy: Send + Sync {
    /// Find the rule for an already-normalized (trimmed, uppercase) code.
    fn lookup(&self, code: &str) -> Option<DiscountRule>;
}

/// A policy that knows no codes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDiscounts;

impl DiscountPolicy for NoDiscounts {
    fn lookup(&self, _code: &str) -> Option<DiscountRule> {
        None
    }
}

/// Errors that can occur when parsing a [`CodeTable`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DiscountTableError {
    /// An entry is not of the form `CODE=value`.
    #[error("malformed discount entry: {0}")]
    Malformed(String),
    /// The rate is not a decimal in `(0, 1]`.
    #[error("invalid rate for {code}: {value}")]
    InvalidRate {
        /// Code being parsed.
        code: String,
        /// Raw value.
        value: String,
    },
}

/// A static table of codes.
///
/// Parsed from a comma-separated list: `CODE=rate` entries are percentage
/// discounts (`WELCOME10=0.10`), `CODE=fixed:amount` entries are fixed
/// discounts in the table's currency.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeTable {
    rules: BTreeMap<String, DiscountRule>,
}

impl CodeTable {
    /// Codes offered by the storefront out of the box.
    pub const DEFAULT_CODES: &'static str = "WELCOME10=0.10,FORD20=0.20,YEDEK15=0.15";

    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a code.
    #[must_use]
    pub fn with_rule(mut self, code: &str, rule: DiscountRule) -> Self {
        if let Some(code) = crate::cart::normalize_code(code) {
            self.rules.insert(code, rule);
        }
        self
    }

    /// Parse a table from its textual form.
    ///
    /// # Errors
    ///
    /// Returns an error for entries that are not `CODE=value`, rates outside
    /// `(0, 1]`, or negative fixed amounts.
    pub fn parse(
        text: &str,
        currency: crate::types::CurrencyCode,
    ) -> Result<Self, DiscountTableError> {
        let mut table = Self::new();

        for entry in text.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (code, value) = entry
                .split_once('=')
                .ok_or_else(|| DiscountTableError::Malformed(entry.to_owned()))?;
            let code = code.trim();
            let value = value.trim();
            if code.is_empty() {
                return Err(DiscountTableError::Malformed(entry.to_owned()));
            }

            let invalid = || DiscountTableError::InvalidRate {
                code: code.to_owned(),
                value: value.to_owned(),
            };

            let rule = if let Some(amount) = value.strip_prefix("fixed:") {
                let amount: Decimal = amount.trim().parse().map_err(|_| invalid())?;
                DiscountRule::Fixed(Money::new(amount, currency).map_err(|_| invalid())?)
            } else {
                let rate: Decimal = value.parse().map_err(|_| invalid())?;
                if rate <= Decimal::ZERO || rate > Decimal::ONE {
                    return Err(invalid());
                }
                DiscountRule::Percentage(rate)
            };

            table = table.with_rule(code, rule);
        }

        Ok(table)
    }

    /// Number of codes in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl DiscountPolicy for CodeTable {
    fn lookup(&self, code: &str) -> Option<DiscountRule> {
        self.rules.get(code).copied()
    }
}

/// A discount as it appears in a summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedDiscount {
    /// The code the customer entered.
    pub code: String,
    /// The rule the code resolved to.
    pub rule: DiscountRule,
    /// Amount taken off the subtotal.
    pub amount: Money,
}
