//! Cart totals.
//!
//! [`summarize`] derives a [`CartSummary`] from a cart's lines, the
//! storefront's [`PricingConfig`] and a [`DiscountPolicy`]. It is pure and
//! cheap, and is called on every read; summaries are never stored.
//!
//! ```text
//! subtotal  = Σ unit_price × quantity
//! tax       = round(subtotal × tax_rate)
//! shipping  = 0 if the cart is empty or subtotal ≥ threshold, else the fee
//! discount  = round(rule applied to subtotal), at most the subtotal
//! total     = subtotal + tax + shipping − discount
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::cart::Cart;
use crate::discount::{AppliedDiscount, DiscountPolicy, DiscountRule};
use crate::types::{CurrencyCode, Money, MoneyError, round_currency};

/// Errors raised while pricing a cart.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PricingError {
    /// A configuration value is out of range.
    #[error("invalid pricing config: {0}")]
    InvalidConfig(String),
    /// Money arithmetic failed.
    #[error(transparent)]
    Money(#[from] MoneyError),
}

/// Storefront-wide pricing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingConfig {
    tax_rate: Decimal,
    shipping_fee: Decimal,
    free_shipping_threshold: Decimal,
    currency: CurrencyCode,
}

impl PricingConfig {
    /// Default VAT rate (18%).
    pub const DEFAULT_TAX_RATE: Decimal = Decimal::from_parts(18, 0, 0, false, 2);
    /// Default flat shipping fee.
    pub const DEFAULT_SHIPPING_FEE: Decimal = Decimal::from_parts(50, 0, 0, false, 0);
    /// Default subtotal at which shipping becomes free.
    pub const DEFAULT_FREE_SHIPPING_THRESHOLD: Decimal = Decimal::from_parts(500, 0, 0, false, 0);

    /// Create a validated config.
    ///
    /// # Errors
    ///
    /// Returns [`PricingError::InvalidConfig`] if the tax rate is outside
    /// `[0, 1]` or the fee or threshold is negative.
    pub fn new(
        tax_rate: Decimal,
        shipping_fee: Decimal,
        free_shipping_threshold: Decimal,
        currency: CurrencyCode,
    ) -> Result<Self, PricingError> {
        if tax_rate < Decimal::ZERO || tax_rate > Decimal::ONE {
            return Err(PricingError::InvalidConfig(format!(
                "tax rate must be between 0 and 1 (got {tax_rate})"
            )));
        }
        if shipping_fee < Decimal::ZERO {
            return Err(PricingError::InvalidConfig(format!(
                "shipping fee cannot be negative (got {shipping_fee})"
            )));
        }
        if free_shipping_threshold < Decimal::ZERO {
            return Err(PricingError::InvalidConfig(format!(
                "free shipping threshold cannot be negative (got {free_shipping_threshold})"
            )));
        }

        Ok(Self {
            tax_rate,
            shipping_fee: round_currency(shipping_fee),
            free_shipping_threshold: round_currency(free_shipping_threshold),
            currency,
        })
    }

    /// VAT rate as a fraction.
    #[must_use]
    pub const fn tax_rate(&self) -> Decimal {
        self.tax_rate
    }

    /// Flat shipping fee below the threshold.
    #[must_use]
    pub const fn shipping_fee(&self) -> Decimal {
        self.shipping_fee
    }

    /// Subtotal at which shipping is waived.
    #[must_use]
    pub const fn free_shipping_threshold(&self) -> Decimal {
        self.free_shipping_threshold
    }

    /// Currency new carts are created in.
    #[must_use]
    pub const fn currency(&self) -> CurrencyCode {
        self.currency
    }

    /// Shipping charged for a cart with the given subtotal.
    #[must_use]
    pub fn shipping_for(&self, subtotal: Decimal, is_empty: bool) -> Decimal {
        if is_empty || subtotal >= self.free_shipping_threshold {
            Decimal::ZERO
        } else {
            self.shipping_fee
        }
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            tax_rate: Self::DEFAULT_TAX_RATE,
            shipping_fee: Self::DEFAULT_SHIPPING_FEE,
            free_shipping_threshold: Self::DEFAULT_FREE_SHIPPING_THRESHOLD,
            currency: CurrencyCode::TRY,
        }
    }
}

/// Derived totals for a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSummary {
    /// Units across all lines.
    pub item_count: u64,
    /// Distinct lines.
    pub line_count: usize,
    /// Sum of line totals.
    pub subtotal: Money,
    /// VAT on the subtotal.
    pub tax: Money,
    /// Shipping charge.
    pub shipping: Money,
    /// Amount taken off by the applied discount code.
    pub discount: Money,
    /// Amount payable.
    pub total: Money,
    /// Subtotal at which shipping becomes free.
    pub free_shipping_threshold: Money,
    /// How much more the customer needs to add for free shipping.
    pub remaining_for_free_shipping: Money,
    /// The discount that produced [`CartSummary::discount`], if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_discount: Option<AppliedDiscount>,
}

impl CartSummary {
    /// Summary of an empty cart.
    #[must_use]
    pub fn empty(config: &PricingConfig, currency: CurrencyCode) -> Self {
        let zero = money(Decimal::ZERO, currency);
        let threshold = money(config.free_shipping_threshold, currency);
        Self {
            item_count: 0,
            line_count: 0,
            subtotal: zero,
            tax: zero,
            shipping: zero,
            discount: zero,
            total: zero,
            free_shipping_threshold: threshold,
            remaining_for_free_shipping: threshold,
            applied_discount: None,
        }
    }

    /// Whether the cart qualifies for free shipping.
    #[must_use]
    pub fn has_free_shipping(&self) -> bool {
        self.item_count > 0 && self.shipping.is_zero()
    }
}

/// Compute totals for a cart.
///
/// An applied code the policy does not recognize contributes no discount.
/// A fixed discount in another currency than the cart is ignored.
///
/// # Errors
///
/// Returns [`PricingError::Money`] if a line total overflows.
pub fn summarize(
    cart: &Cart,
    config: &PricingConfig,
    discounts: &dyn DiscountPolicy,
) -> Result<CartSummary, PricingError> {
    let currency = cart.currency;
    if cart.is_empty() {
        return Ok(CartSummary::empty(config, currency));
    }

    let mut subtotal = Money::zero(currency);
    for item in cart.items() {
        subtotal = subtotal.checked_add(&item.line_total()?)?;
    }
    let subtotal = subtotal.amount();

    let tax = round_currency(
        subtotal
            .checked_mul(config.tax_rate)
            .ok_or(MoneyError::Overflow)?,
    );
    let shipping = config.shipping_for(subtotal, false);

    let applied_discount = cart.discount_code().and_then(|code| {
        let rule = discounts.lookup(code)?;
        if let DiscountRule::Fixed(amount) = rule
            && amount.currency() != currency
        {
            return None;
        }
        Some(AppliedDiscount {
            code: code.to_owned(),
            rule,
            amount: money(rule.amount_for(subtotal), currency),
        })
    });
    let discount = applied_discount
        .as_ref()
        .map_or(Decimal::ZERO, |d| d.amount.amount());

    let total = subtotal
        .checked_add(tax)
        .and_then(|t| t.checked_add(shipping))
        .and_then(|t| t.checked_sub(discount))
        .ok_or(MoneyError::Overflow)?;

    let remaining = (config.free_shipping_threshold - subtotal).max(Decimal::ZERO);

    Ok(CartSummary {
        item_count: cart.item_count(),
        line_count: cart.line_count(),
        subtotal: money(subtotal, currency),
        tax: money(tax, currency),
        shipping: money(shipping, currency),
        discount: money(discount, currency),
        total: money(total, currency),
        free_shipping_threshold: money(config.free_shipping_threshold, currency),
        remaining_for_free_shipping: money(remaining, currency),
        applied_discount,
    })
}

// Every input here is non-negative by construction.
fn money(amount: Decimal, currency: CurrencyCode) -> Money {
    let mut amount = round_currency(amount);
    amount.rescale(crate::types::money::CURRENCY_DECIMAL_PLACES);
    Money::new(amount, currency).unwrap_or_else(|_| Money::zero(currency))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cart::tests::{guest_cart, product};
    use crate::discount::{CodeTable, NoDiscounts};
    use crate::types::Quantity;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_exact(s).unwrap()
    }

    fn qty(n: u32) -> Quantity {
        Quantity::new(n).unwrap()
    }

    fn default_codes() -> CodeTable {
        CodeTable::parse(CodeTable::DEFAULT_CODES, CurrencyCode::TRY).unwrap()
    }

    fn cart_with(lines: &[(&str, u32)]) -> Cart {
        let mut cart = guest_cart();
        for (price, n) in lines {
            cart.add_item(product(price), qty(*n)).unwrap();
        }
        cart
    }

    #[test]
    fn test_defaults() {
        let config = PricingConfig::default();
        assert_eq!(config.tax_rate(), dec("0.18"));
        assert_eq!(config.shipping_fee(), dec("50"));
        assert_eq!(config.free_shipping_threshold(), dec("500"));
        assert_eq!(config.currency(), CurrencyCode::TRY);
    }

    #[test]
    fn test_two_lines_below_threshold() {
        let cart = cart_with(&[("100", 2), ("50", 1)]);
        let summary = summarize(&cart, &PricingConfig::default(), &NoDiscounts).unwrap();

        assert_eq!(summary.item_count, 3);
        assert_eq!(summary.line_count, 2);
        assert_eq!(summary.subtotal.amount(), dec("250"));
        assert_eq!(summary.tax.amount(), dec("45"));
        assert_eq!(summary.shipping.amount(), dec("50"));
        assert_eq!(summary.total.amount(), dec("345"));
        assert_eq!(summary.remaining_for_free_shipping.amount(), dec("250"));
        assert!(!summary.has_free_shipping());
    }

    #[test]
    fn test_empty_cart_is_all_zero() {
        let summary = summarize(&guest_cart(), &PricingConfig::default(), &NoDiscounts).unwrap();
        assert_eq!(summary.item_count, 0);
        assert!(summary.subtotal.is_zero());
        assert!(summary.shipping.is_zero());
        assert!(summary.total.is_zero());
        assert_eq!(summary.remaining_for_free_shipping.amount(), dec("500"));
    }

    #[test]
    fn test_threshold_edges() {
        let config = PricingConfig::default();

        let at = summarize(&cart_with(&[("500", 1)]), &config, &NoDiscounts).unwrap();
        assert!(at.shipping.is_zero());
        assert!(at.remaining_for_free_shipping.is_zero());
        assert!(at.has_free_shipping());

        let below = summarize(&cart_with(&[("499.99", 1)]), &config, &NoDiscounts).unwrap();
        assert_eq!(below.shipping.amount(), dec("50"));
        assert_eq!(below.remaining_for_free_shipping.amount(), dec("0.01"));
    }

    #[test]
    fn test_tax_rounds_half_away_from_zero() {
        // 0.25 × 0.18 = 0.045
        let cart = cart_with(&[("0.25", 1)]);
        let summary = summarize(&cart, &PricingConfig::default(), &NoDiscounts).unwrap();
        assert_eq!(summary.tax.amount(), dec("0.05"));
    }

    #[test]
    fn test_total_identity_holds() {
        let cart = cart_with(&[("19.99", 3), ("7.35", 2), ("120.10", 1)]);
        let s = summarize(&cart, &PricingConfig::default(), &NoDiscounts).unwrap();
        assert_eq!(
            s.total.amount(),
            s.subtotal.amount() + s.tax.amount() + s.shipping.amount() - s.discount.amount()
        );
    }

    #[test]
    fn test_percentage_discount() {
        let mut cart = cart_with(&[("100", 2), ("50", 1)]);
        cart.apply_discount_code("welcome10");
        let s = summarize(&cart, &PricingConfig::default(), &default_codes()).unwrap();

        assert_eq!(s.discount.amount(), dec("25"));
        assert_eq!(s.total.amount(), dec("320"));
        let applied = s.applied_discount.unwrap();
        assert_eq!(applied.code, "WELCOME10");
        assert_eq!(applied.rule, DiscountRule::Percentage(dec("0.10")));
    }

    #[test]
    fn test_unknown_code_gives_no_discount() {
        let mut cart = cart_with(&[("100", 1)]);
        cart.apply_discount_code("BOGUS");
        let s = summarize(&cart, &PricingConfig::default(), &default_codes()).unwrap();
        assert!(s.discount.is_zero());
        assert!(s.applied_discount.is_none());
    }

    #[test]
    fn test_fixed_discount_capped_at_subtotal() {
        let policy = CodeTable::parse("BIG=fixed:1000", CurrencyCode::TRY).unwrap();
        let mut cart = cart_with(&[("40", 1)]);
        cart.apply_discount_code("BIG");
        let s = summarize(&cart, &PricingConfig::default(), &policy).unwrap();

        assert_eq!(s.discount.amount(), dec("40"));
        // 40 + 7.20 tax + 50 shipping − 40
        assert_eq!(s.total.amount(), dec("57.20"));
    }

    #[test]
    fn test_fixed_discount_in_other_currency_ignored() {
        let policy = CodeTable::parse("EURO=fixed:5", CurrencyCode::EUR).unwrap();
        let mut cart = cart_with(&[("40", 1)]);
        cart.apply_discount_code("EURO");
        let s = summarize(&cart, &PricingConfig::default(), &policy).unwrap();
        assert!(s.discount.is_zero());
    }

    #[test]
    fn test_custom_config() {
        let config =
            PricingConfig::new(dec("0.20"), dec("29.99"), dec("1000"), CurrencyCode::TRY).unwrap();
        let s = summarize(&cart_with(&[("600", 1)]), &config, &NoDiscounts).unwrap();
        assert_eq!(s.tax.amount(), dec("120"));
        assert_eq!(s.shipping.amount(), dec("29.99"));
        assert_eq!(s.total.amount(), dec("749.99"));
    }

    #[test]
    fn test_config_validation() {
        assert!(PricingConfig::new(dec("1.5"), dec("50"), dec("500"), CurrencyCode::TRY).is_err());
        assert!(PricingConfig::new(dec("-0.1"), dec("50"), dec("500"), CurrencyCode::TRY).is_err());
        assert!(PricingConfig::new(dec("0.18"), dec("-1"), dec("500"), CurrencyCode::TRY).is_err());
        assert!(PricingConfig::new(dec("0.18"), dec("50"), dec("-1"), CurrencyCode::TRY).is_err());
    }

    #[test]
    fn test_summary_serializes_amounts_as_strings() {
        let cart = cart_with(&[("100", 2), ("50", 1)]);
        let s = summarize(&cart, &PricingConfig::default(), &NoDiscounts).unwrap();
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["total"]["amount"], "345.00");
        assert_eq!(json["total"]["currency"], "TRY");
        assert!(json.get("applied_discount").is_none());
    }
}
