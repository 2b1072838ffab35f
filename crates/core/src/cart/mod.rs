//! Cart state and mutation.
//!
//! A [`Cart`] holds line items and, optionally, one discount code. It never
//! stores totals: those are derived by [`crate::pricing::summarize`] every
//! time they are read, so they cannot drift from the lines.
//!
//! Every mutation returns a [`CartChange`] describing what happened. Blob
//! stores ignore it and overwrite the whole cart; row stores use it to touch
//! only the affected rows.

pub mod merge;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{
    CartId, CurrencyCode, GuestId, LineItemId, Money, MoneyError, ProductId, Quantity,
    QuantityError, UserId,
};

pub use merge::{MergeStrategy, merge_carts};

/// Errors raised by cart mutations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CartError {
    /// Quantity was outside the allowed range.
    #[error(transparent)]
    Quantity(#[from] QuantityError),
    /// Money arithmetic failed.
    #[error(transparent)]
    Money(#[from] MoneyError),
    /// The product is priced in a different currency than the cart.
    #[error("product {product_id} is priced in {got}, cart uses {expected}")]
    CurrencyMismatch {
        /// Offending product.
        product_id: ProductId,
        /// Cart currency.
        expected: CurrencyCode,
        /// Product currency.
        got: CurrencyCode,
    },
}

/// Who a cart belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CartOwner {
    /// An authenticated account.
    User(UserId),
    /// An anonymous browser session.
    Guest(GuestId),
}

impl CartOwner {
    /// The user ID, if the owner is authenticated.
    #[must_use]
    pub const fn user_id(&self) -> Option<UserId> {
        match self {
            Self::User(id) => Some(*id),
            Self::Guest(_) => None,
        }
    }
}

/// Product data copied onto a line when it is added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    /// Catalog product ID.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Manufacturer part number.
    pub part_number: String,
    /// Unit price at the time the line was added.
    pub unit_price: Money,
    /// Main image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Vehicle models this part fits.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub model_fitment: Vec<String>,
}

/// One product-quantity-price entry in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    /// Line ID.
    pub id: LineItemId,
    /// Product snapshot.
    pub product: ProductSnapshot,
    /// Units on this line (always at least one).
    pub quantity: Quantity,
    /// When the line was first added.
    pub added_at: DateTime<Utc>,
    /// When the line was last changed.
    pub updated_at: DateTime<Utc>,
}

impl CartItem {
    /// Create a new line for a product.
    #[must_use]
    pub fn new(product: ProductSnapshot, quantity: Quantity) -> Self {
        let now = Utc::now();
        Self {
            id: LineItemId::generate(),
            product,
            quantity,
            added_at: now,
            updated_at: now,
        }
    }

    /// Unit price of this line.
    #[must_use]
    pub const fn unit_price(&self) -> Money {
        self.product.unit_price
    }

    /// Unit price multiplied by quantity.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Overflow`] if the product does not fit.
    pub fn line_total(&self) -> Result<Money, MoneyError> {
        self.product.unit_price.times(self.quantity)
    }
}

/// What a mutation changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartChange {
    /// Nothing changed (e.g. removing an absent line).
    Unchanged,
    /// A new line was appended.
    LineAdded(LineItemId),
    /// An existing line's quantity changed.
    LineUpdated(LineItemId),
    /// A line was removed.
    LineRemoved(LineItemId),
    /// All lines (and the discount code) were removed.
    Cleared,
    /// The applied discount code was set or removed.
    DiscountCodeChanged,
    /// Several changes applied together.
    Batch(Vec<CartChange>),
}

impl CartChange {
    /// Whether the cart needs to be written back.
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        match self {
            Self::Unchanged => true,
            Self::Batch(changes) => changes.iter().all(Self::is_unchanged),
            _ => false,
        }
    }
}

/// A shopping cart.
///
/// Deserialization goes through [`Cart::from_parts`], so a decoded cart has
/// the same guarantees as one rebuilt from rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredCart")]
pub struct Cart {
    /// Cart ID.
    pub id: CartId,
    /// Owner of the cart.
    pub owner: CartOwner,
    /// Currency every line must be priced in.
    pub currency: CurrencyCode,
    items: Vec<CartItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    discount_code: Option<String>,
    /// When the cart was created.
    pub created_at: DateTime<Utc>,
    /// When the cart was last mutated.
    pub updated_at: DateTime<Utc>,
}

/// Wire shape of [`Cart`], checked before it becomes one.
#[derive(Deserialize)]
struct StoredCart {
    id: CartId,
    owner: CartOwner,
    currency: CurrencyCode,
    items: Vec<CartItem>,
    #[serde(default)]
    discount_code: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<StoredCart> for Cart {
    type Error = CartError;

    fn try_from(stored: StoredCart) -> Result<Self, Self::Error> {
        if let Some(item) = stored
            .items
            .iter()
            .find(|item| item.unit_price().currency() != stored.currency)
        {
            return Err(CartError::CurrencyMismatch {
                product_id: item.product.id,
                expected: stored.currency,
                got: item.unit_price().currency(),
            });
        }

        Ok(Self::from_parts(
            stored.id,
            stored.owner,
            stored.currency,
            stored.items,
            stored.discount_code,
            stored.created_at,
            stored.updated_at,
        ))
    }
}

impl Cart {
    /// Create an empty cart.
    #[must_use]
    pub fn new(owner: CartOwner, currency: CurrencyCode) -> Self {
        let now = Utc::now();
        Self {
            id: CartId::generate(),
            owner,
            currency,
            items: Vec::new(),
            discount_code: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild a cart from persisted parts.
    ///
    /// Lines referencing the same product are folded into the first one, so
    /// a store that lost its uniqueness constraint still yields a valid cart.
    #[must_use]
    pub fn from_parts(
        id: CartId,
        owner: CartOwner,
        currency: CurrencyCode,
        items: Vec<CartItem>,
        discount_code: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        let mut folded: Vec<CartItem> = Vec::with_capacity(items.len());
        for item in items {
            if let Some(existing) = folded.iter_mut().find(|i| i.product.id == item.product.id) {
                existing.quantity = existing.quantity.saturating_add(item.quantity);
            } else {
                folded.push(item);
            }
        }

        Self {
            id,
            owner,
            currency,
            items: folded,
            discount_code: discount_code.as_deref().and_then(normalize_code),
            created_at,
            updated_at,
        }
    }

    /// Lines in insertion order.
    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// The applied discount code, if any.
    #[must_use]
    pub fn discount_code(&self) -> Option<&str> {
        self.discount_code.as_deref()
    }

    /// Get a line by ID.
    #[must_use]
    pub fn get_item(&self, line_id: LineItemId) -> Option<&CartItem> {
        self.items.iter().find(|i| i.id == line_id)
    }

    /// Get the line for a product.
    #[must_use]
    pub fn find_by_product(&self, product_id: ProductId) -> Option<&CartItem> {
        self.items.iter().find(|i| i.product.id == product_id)
    }

    /// Total units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.quantity.get())).sum()
    }

    /// Number of distinct lines.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.items.len()
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Add units of a product.
    ///
    /// If a line for the same product already exists its quantity is
    /// increased; otherwise a new line is appended.
    ///
    /// # Errors
    ///
    /// Returns an error if the merged quantity exceeds [`Quantity::MAX`] or
    /// the product is priced in another currency.
    pub fn add_item(
        &mut self,
        product: ProductSnapshot,
        quantity: Quantity,
    ) -> Result<CartChange, CartError> {
        let got = product.unit_price.currency();
        if got != self.currency {
            return Err(CartError::CurrencyMismatch {
                product_id: product.id,
                expected: self.currency,
                got,
            });
        }

        let now = Utc::now();
        if let Some(existing) = self.items.iter_mut().find(|i| i.product.id == product.id) {
            existing.quantity = existing.quantity.checked_add(quantity)?;
            existing.updated_at = now;
            let id = existing.id;
            self.updated_at = now;
            return Ok(CartChange::LineUpdated(id));
        }

        let item = CartItem::new(product, quantity);
        let id = item.id;
        self.items.push(item);
        self.updated_at = now;
        Ok(CartChange::LineAdded(id))
    }

    /// Set a line's quantity exactly.
    ///
    /// A quantity of zero or less removes the line. Unknown line IDs are a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns [`QuantityError::TooLarge`] above [`Quantity::MAX`].
    pub fn update_quantity(
        &mut self,
        line_id: LineItemId,
        quantity: i64,
    ) -> Result<CartChange, CartError> {
        if quantity <= 0 {
            return Ok(self.remove_item(line_id));
        }
        let quantity = Quantity::try_from_i64(quantity)?;

        let Some(item) = self.items.iter_mut().find(|i| i.id == line_id) else {
            return Ok(CartChange::Unchanged);
        };
        if item.quantity == quantity {
            return Ok(CartChange::Unchanged);
        }

        let now = Utc::now();
        item.quantity = quantity;
        item.updated_at = now;
        self.updated_at = now;
        Ok(CartChange::LineUpdated(line_id))
    }

    /// Remove a line. Absent IDs are a no-op.
    pub fn remove_item(&mut self, line_id: LineItemId) -> CartChange {
        let before = self.items.len();
        self.items.retain(|i| i.id != line_id);
        if self.items.len() == before {
            return CartChange::Unchanged;
        }
        self.updated_at = Utc::now();
        CartChange::LineRemoved(line_id)
    }

    /// Remove every line and the discount code.
    pub fn clear(&mut self) -> CartChange {
        self.items.clear();
        self.discount_code = None;
        self.updated_at = Utc::now();
        CartChange::Cleared
    }

    /// Store a discount code, replacing any previous one.
    ///
    /// The code is trimmed and uppercased. Whether it is valid is decided by
    /// the discount policy, not the cart.
    pub fn apply_discount_code(&mut self, code: &str) -> CartChange {
        let normalized = normalize_code(code);
        if normalized.is_none() || normalized == self.discount_code {
            return CartChange::Unchanged;
        }
        self.discount_code = normalized;
        self.updated_at = Utc::now();
        CartChange::DiscountCodeChanged
    }

    /// Drop the applied discount code.
    pub fn remove_discount_code(&mut self) -> CartChange {
        if self.discount_code.take().is_none() {
            return CartChange::Unchanged;
        }
        self.updated_at = Utc::now();
        CartChange::DiscountCodeChanged
    }

    /// Append an already-built line. Used by [`merge_carts`].
    fn push_item(&mut self, item: CartItem) -> LineItemId {
        let id = item.id;
        self.items.push(item);
        id
    }

    fn item_mut(&mut self, product_id: ProductId) -> Option<&mut CartItem> {
        self.items.iter_mut().find(|i| i.product.id == product_id)
    }
}

/// Normalize a discount code: trimmed, uppercased, `None` if blank.
#[must_use]
pub fn normalize_code(code: &str) -> Option<String> {
    let trimmed = code.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_uppercase())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use rust_decimal::Decimal;

    pub(crate) fn product(price: &str) -> ProductSnapshot {
        ProductSnapshot {
            id: ProductId::generate(),
            name: "Fren balatası".to_string(),
            part_number: "BV6Z-2001-A".to_string(),
            unit_price: Money::new(Decimal::from_str_exact(price).unwrap(), CurrencyCode::TRY)
                .unwrap(),
            image_url: None,
            model_fitment: vec!["Focus 2015".to_string()],
        }
    }

    pub(crate) fn guest_cart() -> Cart {
        Cart::new(CartOwner::Guest(GuestId::generate()), CurrencyCode::TRY)
    }

    fn qty(n: u32) -> Quantity {
        Quantity::new(n).unwrap()
    }

    #[test]
    fn test_add_same_product_merges_lines() {
        let mut cart = guest_cart();
        let p = product("100");

        let first = cart.add_item(p.clone(), qty(2)).unwrap();
        let second = cart.add_item(p, qty(3)).unwrap();

        assert!(matches!(first, CartChange::LineAdded(_)));
        assert!(matches!(second, CartChange::LineUpdated(_)));
        assert_eq!(cart.line_count(), 1);
        assert_eq!(cart.items()[0].quantity.get(), 5);
    }

    #[test]
    fn test_add_distinct_products_appends() {
        let mut cart = guest_cart();
        cart.add_item(product("100"), qty(1)).unwrap();
        cart.add_item(product("50"), qty(1)).unwrap();
        assert_eq!(cart.line_count(), 2);
        assert_eq!(cart.item_count(), 2);
    }

    #[test]
    fn test_add_over_limit_leaves_cart_untouched() {
        let mut cart = guest_cart();
        let p = product("10");
        cart.add_item(p.clone(), qty(Quantity::MAX)).unwrap();

        let err = cart.add_item(p, qty(1)).unwrap_err();
        assert!(matches!(err, CartError::Quantity(QuantityError::TooLarge { .. })));
        assert_eq!(cart.items()[0].quantity.get(), Quantity::MAX);
    }

    #[test]
    fn test_add_rejects_foreign_currency() {
        let mut cart = guest_cart();
        let mut p = product("10");
        p.unit_price = Money::new(Decimal::TEN, CurrencyCode::EUR).unwrap();
        assert!(matches!(
            cart.add_item(p, qty(1)),
            Err(CartError::CurrencyMismatch { .. })
        ));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_update_quantity_sets_exactly() {
        let mut cart = guest_cart();
        let CartChange::LineAdded(id) = cart.add_item(product("20"), qty(4)).unwrap() else {
            panic!("expected a new line");
        };

        assert_eq!(
            cart.update_quantity(id, 2).unwrap(),
            CartChange::LineUpdated(id)
        );
        assert_eq!(cart.item_count(), 2);
    }

    #[test]
    fn test_update_quantity_zero_removes() {
        let mut cart = guest_cart();
        let CartChange::LineAdded(id) = cart.add_item(product("20"), qty(3)).unwrap() else {
            panic!("expected a new line");
        };
        cart.add_item(product("5"), qty(1)).unwrap();
        let before = cart.item_count();

        assert_eq!(
            cart.update_quantity(id, 0).unwrap(),
            CartChange::LineRemoved(id)
        );
        assert_eq!(cart.item_count(), before - 3);
        assert!(cart.get_item(id).is_none());
    }

    #[test]
    fn test_update_negative_quantity_removes() {
        let mut cart = guest_cart();
        let CartChange::LineAdded(id) = cart.add_item(product("20"), qty(1)).unwrap() else {
            panic!("expected a new line");
        };
        assert_eq!(
            cart.update_quantity(id, -4).unwrap(),
            CartChange::LineRemoved(id)
        );
        assert!(cart.is_empty());
    }

    #[test]
    fn test_update_unknown_line_is_noop() {
        let mut cart = guest_cart();
        cart.add_item(product("20"), qty(1)).unwrap();
        assert_eq!(
            cart.update_quantity(LineItemId::generate(), 7).unwrap(),
            CartChange::Unchanged
        );
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut cart = guest_cart();
        assert_eq!(
            cart.remove_item(LineItemId::generate()),
            CartChange::Unchanged
        );
    }

    #[test]
    fn test_clear_drops_lines_and_code() {
        let mut cart = guest_cart();
        cart.add_item(product("20"), qty(1)).unwrap();
        cart.apply_discount_code("welcome10");

        assert_eq!(cart.clear(), CartChange::Cleared);
        assert!(cart.is_empty());
        assert!(cart.discount_code().is_none());
    }

    #[test]
    fn test_discount_code_normalized() {
        let mut cart = guest_cart();
        assert_eq!(
            cart.apply_discount_code("  ford20 "),
            CartChange::DiscountCodeChanged
        );
        assert_eq!(cart.discount_code(), Some("FORD20"));
        assert_eq!(cart.apply_discount_code("FORD20"), CartChange::Unchanged);
        assert_eq!(cart.apply_discount_code("   "), CartChange::Unchanged);
        assert_eq!(cart.remove_discount_code(), CartChange::DiscountCodeChanged);
        assert_eq!(cart.remove_discount_code(), CartChange::Unchanged);
    }

    #[test]
    fn test_from_parts_folds_duplicate_products() {
        let p = product("10");
        let a = CartItem::new(p.clone(), qty(2));
        let b = CartItem::new(p, qty(3));
        let now = Utc::now();

        let cart = Cart::from_parts(
            CartId::generate(),
            CartOwner::User(UserId::generate()),
            CurrencyCode::TRY,
            vec![a, b],
            Some(" yedek15".to_string()),
            now,
            now,
        );

        assert_eq!(cart.line_count(), 1);
        assert_eq!(cart.item_count(), 5);
        assert_eq!(cart.discount_code(), Some("YEDEK15"));
    }

    #[test]
    fn test_serde_rejects_zero_quantity_line() {
        let mut cart = guest_cart();
        cart.add_item(product("10"), qty(1)).unwrap();
        let json = serde_json::to_string(&cart)
            .unwrap()
            .replace("\"quantity\":1", "\"quantity\":0");
        assert!(serde_json::from_str::<Cart>(&json).is_err());
    }

    #[test]
    fn test_serde_folds_duplicate_product_lines() {
        let mut cart = guest_cart();
        let p = product("10");
        cart.add_item(p.clone(), qty(1)).unwrap();

        let mut json = serde_json::to_value(&cart).unwrap();
        let line = json["items"][0].clone();
        let mut copy = line.clone();
        copy["id"] = serde_json::json!(LineItemId::generate());
        json["items"] = serde_json::json!([line, copy]);

        let decoded: Cart = serde_json::from_value(json).unwrap();
        assert_eq!(decoded.line_count(), 1);
        assert_eq!(decoded.find_by_product(p.id).unwrap().quantity.get(), 2);
    }

    #[test]
    fn test_serde_rejects_line_in_other_currency() {
        let mut cart = guest_cart();
        cart.add_item(product("10"), qty(1)).unwrap();

        let mut json = serde_json::to_value(&cart).unwrap();
        json["items"][0]["product"]["unit_price"]["currency"] = serde_json::json!("USD");

        let err = serde_json::from_value::<Cart>(json).unwrap_err();
        assert!(err.to_string().contains("is priced in USD"));
    }

    #[test]
    fn test_change_is_unchanged() {
        assert!(CartChange::Unchanged.is_unchanged());
        assert!(CartChange::Batch(vec![CartChange::Unchanged]).is_unchanged());
        assert!(!CartChange::Cleared.is_unchanged());
    }
}
