//! Folding a guest cart into an account cart at sign-in.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{Cart, CartChange, CartItem};

/// How to combine quantities when both carts contain the same product.
///
/// Lines present in only one cart are always kept (union by product ID).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Add the guest quantity to the account quantity (capped at the line limit).
    #[default]
    Sum,
    /// Keep whichever quantity is larger.
    KeepLarger,
    /// Keep the account quantity; guest lines only fill gaps.
    PreferAccount,
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sum => write!(f, "sum"),
            Self::KeepLarger => write!(f, "keep_larger"),
            Self::PreferAccount => write!(f, "prefer_account"),
        }
    }
}

impl FromStr for MergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "sum" => Ok(Self::Sum),
            "keep_larger" => Ok(Self::KeepLarger),
            "prefer_account" => Ok(Self::PreferAccount),
            other => Err(format!("invalid merge strategy: {other}")),
        }
    }
}

/// Merge `guest` into `account`.
///
/// Guest lines get fresh line IDs in the account cart. The guest discount
/// code is adopted only when the account cart has none. Lines priced in a
/// different currency than the account cart are skipped.
pub fn merge_carts(account: &mut Cart, guest: &Cart, strategy: MergeStrategy) -> CartChange {
    let mut changes = Vec::new();

    for line in guest.items() {
        if line.product.unit_price.currency() != account.currency {
            continue;
        }

        if let Some(existing) = account.item_mut(line.product.id) {
            let merged = match strategy {
                MergeStrategy::Sum => existing.quantity.saturating_add(line.quantity),
                MergeStrategy::KeepLarger => existing.quantity.max(line.quantity),
                MergeStrategy::PreferAccount => existing.quantity,
            };
            if merged != existing.quantity {
                existing.quantity = merged;
                existing.updated_at = chrono::Utc::now();
                changes.push(CartChange::LineUpdated(existing.id));
            }
        } else {
            let id = account.push_item(CartItem::new(line.product.clone(), line.quantity));
            changes.push(CartChange::LineAdded(id));
        }
    }

    if account.discount_code().is_none()
        && let Some(code) = guest.discount_code()
    {
        changes.push(account.apply_discount_code(code));
    }

    if changes.is_empty() {
        return CartChange::Unchanged;
    }
    account.updated_at = chrono::Utc::now();
    CartChange::Batch(changes)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cart::tests::{guest_cart, product};
    use crate::cart::CartOwner;
    use crate::types::{CurrencyCode, LineItemId, Quantity, UserId};

    fn qty(n: u32) -> Quantity {
        Quantity::new(n).unwrap()
    }

    fn account_cart() -> Cart {
        Cart::new(CartOwner::User(UserId::generate()), CurrencyCode::TRY)
    }

    fn quantity_of(cart: &Cart, line: &CartItem) -> u32 {
        cart.find_by_product(line.product.id).unwrap().quantity.get()
    }

    fn carts_sharing_a_product(account_qty: u32, guest_qty: u32) -> (Cart, Cart) {
        let shared = product("100");
        let mut account = account_cart();
        account.add_item(shared.clone(), qty(account_qty)).unwrap();
        let mut guest = guest_cart();
        guest.add_item(shared, qty(guest_qty)).unwrap();
        (account, guest)
    }

    #[test]
    fn test_sum_adds_quantities() {
        let (mut account, guest) = carts_sharing_a_product(2, 3);
        let change = merge_carts(&mut account, &guest, MergeStrategy::Sum);

        assert!(matches!(change, CartChange::Batch(_)));
        assert_eq!(account.line_count(), 1);
        assert_eq!(quantity_of(&account, &guest.items()[0]), 5);
    }

    #[test]
    fn test_keep_larger() {
        let (mut account, guest) = carts_sharing_a_product(2, 7);
        merge_carts(&mut account, &guest, MergeStrategy::KeepLarger);
        assert_eq!(quantity_of(&account, &guest.items()[0]), 7);
    }

    #[test]
    fn test_prefer_account_keeps_account_quantity() {
        let (mut account, guest) = carts_sharing_a_product(2, 7);
        let change = merge_carts(&mut account, &guest, MergeStrategy::PreferAccount);
        assert_eq!(change, CartChange::Unchanged);
        assert_eq!(quantity_of(&account, &guest.items()[0]), 2);
    }

    #[test]
    fn test_guest_only_lines_are_appended_with_new_ids() {
        let mut account = account_cart();
        let mut guest = guest_cart();
        guest.add_item(product("40"), qty(1)).unwrap();

        merge_carts(&mut account, &guest, MergeStrategy::Sum);

        let merged = &account.items()[0];
        assert_eq!(merged.product.id, guest.items()[0].product.id);
        assert_ne!(merged.id, guest.items()[0].id);
        assert_ne!(merged.id, LineItemId::new(uuid::Uuid::nil()));
    }

    #[test]
    fn test_sum_caps_at_line_limit() {
        let (mut account, guest) = carts_sharing_a_product(Quantity::MAX, 5);
        merge_carts(&mut account, &guest, MergeStrategy::Sum);
        assert_eq!(quantity_of(&account, &guest.items()[0]), Quantity::MAX);
    }

    #[test]
    fn test_guest_code_adopted_only_when_account_has_none() {
        let mut account = account_cart();
        let mut guest = guest_cart();
        guest.apply_discount_code("FORD20");

        merge_carts(&mut account, &guest, MergeStrategy::Sum);
        assert_eq!(account.discount_code(), Some("FORD20"));

        let mut other = guest_cart();
        other.apply_discount_code("WELCOME10");
        merge_carts(&mut account, &other, MergeStrategy::Sum);
        assert_eq!(account.discount_code(), Some("FORD20"));
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("sum".parse::<MergeStrategy>().unwrap(), MergeStrategy::Sum);
        assert_eq!(
            "keep_larger".parse::<MergeStrategy>().unwrap(),
            MergeStrategy::KeepLarger
        );
        assert_eq!(
            "prefer_account".parse::<MergeStrategy>().unwrap(),
            MergeStrategy::PreferAccount
        );
        assert!("overwrite".parse::<MergeStrategy>().is_err());
        assert_eq!(MergeStrategy::KeepLarger.to_string(), "keep_larger");
    }
}
