//! Integration tests for the Yedek storefront cart.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p yedek-integration-tests
//! ```
//!
//! Most tests drive [`CartService`] over the in-memory and session stores,
//! so no database is needed. Tests marked `#[ignore]` need a migrated
//! `PostgreSQL` database (see `tests/cart_repository.rs`):
//!
//! ```bash
//! cargo run -p yedek-cli -- migrate storefront
//! cargo test -p yedek-integration-tests -- --ignored
//! ```

use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use tower_sessions::cookie::time::Duration;
use tower_sessions::{MemoryStore, Session};
use yedek_core::{
    CodeTable, CurrencyCode, MergeStrategy, Money, PricingConfig, ProductId, ProductSnapshot,
};
use yedek_storefront::services::CartService;
use yedek_storefront::store::{GuestCarts, MemoryCatalog};

/// Parse a decimal literal.
///
/// # Panics
///
/// Panics if `s` is not a decimal.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// A lira-priced part.
///
/// # Panics
///
/// Panics if `price` is negative or not a decimal.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn part(name: &str, price: &str) -> ProductSnapshot {
    ProductSnapshot {
        id: ProductId::generate(),
        name: name.to_string(),
        part_number: format!("YP-{}", name.len()),
        unit_price: Money::new(dec(price), CurrencyCode::TRY).unwrap(),
        image_url: None,
        model_fitment: vec!["Focus 2018".to_string()],
    }
}

/// A service with default pricing and the built-in discount codes.
///
/// # Panics
///
/// Panics if the built-in discount table does not parse.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn service(
    products: &[ProductSnapshot],
    merge_strategy: MergeStrategy,
) -> CartService<MemoryCatalog> {
    let codes = CodeTable::parse(CodeTable::DEFAULT_CODES, CurrencyCode::TRY).unwrap();
    CartService::new(
        MemoryCatalog::new(products.iter().cloned()),
        PricingConfig::default(),
        Arc::new(codes),
        merge_strategy,
    )
}

/// An in-memory session backend holding both sessions and guest carts.
#[derive(Debug, Clone, Default)]
pub struct Sessions {
    /// The shared backend.
    pub backend: MemoryStore,
}

impl Sessions {
    /// An empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Guest cart records in this backend.
    #[must_use]
    pub fn guest_carts(&self) -> GuestCarts {
        GuestCarts::new(Arc::new(self.backend.clone()), Duration::days(30))
    }

    /// A first-time visitor's session.
    #[must_use]
    pub fn visitor(&self) -> Session {
        Session::new(None, Arc::new(self.backend.clone()), None)
    }

    /// A later request from the visitor behind `session`, reading whatever
    /// the backend holds for it now.
    #[must_use]
    pub fn request_from(&self, session: &Session) -> Session {
        Session::new(session.id(), Arc::new(self.backend.clone()), None)
    }
}
