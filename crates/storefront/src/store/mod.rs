//! Cart persistence boundary.
//!
//! A [`CartStore`] is bound to one cart owner for the duration of a request.
//! The cart service never knows where a cart lives:
//!
//! - [`SessionCartStore`] - guest carts, one JSON blob in the session backend
//! - [`PgCartStore`](crate::db::PgCartStore) - account carts, row-level in `PostgreSQL`
//! - [`MemoryCartStore`] - in-process map for tests and offline tools
//!
//! [`RequestCartStore`] picks between the first two per request so handlers
//! can stay generic-free.
//!
//! Product lookups go through the [`ProductCatalog`] trait for the same reason.

pub mod memory;
pub mod session;

use std::future::Future;

use yedek_core::{Cart, CartChange, CartOwner, CurrencyCode, ProductId, ProductSnapshot};

use crate::db::{PgCartStore, RepositoryError};

pub use memory::{MemoryCartStore, MemoryCarts, MemoryCatalog};
pub use session::{GuestCarts, SessionCartStore};

/// Identity a cart is locked and cached under.
pub type CartKey = CartOwner;

/// Errors raised by cart stores and catalogs.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not be reached or failed mid-operation.
    #[error("cart store unavailable: {0}")]
    Unavailable(String),

    /// Persisted data could not be decoded.
    #[error("stored cart is corrupt: {0}")]
    Corrupt(String),
}

impl From<RepositoryError> for StoreError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::DataCorruption(msg) => Self::Corrupt(msg),
            other => Self::Unavailable(other.to_string()),
        }
    }
}

impl From<tower_sessions::session::Error> for StoreError {
    fn from(err: tower_sessions::session::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

impl From<tower_sessions::session_store::Error> for StoreError {
    fn from(err: tower_sessions::session_store::Error) -> Self {
        match err {
            tower_sessions::session_store::Error::Decode(msg) => Self::Corrupt(msg),
            other => Self::Unavailable(other.to_string()),
        }
    }
}

/// Storage for a single owner's cart.
pub trait CartStore: Send + Sync {
    /// The owner this store reads and writes.
    fn key(&self) -> CartKey;

    /// Read the cart, `None` if the owner has never had one.
    fn load(&self) -> impl Future<Output = Result<Option<Cart>, StoreError>> + Send;

    /// A fresh empty cart for this owner. Nothing is written until the
    /// first [`CartStore::persist`].
    fn create(&self, currency: CurrencyCode) -> Cart {
        Cart::new(self.key(), currency)
    }

    /// Write the cart back. `change` describes what the last mutation did;
    /// stores that keep one blob per cart may ignore it.
    fn persist(
        &self,
        cart: &Cart,
        change: &CartChange,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Delete the cart entirely.
    fn discard(&self) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Read access to the parts catalog.
pub trait ProductCatalog: Send + Sync {
    /// Look up a product that can currently be sold.
    fn find(
        &self,
        product_id: ProductId,
    ) -> impl Future<Output = Result<Option<ProductSnapshot>, StoreError>> + Send;
}

/// The cart store for the current request: the account cart when a user is
/// signed in, the guest cart otherwise.
pub enum RequestCartStore {
    /// Anonymous visitor.
    Guest(SessionCartStore),
    /// Signed-in user.
    Account(PgCartStore),
}

impl CartStore for RequestCartStore {
    fn key(&self) -> CartKey {
        match self {
            Self::Guest(store) => store.key(),
            Self::Account(store) => store.key(),
        }
    }

    async fn load(&self) -> Result<Option<Cart>, StoreError> {
        match self {
            Self::Guest(store) => store.load().await,
            Self::Account(store) => store.load().await,
        }
    }

    async fn persist(&self, cart: &Cart, change: &CartChange) -> Result<(), StoreError> {
        match self {
            Self::Guest(store) => store.persist(cart, change).await,
            Self::Account(store) => store.persist(cart, change).await,
        }
    }

    async fn discard(&self) -> Result<(), StoreError> {
        match self {
            Self::Guest(store) => store.discard().await,
            Self::Account(store) => store.discard().await,
        }
    }
}
