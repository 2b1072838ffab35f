//! In-process stores for tests and offline tools.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::RwLock;
use yedek_core::{Cart, CartChange, ProductId, ProductSnapshot};

use super::{CartKey, CartStore, ProductCatalog, StoreError};

/// Shared map of carts. Clone it to hand out stores for different owners.
#[derive(Clone, Default)]
pub struct MemoryCarts {
    carts: Arc<RwLock<HashMap<CartKey, Cart>>>,
    offline: Arc<AtomicBool>,
}

impl MemoryCarts {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store bound to `key`.
    #[must_use]
    pub fn store(&self, key: CartKey) -> MemoryCartStore {
        MemoryCartStore {
            key,
            carts: self.clone(),
        }
    }

    /// Simulate an outage: every store operation fails while set.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of stored carts.
    pub async fn len(&self) -> usize {
        self.carts.read().await.len()
    }

    /// Whether no carts are stored.
    pub async fn is_empty(&self) -> bool {
        self.carts.read().await.is_empty()
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store offline".to_owned()))
        } else {
            Ok(())
        }
    }
}

/// A [`CartStore`] over [`MemoryCarts`].
#[derive(Clone)]
pub struct MemoryCartStore {
    key: CartKey,
    carts: MemoryCarts,
}

impl CartStore for MemoryCartStore {
    fn key(&self) -> CartKey {
        self.key
    }

    async fn load(&self) -> Result<Option<Cart>, StoreError> {
        self.carts.check_online()?;
        Ok(self.carts.carts.read().await.get(&self.key).cloned())
    }

    async fn persist(&self, cart: &Cart, _change: &CartChange) -> Result<(), StoreError> {
        self.carts.check_online()?;
        self.carts
            .carts
            .write()
            .await
            .insert(self.key, cart.clone());
        Ok(())
    }

    async fn discard(&self) -> Result<(), StoreError> {
        self.carts.check_online()?;
        self.carts.carts.write().await.remove(&self.key);
        Ok(())
    }
}

/// A fixed catalog.
#[derive(Clone, Default)]
pub struct MemoryCatalog {
    products: Arc<HashMap<ProductId, ProductSnapshot>>,
}

impl MemoryCatalog {
    /// Build a catalog from a list of products.
    #[must_use]
    pub fn new(products: impl IntoIterator<Item = ProductSnapshot>) -> Self {
        Self {
            products: Arc::new(products.into_iter().map(|p| (p.id, p)).collect()),
        }
    }
}

impl ProductCatalog for MemoryCatalog {
    async fn find(&self, product_id: ProductId) -> Result<Option<ProductSnapshot>, StoreError> {
        Ok(self.products.get(&product_id).cloned())
    }
}
