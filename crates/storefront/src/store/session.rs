//! Guest carts kept in the session backend.
//!
//! The visitor's session only holds two IDs: the [`GuestId`] the cart is
//! locked under and the ID of a separate record in the same backend that
//! holds the cart as one JSON blob. That record is read and written directly,
//! never through the request's [`Session`], whose snapshot is loaded before
//! the cart lock is taken and written back only after the response. Every
//! write overwrites the whole cart.
//!
//! A blob that no longer decodes (schema drift, manual tampering) is
//! reported as [`StoreError::Corrupt`] so the service can discard it and
//! start over.

use std::collections::HashMap;
use std::sync::Arc;

use tower_sessions::cookie::time::{Duration, OffsetDateTime};
use tower_sessions::session::{Id, Record};
use tower_sessions::{Session, SessionStore};
use yedek_core::{Cart, CartChange, CartOwner, GuestId};

use super::{CartKey, CartStore, StoreError};
use crate::models::session::keys;

/// Data key inside a guest cart record.
const CART_FIELD: &str = "cart";

/// Guest cart records in the session backend.
#[derive(Debug, Clone)]
pub struct GuestCarts {
    backend: Arc<dyn SessionStore>,
    ttl: Duration,
}

impl GuestCarts {
    /// Keep guest carts in `backend`. A cart expires `ttl` after its last
    /// change.
    #[must_use]
    pub fn new(backend: Arc<dyn SessionStore>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    /// The cart store for the visitor behind `session`.
    ///
    /// Mints the guest ID and the cart record ID on first use. They reach the
    /// backend with the session itself, after the response.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the session cannot be read.
    pub async fn open(&self, session: &Session) -> Result<SessionCartStore, StoreError> {
        let existing = session
            .get_value(keys::GUEST_ID)
            .await?
            .and_then(|v| serde_json::from_value::<GuestId>(v).ok());
        let guest_id = match existing {
            Some(id) => id,
            None => {
                let id = GuestId::generate();
                session.insert(keys::GUEST_ID, id).await?;
                id
            }
        };

        let existing = session
            .get_value(keys::GUEST_CART)
            .await?
            .and_then(|v| v.as_str().and_then(|s| s.parse::<Id>().ok()));
        let record_id = match existing {
            Some(id) => id,
            None => {
                let id = Id::default();
                session.insert(keys::GUEST_CART, id.to_string()).await?;
                id
            }
        };

        Ok(SessionCartStore {
            backend: Arc::clone(&self.backend),
            ttl: self.ttl,
            guest_id,
            record_id,
        })
    }
}

/// Cart store for one guest, bound to its record in the session backend.
#[derive(Debug, Clone)]
pub struct SessionCartStore {
    backend: Arc<dyn SessionStore>,
    ttl: Duration,
    guest_id: GuestId,
    record_id: Id,
}

impl SessionCartStore {
    /// The guest identity bound to this store.
    #[must_use]
    pub const fn guest_id(&self) -> GuestId {
        self.guest_id
    }
}

impl CartStore for SessionCartStore {
    fn key(&self) -> CartKey {
        CartOwner::Guest(self.guest_id)
    }

    async fn load(&self) -> Result<Option<Cart>, StoreError> {
        let Some(mut record) = self.backend.load(&self.record_id).await? else {
            return Ok(None);
        };
        let Some(raw) = record.data.remove(CART_FIELD) else {
            return Ok(None);
        };

        let cart: Cart =
            serde_json::from_value(raw).map_err(|e| StoreError::Corrupt(e.to_string()))?;

        // A record reached through another visitor's session is not theirs.
        if cart.owner != self.key() {
            return Err(StoreError::Corrupt(format!(
                "guest cart owned by {:?}",
                cart.owner
            )));
        }

        Ok(Some(cart))
    }

    async fn persist(&self, cart: &Cart, _change: &CartChange) -> Result<(), StoreError> {
        let blob = serde_json::to_value(cart)
            .map_err(|e| StoreError::Unavailable(format!("could not encode cart: {e}")))?;

        let record = Record {
            id: self.record_id,
            data: HashMap::from([(CART_FIELD.to_owned(), blob)]),
            expiry_date: OffsetDateTime::now_utc() + self.ttl,
        };
        self.backend.save(&record).await?;
        Ok(())
    }

    async fn discard(&self) -> Result<(), StoreError> {
        self.backend.delete(&self.record_id).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;
    use tower_sessions::MemoryStore;
    use yedek_core::{CurrencyCode, Money, ProductId, ProductSnapshot, Quantity};

    use super::*;

    fn guest_carts(backend: &MemoryStore) -> GuestCarts {
        GuestCarts::new(Arc::new(backend.clone()), Duration::days(30))
    }

    fn session(backend: &MemoryStore) -> Session {
        Session::new(None, Arc::new(backend.clone()), None)
    }

    fn product() -> ProductSnapshot {
        ProductSnapshot {
            id: ProductId::generate(),
            name: "Yağ filtresi".to_string(),
            part_number: "1S7G-6714-DA".to_string(),
            unit_price: Money::new(Decimal::new(14990, 2), CurrencyCode::TRY).unwrap(),
            image_url: None,
            model_fitment: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_guest_id_is_stable_per_session() {
        let backend = MemoryStore::default();
        let carts = guest_carts(&backend);
        let session = session(&backend);

        let first = carts.open(&session).await.unwrap();
        let second = carts.open(&session).await.unwrap();
        assert_eq!(first.guest_id(), second.guest_id());
    }

    #[tokio::test]
    async fn test_round_trip_and_discard() {
        let backend = MemoryStore::default();
        let store = guest_carts(&backend)
            .open(&session(&backend))
            .await
            .unwrap();
        assert!(store.load().await.unwrap().is_none());

        let mut cart = store.create(CurrencyCode::TRY);
        let change = cart.add_item(product(), Quantity::ONE).unwrap();
        store.persist(&cart, &change).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, cart);

        store.discard().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_is_visible_to_an_open_session_snapshot() {
        let backend = MemoryStore::default();
        let carts = guest_carts(&backend);

        let first = session(&backend);
        carts.open(&first).await.unwrap();
        first.save().await.unwrap();

        // Both requests read the session before either writes the cart.
        let a = Session::new(first.id(), Arc::new(backend.clone()), None);
        let b = Session::new(first.id(), Arc::new(backend.clone()), None);
        let store_a = carts.open(&a).await.unwrap();
        let store_b = carts.open(&b).await.unwrap();
        assert_eq!(store_a.key(), store_b.key());

        let mut cart = store_a.create(CurrencyCode::TRY);
        let change = cart.add_item(product(), Quantity::ONE).unwrap();
        store_a.persist(&cart, &change).await.unwrap();

        assert_eq!(store_b.load().await.unwrap().unwrap(), cart);
    }

    #[tokio::test]
    async fn test_corrupt_blob_is_reported() {
        let backend = MemoryStore::default();
        let store = guest_carts(&backend)
            .open(&session(&backend))
            .await
            .unwrap();

        let record = Record {
            id: store.record_id,
            data: HashMap::from([(
                CART_FIELD.to_owned(),
                serde_json::json!({ "items": "nope" }),
            )]),
            expiry_date: OffsetDateTime::now_utc() + Duration::hours(1),
        };
        backend.save(&record).await.unwrap();

        assert!(matches!(store.load().await, Err(StoreError::Corrupt(_))));
    }
}
