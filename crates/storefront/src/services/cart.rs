//! Cart service.
//!
//! Every cart operation goes through [`CartService`]:
//!
//! 1. Lock the cart's [`CartKey`] so concurrent requests for the same cart
//!    apply one after another.
//! 2. Load the cart (or start an empty one) from the request's [`CartStore`].
//! 3. Apply the mutation in memory.
//! 4. Persist it, then re-read it from the store.
//! 5. Price it and remember it as the last known good copy.
//!
//! When the store is unreachable the service answers with the last known
//! cart (or an empty one) inside [`CartServiceError::Unavailable`], so the
//! UI can keep showing something while telling the customer what happened.
//! Corrupt stored carts are discarded and replaced with an empty cart.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::Serialize;
use tracing::instrument;

use yedek_core::{
    Cart, CartChange, CartError, CartSummary, CodeTable, DiscountPolicy, LineItemId,
    MergeStrategy, PricingConfig, PricingError, ProductId, Quantity, QuantityError,
    merge_carts, normalize_code, summarize,
};

use super::locks::CartLocks;
use crate::config::CartConfig;
use crate::store::{CartKey, CartStore, ProductCatalog, StoreError};

/// How long an idle cart keeps its last-known copy.
const CART_IDLE_TTL: Duration = Duration::from_secs(30 * 60);

/// Upper bound on last-known copies kept at once.
const MAX_TRACKED_CARTS: u64 = 50_000;

/// A cart together with its derived totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartView {
    /// The cart.
    pub cart: Cart,
    /// Totals computed from the cart's current lines.
    pub summary: CartSummary,
}

/// Errors returned by cart operations.
#[derive(Debug, thiserror::Error)]
pub enum CartServiceError {
    /// The product does not exist or is not for sale.
    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    /// The requested quantity is out of range.
    #[error(transparent)]
    InvalidQuantity(#[from] QuantityError),

    /// The mutation was rejected by the cart.
    #[error(transparent)]
    Cart(#[from] CartError),

    /// No discount code was given.
    #[error("empty discount code")]
    MissingDiscountCode,

    /// The discount code is not known.
    #[error("unknown discount code: {0}")]
    UnknownDiscountCode(String),

    /// Totals could not be computed.
    #[error(transparent)]
    Pricing(#[from] PricingError),

    /// The store failed; `fallback` is the best cart we can still show.
    #[error("cart store unavailable: {reason}")]
    Unavailable {
        /// What went wrong, for logs.
        reason: String,
        /// Last known cart, or an empty one.
        fallback: Box<CartView>,
    },
}

impl CartServiceError {
    /// A message suitable for showing to the customer.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::ProductNotFound(_) => "This product is no longer available.".to_owned(),
            Self::InvalidQuantity(QuantityError::NotPositive(_)) => {
                "Quantity must be at least 1.".to_owned()
            }
            Self::InvalidQuantity(QuantityError::TooLarge { max, .. })
            | Self::Cart(CartError::Quantity(QuantityError::TooLarge { max, .. })) => {
                format!("You can add at most {max} of a single part.")
            }
            Self::Cart(CartError::CurrencyMismatch { .. }) => {
                "This product cannot be added to your cart.".to_owned()
            }
            Self::Cart(_) | Self::Pricing(_) => {
                "Your cart could not be updated. Please try again.".to_owned()
            }
            Self::MissingDiscountCode => "Enter a discount code.".to_owned(),
            Self::UnknownDiscountCode(code) => format!("The discount code {code} is not valid."),
            Self::Unavailable { .. } => {
                "Your cart could not be reached right now. Showing the last saved version."
                    .to_owned()
            }
        }
    }
}

/// Cart operations over any [`CartStore`].
pub struct CartService<C> {
    catalog: C,
    pricing: PricingConfig,
    discounts: Arc<dyn DiscountPolicy>,
    merge_strategy: MergeStrategy,
    locks: CartLocks,
    last_known: Cache<CartKey, Cart>,
}

impl<C: ProductCatalog> CartService<C> {
    /// Create a service.
    #[must_use]
    pub fn new(
        catalog: C,
        pricing: PricingConfig,
        discounts: Arc<dyn DiscountPolicy>,
        merge_strategy: MergeStrategy,
    ) -> Self {
        let last_known = Cache::builder()
            .max_capacity(MAX_TRACKED_CARTS)
            .time_to_idle(CART_IDLE_TTL)
            .build();

        Self {
            catalog,
            pricing,
            discounts,
            merge_strategy,
            locks: CartLocks::new(),
            last_known,
        }
    }

    /// Create a service from loaded configuration.
    #[must_use]
    pub fn from_config(catalog: C, config: &CartConfig) -> Self {
        let discounts: Arc<CodeTable> = Arc::new(config.discounts.clone());
        Self::new(
            catalog,
            config.pricing.clone(),
            discounts,
            config.merge_strategy,
        )
    }

    /// Pricing settings in use.
    #[must_use]
    pub const fn pricing(&self) -> &PricingConfig {
        &self.pricing
    }

    /// The current cart, or an empty one if the owner has none yet.
    ///
    /// # Errors
    ///
    /// Returns [`CartServiceError::Unavailable`] if the store fails.
    #[instrument(skip_all, fields(cart = ?store.key()))]
    pub async fn get_cart<S: CartStore>(&self, store: &S) -> Result<CartView, CartServiceError> {
        let cart = match self.load_or_create(store).await {
            Ok(cart) => cart,
            Err(err) => return Err(self.unavailable(store.key(), &err).await),
        };
        self.view(cart).await
    }

    /// Totals for the current cart.
    ///
    /// # Errors
    ///
    /// Returns [`CartServiceError::Unavailable`] if the store fails.
    pub async fn get_summary<S: CartStore>(
        &self,
        store: &S,
    ) -> Result<CartSummary, CartServiceError> {
        Ok(self.get_cart(store).await?.summary)
    }

    /// Units in the cart.
    ///
    /// # Errors
    ///
    /// Returns [`CartServiceError::Unavailable`] if the store fails.
    pub async fn item_count<S: CartStore>(&self, store: &S) -> Result<u64, CartServiceError> {
        Ok(self.get_cart(store).await?.summary.item_count)
    }

    /// Add units of a catalog product, merging with an existing line.
    ///
    /// The price comes from the catalog, never from the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if the quantity is out of range, the product is
    /// unknown, the merged line would exceed the per-line limit, or the store
    /// fails.
    #[instrument(skip(self, store), fields(cart = ?store.key()))]
    pub async fn add_item<S: CartStore>(
        &self,
        store: &S,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<CartView, CartServiceError> {
        let quantity = Quantity::try_from_i64(quantity)?;

        let product = match self.catalog.find(product_id).await {
            Ok(Some(product)) => product,
            Ok(None) => return Err(CartServiceError::ProductNotFound(product_id)),
            Err(err) => return Err(self.unavailable(store.key(), &err).await),
        };

        self.mutate(store, |cart| Ok(cart.add_item(product, quantity)?))
            .await
    }

    /// Set a line's quantity. Zero or less removes the line.
    ///
    /// # Errors
    ///
    /// Returns an error if the quantity exceeds the per-line limit or the
    /// store fails.
    #[instrument(skip(self, store), fields(cart = ?store.key()))]
    pub async fn update_quantity<S: CartStore>(
        &self,
        store: &S,
        line_id: LineItemId,
        quantity: i64,
    ) -> Result<CartView, CartServiceError> {
        self.mutate(store, |cart| Ok(cart.update_quantity(line_id, quantity)?))
            .await
    }

    /// Remove a line. Unknown lines are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`CartServiceError::Unavailable`] if the store fails.
    #[instrument(skip(self, store), fields(cart = ?store.key()))]
    pub async fn remove_item<S: CartStore>(
        &self,
        store: &S,
        line_id: LineItemId,
    ) -> Result<CartView, CartServiceError> {
        self.mutate(store, |cart| Ok(cart.remove_item(line_id)))
            .await
    }

    /// Remove every line and the discount code.
    ///
    /// # Errors
    ///
    /// Returns [`CartServiceError::Unavailable`] if the store fails.
    #[instrument(skip_all, fields(cart = ?store.key()))]
    pub async fn clear_cart<S: CartStore>(&self, store: &S) -> Result<CartView, CartServiceError> {
        self.mutate(store, |cart| {
            if cart.is_empty() && cart.discount_code().is_none() {
                Ok(CartChange::Unchanged)
            } else {
                Ok(cart.clear())
            }
        })
        .await
    }

    /// Apply a discount code, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`CartServiceError::MissingDiscountCode`] for a blank code,
    /// [`CartServiceError::UnknownDiscountCode`] for codes the policy does not
    /// know, or [`CartServiceError::Unavailable`] if the store fails.
    #[instrument(skip(self, store), fields(cart = ?store.key()))]
    pub async fn apply_discount<S: CartStore>(
        &self,
        store: &S,
        code: &str,
    ) -> Result<CartView, CartServiceError> {
        let Some(code) = normalize_code(code) else {
            return Err(CartServiceError::MissingDiscountCode);
        };
        if self.discounts.lookup(&code).is_none() {
            return Err(CartServiceError::UnknownDiscountCode(code));
        }

        self.mutate(store, |cart| Ok(cart.apply_discount_code(&code)))
            .await
    }

    /// Drop the applied discount code.
    ///
    /// # Errors
    ///
    /// Returns [`CartServiceError::Unavailable`] if the store fails.
    #[instrument(skip_all, fields(cart = ?store.key()))]
    pub async fn remove_discount<S: CartStore>(
        &self,
        store: &S,
    ) -> Result<CartView, CartServiceError> {
        self.mutate(store, |cart| Ok(cart.remove_discount_code()))
            .await
    }

    /// Fold the guest cart into the account cart and delete the guest cart.
    ///
    /// Quantities for products in both carts are combined according to the
    /// configured [`MergeStrategy`].
    ///
    /// # Errors
    ///
    /// Returns [`CartServiceError::Unavailable`] if either store fails. The
    /// guest cart is kept when the account cart could not be written.
    #[instrument(skip_all, fields(account = ?account.key(), guest = ?guest.key()))]
    pub async fn merge_guest_cart<A: CartStore, G: CartStore>(
        &self,
        account: &A,
        guest: &G,
    ) -> Result<CartView, CartServiceError> {
        // Always account first, then guest; nothing else takes two locks.
        let account_lock = self.locks.acquire(account.key());
        let _account_guard = account_lock.lock().await;
        let guest_lock = self.locks.acquire(guest.key());
        let _guest_guard = guest_lock.lock().await;

        let guest_cart = match guest.load().await {
            Ok(cart) => cart,
            Err(StoreError::Corrupt(reason)) => {
                tracing::warn!(%reason, "discarding corrupt guest cart before merge");
                self.discard_quietly(guest).await;
                None
            }
            Err(err) => return Err(self.unavailable(account.key(), &err).await),
        };

        let mut cart = match self.load_or_create(account).await {
            Ok(cart) => cart,
            Err(err) => return Err(self.unavailable(account.key(), &err).await),
        };

        let Some(guest_cart) = guest_cart else {
            return self.view(cart).await;
        };

        let change = merge_carts(&mut cart, &guest_cart, self.merge_strategy);
        if !change.is_unchanged()
            && let Err(err) = account.persist(&cart, &change).await
        {
            return Err(self.unavailable(account.key(), &err).await);
        }

        if let Err(err) = guest.discard().await {
            tracing::warn!(error = %err, "guest cart merged but could not be removed");
        }
        self.last_known.invalidate(&guest.key()).await;

        tracing::info!(
            lines = guest_cart.line_count(),
            strategy = %self.merge_strategy,
            "merged guest cart into account cart"
        );

        let cart = self.reread(account, cart).await;
        self.view(cart).await
    }

    /// Run one mutation under the cart's lock.
    async fn mutate<S, F>(&self, store: &S, apply: F) -> Result<CartView, CartServiceError>
    where
        S: CartStore,
        F: FnOnce(&mut Cart) -> Result<CartChange, CartServiceError> + Send,
    {
        let key = store.key();
        let lock = self.locks.acquire(key);
        let _guard = lock.lock().await;

        let mut cart = match self.load_or_create(store).await {
            Ok(cart) => cart,
            Err(err) => return Err(self.unavailable(key, &err).await),
        };

        let change = apply(&mut cart)?;
        if change.is_unchanged() {
            return self.view(cart).await;
        }

        if let Err(err) = store.persist(&cart, &change).await {
            return Err(self.unavailable(key, &err).await);
        }
        tracing::debug!(?change, "cart persisted");

        let cart = self.reread(store, cart).await;
        self.view(cart).await
    }

    /// Load the stored cart, replacing a missing or corrupt one with a new
    /// empty cart.
    async fn load_or_create<S: CartStore>(&self, store: &S) -> Result<Cart, StoreError> {
        match store.load().await {
            Ok(Some(cart)) => Ok(cart),
            Ok(None) => Ok(store.create(self.pricing.currency())),
            Err(StoreError::Corrupt(reason)) => {
                tracing::warn!(cart = ?store.key(), %reason, "discarding corrupt cart");
                self.discard_quietly(store).await;
                Ok(store.create(self.pricing.currency()))
            }
            Err(err) => Err(err),
        }
    }

    /// Read back what was just written. A failed re-read keeps the written copy.
    async fn reread<S: CartStore>(&self, store: &S, written: Cart) -> Cart {
        match store.load().await {
            Ok(Some(cart)) => cart,
            Ok(None) => written,
            Err(err) => {
                tracing::warn!(error = %err, "cart re-read failed after write");
                written
            }
        }
    }

    async fn discard_quietly<S: CartStore>(&self, store: &S) {
        if let Err(err) = store.discard().await {
            tracing::warn!(error = %err, "could not discard cart");
        }
        self.last_known.invalidate(&store.key()).await;
    }

    /// Price a cart and remember it.
    async fn view(&self, cart: Cart) -> Result<CartView, CartServiceError> {
        let summary = summarize(&cart, &self.pricing, self.discounts.as_ref())?;
        self.last_known.insert(cart.owner, cart.clone()).await;
        Ok(CartView { cart, summary })
    }

    /// Build the degraded answer for a store failure.
    async fn unavailable(&self, key: CartKey, err: &StoreError) -> CartServiceError {
        tracing::error!(cart = ?key, error = %err, "cart store failed, serving fallback");

        let cart = self
            .last_known
            .get(&key)
            .await
            .unwrap_or_else(|| Cart::new(key, self.pricing.currency()));
        let summary = summarize(&cart, &self.pricing, self.discounts.as_ref())
            .unwrap_or_else(|_| CartSummary::empty(&self.pricing, cart.currency));

        CartServiceError::Unavailable {
            reason: err.to_string(),
            fallback: Box::new(CartView { cart, summary }),
        }
    }
}
