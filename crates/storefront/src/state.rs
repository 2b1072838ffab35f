//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;
use tower_sessions::SessionStore;

use crate::config::StorefrontConfig;
use crate::db::PgProductCatalog;
use crate::middleware::session_ttl;
use crate::services::CartService;
use crate::store::GuestCarts;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    cart: CartService<PgProductCatalog>,
    guest_carts: GuestCarts,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Storefront configuration
    /// * `pool` - `PostgreSQL` connection pool
    /// * `session_backend` - Session store that also holds guest carts
    #[must_use]
    pub fn new(
        config: StorefrontConfig,
        pool: PgPool,
        session_backend: Arc<dyn SessionStore>,
    ) -> Self {
        let catalog = PgProductCatalog::new(pool.clone(), config.cart.pricing.currency());
        let cart = CartService::from_config(catalog, &config.cart);
        let guest_carts = GuestCarts::new(session_backend, session_ttl(&config));

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                cart,
                guest_carts,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get a reference to the cart service.
    #[must_use]
    pub fn cart(&self) -> &CartService<PgProductCatalog> {
        &self.inner.cart
    }

    /// Get a reference to the guest cart records.
    #[must_use]
    pub fn guest_carts(&self) -> &GuestCarts {
        &self.inner.guest_carts
    }
}
