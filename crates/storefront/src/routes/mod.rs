//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                 - Liveness check
//! GET    /health/ready           - Readiness check (database)
//!
//! # Cart (JSON)
//! GET    /cart                   - Cart with summary
//! DELETE /cart                   - Clear cart
//! GET    /cart/summary           - Summary only
//! GET    /cart/count             - Item count badge
//! POST   /cart/items             - Add item
//! PATCH  /cart/items/{line_id}   - Update quantity (<= 0 removes)
//! DELETE /cart/items/{line_id}   - Remove item
//! POST   /cart/discount          - Apply discount code
//! DELETE /cart/discount          - Remove discount code
//! POST   /cart/merge             - Merge guest cart into account (requires auth)
//! ```

pub mod cart;
pub mod extract;
pub mod health;

use axum::{
    Router,
    routing::{get, patch, post},
};

use crate::state::AppState;

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).delete(cart::clear))
        .route("/summary", get(cart::summary))
        .route("/count", get(cart::count))
        .route("/items", post(cart::add))
        .route(
            "/items/{line_id}",
            patch(cart::update).delete(cart::remove),
        )
        .route(
            "/discount",
            post(cart::apply_discount).delete(cart::remove_discount),
        )
        .route("/merge", post(cart::merge))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/cart", cart_routes())
}
