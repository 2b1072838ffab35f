//! Yedek storefront library.
//!
//! Cart and pricing API for the parts storefront. The binary in `main.rs`
//! only loads configuration, sets up tracing and Sentry, and serves
//! [`app`]; everything else lives here so it can be tested without a
//! running server.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;

use axum::Router;
use tower_sessions::SessionStore;

use state::AppState;

/// Build the application router over the given session store.
///
/// Tracing and Sentry layers are added by the binary.
pub fn app<S>(state: AppState, session_store: S) -> Router
where
    S: SessionStore + Clone,
{
    let session_layer = middleware::create_session_layer(session_store, state.config());

    routes::routes()
        .layer(session_layer)
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .with_state(state)
}
