//! Session middleware configuration.
//!
//! The session points at the visitor's guest cart, so it outlives a browser
//! visit: it expires only after [`StorefrontConfig::session_days`] of
//! inactivity. Guest cart records use the same lifetime.

use tower_sessions::cookie::time::Duration;
use tower_sessions::{Expiry, SessionManagerLayer, SessionStore};

use crate::config::StorefrontConfig;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "yedek_session";

/// Idle lifetime of sessions and guest carts.
#[must_use]
pub fn session_ttl(config: &StorefrontConfig) -> Duration {
    Duration::days(i64::from(config.session_days))
}

/// Create the session layer over `store`.
///
/// Production passes a `tower_sessions_sqlx_store::PostgresStore`; tests pass
/// a `MemoryStore`.
#[must_use]
pub fn create_session_layer<S: SessionStore + Clone>(
    store: S,
    config: &StorefrontConfig,
) -> SessionManagerLayer<S> {
    // Determine if we're in production (HTTPS)
    let is_secure = config.base_url.starts_with("https://");

    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(session_ttl(config)))
        .with_secure(is_secure)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}
