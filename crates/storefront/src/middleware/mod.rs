//! HTTP middleware stack for storefront.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, HTTP transaction)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Session layer (tower-sessions with `PostgreSQL` store)
//!
//! Authentication is read per handler through the [`OptionalAuth`] and
//! [`RequireAuth`] extractors.

pub mod auth;
pub mod request_id;
pub mod session;

pub use auth::{OptionalAuth, RequireAuth};
pub use request_id::request_id_middleware;
pub use session::{create_session_layer, session_ttl};
